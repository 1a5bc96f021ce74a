//! Sector and market-cap lookups used by the trade filter.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Symbol reference data. Unknown symbols return `None` and pass the related filters.
pub trait ReferenceData: Send + Sync {
    fn sector(&self, symbol: &str) -> Option<String>;

    /// Market capitalisation in dollars.
    fn market_cap(&self, symbol: &str) -> Option<Decimal>;
}

#[derive(Debug, Clone)]
struct SymbolInfo {
    sector: String,
    market_cap: Option<Decimal>,
}

/// In-memory lookup table, seeded with widely held US listings.
#[derive(Debug, Clone)]
pub struct StaticReferenceData {
    symbols: HashMap<String, SymbolInfo>,
}

const BILLION: Decimal = dec!(1_000_000_000);

impl StaticReferenceData {
    /// Empty table.
    pub fn empty() -> Self {
        Self {
            symbols: HashMap::new(),
        }
    }

    /// Add or replace a symbol. Market cap is in dollars.
    pub fn with_symbol(
        mut self,
        symbol: &str,
        sector: &str,
        market_cap: Option<Decimal>,
    ) -> Self {
        self.symbols.insert(
            symbol.to_uppercase(),
            SymbolInfo {
                sector: sector.to_string(),
                market_cap,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for StaticReferenceData {
    fn default() -> Self {
        // (symbol, sector, market cap in billions)
        let table: &[(&str, &str, Decimal)] = &[
            ("AAPL", "Technology", dec!(3400)),
            ("MSFT", "Technology", dec!(3100)),
            ("NVDA", "Technology", dec!(3300)),
            ("GOOGL", "Communication Services", dec!(2100)),
            ("GOOG", "Communication Services", dec!(2100)),
            ("META", "Communication Services", dec!(1400)),
            ("NFLX", "Communication Services", dec!(380)),
            ("DIS", "Communication Services", dec!(200)),
            ("AMZN", "Consumer Discretionary", dec!(2200)),
            ("TSLA", "Consumer Discretionary", dec!(1100)),
            ("HD", "Consumer Discretionary", dec!(390)),
            ("NKE", "Consumer Discretionary", dec!(110)),
            ("MCD", "Consumer Discretionary", dec!(210)),
            ("WMT", "Consumer Staples", dec!(720)),
            ("KO", "Consumer Staples", dec!(300)),
            ("PEP", "Consumer Staples", dec!(200)),
            ("PG", "Consumer Staples", dec!(390)),
            ("COST", "Consumer Staples", dec!(420)),
            ("JPM", "Financials", dec!(680)),
            ("BAC", "Financials", dec!(330)),
            ("GS", "Financials", dec!(190)),
            ("V", "Financials", dec!(640)),
            ("MA", "Financials", dec!(510)),
            ("BRK.B", "Financials", dec!(1000)),
            ("JNJ", "Health Care", dec!(380)),
            ("UNH", "Health Care", dec!(300)),
            ("PFE", "Health Care", dec!(140)),
            ("LLY", "Health Care", dec!(700)),
            ("MRNA", "Health Care", dec!(15)),
            ("XOM", "Energy", dec!(480)),
            ("CVX", "Energy", dec!(280)),
            ("BA", "Industrials", dec!(130)),
            ("CAT", "Industrials", dec!(180)),
            ("GE", "Industrials", dec!(270)),
            ("AMD", "Technology", dec!(260)),
            ("INTC", "Technology", dec!(100)),
            ("CRM", "Technology", dec!(250)),
            ("ORCL", "Technology", dec!(600)),
            ("PLTR", "Technology", dec!(400)),
            ("NEE", "Utilities", dec!(150)),
            ("AMT", "Real Estate", dec!(95)),
            ("LIN", "Materials", dec!(220)),
            ("GME", "Consumer Discretionary", dec!(11)),
            ("AMC", "Communication Services", dec!(1.5)),
        ];

        table
            .iter()
            .fold(Self::empty(), |data, (symbol, sector, cap_bn)| {
                data.with_symbol(symbol, sector, Some(*cap_bn * BILLION))
            })
    }
}

impl ReferenceData for StaticReferenceData {
    fn sector(&self, symbol: &str) -> Option<String> {
        self.symbols
            .get(&symbol.to_uppercase())
            .map(|info| info.sector.clone())
    }

    fn market_cap(&self, symbol: &str) -> Option<Decimal> {
        self.symbols
            .get(&symbol.to_uppercase())
            .and_then(|info| info.market_cap)
    }
}
