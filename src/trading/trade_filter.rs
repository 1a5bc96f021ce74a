//! Trade filtering and exposure limits.
//!
//! Two stages, evaluated in order, first failure wins:
//! - Attribute filters (penny stocks, options, 0DTE, crypto, market cap, price, sector)
//! - Exposure limits (open positions, position/sector concentration, daily trades/volume)

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::models::{AssetType, CopyRelationship, ExposureLimits, LeaderTrade, PositionBook, TradeFilters};

use super::ReferenceData;

/// Below this price a stock counts as a penny stock.
const PENNY_STOCK_THRESHOLD: Decimal = dec!(5.00);

/// Price assumed for exposure estimates when the trade price is unknown.
pub const DEFAULT_FALLBACK_PRICE: Decimal = dec!(100.0);

/// Balance assumed for concentration checks when the account reports none.
pub const DEFAULT_FALLBACK_BALANCE: Decimal = dec!(10000);

/// Whether a trade should be copied, and why not.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub should_copy: bool,
    pub reason: Option<String>,
}

impl FilterResult {
    pub fn accept() -> Self {
        Self {
            should_copy: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            should_copy: false,
            reason: Some(reason.into()),
        }
    }
}

/// Stateless filter engine over injected reference data.
#[derive(Clone)]
pub struct TradeFilter {
    reference: Arc<dyn ReferenceData>,
    fallback_price: Decimal,
    fallback_balance: Decimal,
}

impl TradeFilter {
    pub fn new(reference: Arc<dyn ReferenceData>) -> Self {
        Self {
            reference,
            fallback_price: DEFAULT_FALLBACK_PRICE,
            fallback_balance: DEFAULT_FALLBACK_BALANCE,
        }
    }

    /// Override the placeholder price and balance used by exposure estimates.
    pub fn with_fallbacks(mut self, price: Decimal, balance: Decimal) -> Self {
        self.fallback_price = price;
        self.fallback_balance = balance;
        self
    }

    /// Decide whether `trade` should be copied under `relationship`'s filters and limits.
    pub fn should_copy_trade(
        &self,
        trade: &LeaderTrade,
        relationship: &CopyRelationship,
        account_balance: Decimal,
        positions: &PositionBook,
        today_trade_count: u32,
        today_volume: Decimal,
    ) -> FilterResult {
        self.should_copy_trade_on(
            trade,
            relationship,
            account_balance,
            positions,
            today_trade_count,
            today_volume,
            Local::now().date_naive(),
        )
    }

    /// Same as [`should_copy_trade`](Self::should_copy_trade) with an explicit calendar date.
    #[allow(clippy::too_many_arguments)]
    pub fn should_copy_trade_on(
        &self,
        trade: &LeaderTrade,
        relationship: &CopyRelationship,
        account_balance: Decimal,
        positions: &PositionBook,
        today_trade_count: u32,
        today_volume: Decimal,
        today: NaiveDate,
    ) -> FilterResult {
        if let Some(reason) = self.check_attributes(trade, &relationship.filters, today) {
            debug!(trade_id = %trade.id, symbol = %trade.symbol, reason = %reason, "Trade filtered");
            return FilterResult::reject(reason);
        }

        if relationship.limits.enabled {
            if let Some(reason) = self.check_exposure(
                trade,
                &relationship.limits,
                account_balance,
                positions,
                today_trade_count,
                today_volume,
            ) {
                debug!(trade_id = %trade.id, symbol = %trade.symbol, reason = %reason, "Exposure limit hit");
                return FilterResult::reject(reason);
            }
        }

        FilterResult::accept()
    }

    fn check_attributes(
        &self,
        trade: &LeaderTrade,
        filters: &TradeFilters,
        today: NaiveDate,
    ) -> Option<String> {
        let price = trade.known_price();

        if filters.skip_penny_stocks {
            if let Some(p) = price {
                if p < PENNY_STOCK_THRESHOLD {
                    return Some(format!(
                        "Penny stock: price ${:.2} below ${:.2}",
                        p, PENNY_STOCK_THRESHOLD
                    ));
                }
            }
        }

        if filters.skip_options && trade.asset_type == AssetType::Option {
            return Some("Options trading disabled".to_string());
        }

        if filters.skip_0dte_options && trade.asset_type == AssetType::Option {
            let expiry = trade.option.as_ref().and_then(|o| o.expiration_date());
            if let Some(expiry) = expiry {
                if (expiry - today).num_days() == 0 {
                    return Some(format!("0DTE option expiring {}", expiry));
                }
            }
        }

        if filters.skip_crypto && trade.asset_type == AssetType::Crypto {
            return Some("Crypto trading disabled".to_string());
        }

        if filters.market_cap_filter_enabled {
            if let Some(cap) = self.reference.market_cap(&trade.symbol) {
                if let Some(min) = filters.min_market_cap {
                    if cap < min {
                        return Some(format!(
                            "Market cap {} below minimum {}",
                            format_billions(cap),
                            format_billions(min)
                        ));
                    }
                }
                if let Some(max) = filters.max_market_cap {
                    if cap > max {
                        return Some(format!(
                            "Market cap {} above maximum {}",
                            format_billions(cap),
                            format_billions(max)
                        ));
                    }
                }
            }
        }

        if filters.price_filter_enabled {
            if let Some(p) = price {
                if let Some(min) = filters.min_price {
                    if p < min {
                        return Some(format!("Price ${:.2} below minimum ${:.2}", p, min));
                    }
                }
                if let Some(max) = filters.max_price {
                    if p > max {
                        return Some(format!("Price ${:.2} above maximum ${:.2}", p, max));
                    }
                }
            }
        }

        if filters.sector_filter_enabled {
            if let Some(sector) = self.reference.sector(&trade.symbol) {
                if !filters.allowed_sectors.is_empty()
                    && !filters
                        .allowed_sectors
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(&sector))
                {
                    return Some(format!("Sector {} not in allowed sectors", sector));
                }
                if filters
                    .blocked_sectors
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&sector))
                {
                    return Some(format!("Sector {} is blocked", sector));
                }
            }
        }

        None
    }

    fn check_exposure(
        &self,
        trade: &LeaderTrade,
        limits: &ExposureLimits,
        account_balance: Decimal,
        positions: &PositionBook,
        today_trade_count: u32,
        today_volume: Decimal,
    ) -> Option<String> {
        if let Some(max_positions) = limits.max_open_positions {
            if positions.len() >= max_positions as usize {
                return Some(format!(
                    "Open positions {} >= max {}",
                    positions.len(),
                    max_positions
                ));
            }
        }

        let balance = if account_balance > Decimal::ZERO {
            account_balance
        } else {
            self.fallback_balance
        };
        let trade_value = trade.estimated_value(self.fallback_price);

        if let Some(max_pct) = limits.max_position_concentration {
            let total = positions.value_of(&trade.symbol) + trade_value;
            let pct = total / balance * dec!(100);
            if pct > max_pct {
                return Some(format!(
                    "Position concentration {:.1}% > max {:.1}%",
                    pct, max_pct
                ));
            }
        }

        if let Some(max_pct) = limits.max_sector_concentration {
            if let Some(sector) = self.reference.sector(&trade.symbol) {
                let sector_value: Decimal = positions
                    .iter()
                    .filter(|p| {
                        self.reference
                            .sector(&p.symbol)
                            .is_some_and(|s| s.eq_ignore_ascii_case(&sector))
                    })
                    .map(|p| p.value)
                    .sum();
                let pct = (sector_value + trade_value) / balance * dec!(100);
                if pct > max_pct {
                    return Some(format!(
                        "Sector {} concentration {:.1}% > max {:.1}%",
                        sector, pct, max_pct
                    ));
                }
            }
        }

        if let Some(max_trades) = limits.max_daily_trades {
            if today_trade_count >= max_trades {
                return Some(format!(
                    "Daily trade limit reached: {} >= max {}",
                    today_trade_count, max_trades
                ));
            }
        }

        if let Some(max_volume) = limits.max_daily_volume {
            let projected = today_volume + trade_value;
            if projected > max_volume {
                return Some(format!(
                    "Daily volume ${:.2} would exceed max ${:.2}",
                    projected, max_volume
                ));
            }
        }

        None
    }
}

fn format_billions(value: Decimal) -> String {
    format!("${:.1}B", value / dec!(1_000_000_000))
}
