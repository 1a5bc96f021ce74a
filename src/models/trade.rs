//! Leader trade model: a trade a leader's brokerage executed or reported.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => anyhow::bail!("Unknown trade action: {}", other),
        }
    }
}

/// Asset class of the traded instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Option,
    Etf,
    Crypto,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "stock",
            AssetType::Option => "option",
            AssetType::Etf => "etf",
            AssetType::Crypto => "crypto",
        }
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" | "equity" => Ok(Self::Stock),
            "option" => Ok(Self::Option),
            "etf" => Ok(Self::Etf),
            "crypto" | "cryptocurrency" => Ok(Self::Crypto),
            other => anyhow::bail!("Unknown asset type: {}", other),
        }
    }
}

/// Order type the leader used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "Market",
            OrderType::Limit => "Limit",
            OrderType::Stop => "StopLoss",
            OrderType::StopLimit => "StopLimit",
        }
    }

    /// Whether the order carries a limit price the broker needs.
    pub fn needs_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }
}

impl FromStr for OrderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            "stop" | "stoploss" | "stop_loss" => Ok(Self::Stop),
            "stop_limit" | "stoplimit" => Ok(Self::StopLimit),
            other => anyhow::bail!("Unknown order type: {}", other),
        }
    }
}

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// Contract details for option trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionDetails {
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
    /// Raw expiration as reported upstream (`YYYY-MM-DD` or RFC 3339).
    pub expiration: Option<String>,
    pub contracts: Option<Decimal>,
}

impl OptionDetails {
    /// Parse the expiration date. Malformed values yield `None`.
    pub fn expiration_date(&self) -> Option<NaiveDate> {
        let raw = self.expiration.as_deref()?.trim();
        let date_part = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }
}

/// A trade made by a leader, waiting to be fanned out to followers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderTrade {
    pub id: String,

    /// User id of the leader
    pub leader_id: String,

    /// Brokerage account the leader traded in
    pub account_id: String,

    /// Ticker symbol
    pub symbol: String,

    pub action: TradeAction,

    /// Number of shares (or contracts) traded
    pub quantity: Decimal,

    /// Fill price, unknown at detection time for some sources
    pub price: Option<Decimal>,

    pub order_type: OrderType,

    pub asset_type: AssetType,

    #[serde(default)]
    pub option: Option<OptionDetails>,

    /// Order id at the leader's brokerage
    #[serde(default)]
    pub external_order_id: Option<String>,

    #[serde(default)]
    pub processed: bool,

    pub detected_at: DateTime<Utc>,
}

impl LeaderTrade {
    /// Price if known and positive.
    pub fn known_price(&self) -> Option<Decimal> {
        self.price.filter(|p| *p > Decimal::ZERO)
    }

    /// Estimated dollar value, using `fallback_price` when the price is unknown.
    pub fn estimated_value(&self, fallback_price: Decimal) -> Decimal {
        self.quantity * self.price.unwrap_or(fallback_price)
    }
}
