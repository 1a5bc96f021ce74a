//! Copy relationship: one follower subscribed to one leader.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Subscription state of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Active,
    Paused,
    Stopped,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Active => "active",
            RelationshipStatus::Paused => "paused",
            RelationshipStatus::Stopped => "stopped",
        }
    }
}

impl FromStr for RelationshipStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "stopped" | "cancelled" => Ok(Self::Stopped),
            other => anyhow::bail!("Unknown relationship status: {}", other),
        }
    }
}

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// Percentage of the follower's balance
    Proportional,
    /// Fixed dollar amount per trade
    FixedDollar,
    /// Fixed number of shares per trade
    FixedShares,
    /// Risk a percentage of balance against the stop-loss distance
    RiskBased,
    /// Multiple of the leader's quantity
    Multiplier,
}

impl SizingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingMethod::Proportional => "proportional",
            SizingMethod::FixedDollar => "fixed_dollar",
            SizingMethod::FixedShares => "fixed_shares",
            SizingMethod::RiskBased => "risk_based",
            SizingMethod::Multiplier => "multiplier",
        }
    }
}

impl fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SizingMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "proportional" | "percentage" => Ok(Self::Proportional),
            "fixed_dollar" | "fixed" => Ok(Self::FixedDollar),
            "fixed_shares" => Ok(Self::FixedShares),
            "risk_based" => Ok(Self::RiskBased),
            "multiplier" => Ok(Self::Multiplier),
            other => anyhow::bail!("Unknown sizing method: {}", other),
        }
    }
}

/// Sizing method and its parameters. Only the active method's parameter is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub method: SizingMethod,
    pub allocation_percent: Option<Decimal>,
    pub fixed_dollar_amount: Option<Decimal>,
    pub fixed_shares_amount: Option<Decimal>,
    pub risk_percent: Option<Decimal>,
    pub multiplier: Option<Decimal>,
    /// Dollar cap on a single copied position
    pub max_position_size: Option<Decimal>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::Proportional,
            allocation_percent: None,
            fixed_dollar_amount: None,
            fixed_shares_amount: None,
            risk_percent: None,
            multiplier: None,
            max_position_size: None,
        }
    }
}

/// Automatic stop-loss / take-profit settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectiveOrders {
    pub auto_stop_loss: bool,
    pub stop_loss_percent: Option<Decimal>,
    pub auto_take_profit: bool,
    pub take_profit_percent: Option<Decimal>,
}

/// Attribute filters evaluated before exposure limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFilters {
    pub skip_penny_stocks: bool,
    pub skip_options: bool,
    pub skip_0dte_options: bool,
    pub skip_crypto: bool,

    pub market_cap_filter_enabled: bool,
    pub min_market_cap: Option<Decimal>,
    pub max_market_cap: Option<Decimal>,

    pub price_filter_enabled: bool,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,

    pub sector_filter_enabled: bool,
    #[serde(default)]
    pub allowed_sectors: Vec<String>,
    #[serde(default)]
    pub blocked_sectors: Vec<String>,
}

/// Exposure limits, all percentages on a 0-100 scale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExposureLimits {
    pub enabled: bool,
    pub max_position_concentration: Option<Decimal>,
    pub max_sector_concentration: Option<Decimal>,
    pub max_open_positions: Option<u32>,
    pub max_daily_trades: Option<u32>,
    pub max_daily_volume: Option<Decimal>,
}

/// A follower's standing subscription to a leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyRelationship {
    pub id: String,
    pub leader_id: String,
    pub follower_id: String,
    pub status: RelationshipStatus,
    pub sizing: SizingConfig,
    pub protective: ProtectiveOrders,
    pub filters: TradeFilters,
    pub limits: ExposureLimits,
    pub total_trades_copied: i64,
}

impl CopyRelationship {
    /// New active relationship with default (10% proportional) sizing and no filters.
    pub fn new(id: impl Into<String>, leader_id: impl Into<String>, follower_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            leader_id: leader_id.into(),
            follower_id: follower_id.into(),
            status: RelationshipStatus::Active,
            sizing: SizingConfig::default(),
            protective: ProtectiveOrders::default(),
            filters: TradeFilters::default(),
            limits: ExposureLimits::default(),
            total_trades_copied: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }
}

/// A follower's linked brokerage account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerageConnection {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    /// Brokerage API user id
    pub broker_user_id: String,
    /// Brokerage API user secret
    #[serde(skip_serializing)]
    pub broker_user_secret: String,
    pub cash_balance: Decimal,
    pub is_active: bool,
}
