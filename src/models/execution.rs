//! Copy execution: the audit record of one attempt to copy one trade for one follower.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetType, CopyRelationship, LeaderTrade, TradeAction};

/// Terminal state of an execution. `Pending` only exists before the record is finalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => anyhow::bail!("Unknown execution status: {}", other),
        }
    }
}

/// Append-only ledger row. Built as `pending`, finalised exactly once, then inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyExecution {
    pub id: String,
    pub trade_id: String,
    pub relationship_id: String,
    pub follower_id: String,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: Decimal,
    pub status: ExecutionStatus,
    pub account_id: Option<String>,
    pub asset_type: AssetType,
    pub order_id: Option<String>,
    pub executed_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
    pub error_message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Order fill details attached to a successful execution.
#[derive(Debug, Clone, Default)]
pub struct FillDetails {
    pub order_id: Option<String>,
    pub executed_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
}

impl CopyExecution {
    /// Start a pending execution for a (trade, relationship) pair.
    pub fn pending(
        trade: &LeaderTrade,
        relationship: &CopyRelationship,
        account_id: Option<&str>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trade_id: trade.id.clone(),
            relationship_id: relationship.id.clone(),
            follower_id: relationship.follower_id.clone(),
            symbol: trade.symbol.clone(),
            action: trade.action,
            quantity: Decimal::ZERO,
            status: ExecutionStatus::Pending,
            account_id: account_id.map(str::to_string),
            asset_type: trade.asset_type,
            order_id: None,
            executed_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            error_message: None,
            executed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.status = ExecutionStatus::Skipped;
        self.error_message = Some(reason.into());
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(reason.into());
        self
    }

    pub fn succeeded(mut self, fill: FillDetails) -> Self {
        self.status = ExecutionStatus::Success;
        self.order_id = fill.order_id;
        self.executed_price = fill.executed_price;
        self.stop_loss_price = fill.stop_loss_price;
        self.take_profit_price = fill.take_profit_price;
        self.error_message = None;
        self.executed_at = Some(Utc::now());
        self
    }

    /// Dollar value of the fill, using `fallback_price` when no fill price was recorded.
    pub fn notional(&self, fallback_price: Decimal) -> Decimal {
        self.quantity * self.executed_price.unwrap_or(fallback_price)
    }
}
