//! Fire-and-forget notifications about copy executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{CopyExecution, ExecutionStatus, TradeAction};

/// Kind of notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CopyTradeExecuted,
    CopyTradeFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CopyTradeExecuted => "copy_trade_executed",
            NotificationKind::CopyTradeFailed => "copy_trade_failed",
        }
    }
}

/// A message for a follower about one of their executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub execution_id: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build the notification for a finished execution. Skips produce none.
    pub fn for_execution(execution: &CopyExecution) -> Option<Self> {
        let (kind, title, message) = match execution.status {
            ExecutionStatus::Success => (
                NotificationKind::CopyTradeExecuted,
                "Copy trade executed".to_string(),
                format!(
                    "{} {} {} at {}",
                    verb(execution.action),
                    execution.quantity,
                    execution.symbol,
                    execution
                        .executed_price
                        .map(|p| format!("${:.2}", p))
                        .unwrap_or_else(|| "market".to_string())
                ),
            ),
            ExecutionStatus::Failed => (
                NotificationKind::CopyTradeFailed,
                "Copy trade failed".to_string(),
                format!(
                    "Could not copy {} {}: {}",
                    execution.action.as_str().to_lowercase(),
                    execution.symbol,
                    execution.error_message.as_deref().unwrap_or("unknown error")
                ),
            ),
            ExecutionStatus::Skipped | ExecutionStatus::Pending => return None,
        };

        Some(Self {
            user_id: execution.follower_id.clone(),
            kind,
            title,
            message,
            execution_id: execution.id.clone(),
            created_at: Utc::now(),
        })
    }
}

fn verb(action: TradeAction) -> &'static str {
    match action {
        TradeAction::Buy => "Bought",
        TradeAction::Sell => "Sold",
    }
}

/// Output port for notifications. `emit` must not block or fail the caller.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification);
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn emit(&self, notification: Notification) {
        info!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            message = %notification.message,
            "Notification"
        );
    }
}
