//! Copy engine configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::trade_filter::{DEFAULT_FALLBACK_BALANCE, DEFAULT_FALLBACK_PRICE};

/// Configuration for the per-follower execution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Price assumed when neither the trade nor a quote supplies one
    pub fallback_price: Decimal,

    /// Balance assumed by exposure checks when the account reports none
    pub fallback_balance: Decimal,

    /// Total order placement attempts (first try included)
    pub max_order_attempts: u32,

    /// Wait before the second attempt; doubles after each failure
    pub retry_base_delay_ms: u64,

    /// Ask the broker to confirm the fill before responding
    pub wait_to_confirm: bool,

    /// Followers of one trade processed at the same time
    pub follower_concurrency: usize,

    /// Time in force sent with every order
    pub time_in_force: String,
}

impl EngineConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_price: DEFAULT_FALLBACK_PRICE,
            fallback_balance: DEFAULT_FALLBACK_BALANCE,
            max_order_attempts: 3,
            retry_base_delay_ms: 1000,
            wait_to_confirm: true,
            follower_concurrency: 4,
            time_in_force: "Day".to_string(),
        }
    }
}
