//! Follower positions and daily activity, reconstructed from the execution ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CopyExecution, ExecutionStatus, TradeAction};

/// Net holding in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Net shares held
    pub quantity: Decimal,

    /// Net dollar value at fill prices
    pub value: Decimal,
}

/// Open positions keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: HashMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay successful executions: buys add, sells subtract, flat or short symbols drop out.
    pub fn from_executions(executions: &[CopyExecution], fallback_price: Decimal) -> Self {
        let mut positions: HashMap<String, Position> = HashMap::new();

        for exec in executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Success)
        {
            let value = exec.notional(fallback_price);
            let entry = positions.entry(exec.symbol.clone()).or_insert_with(|| Position {
                symbol: exec.symbol.clone(),
                quantity: Decimal::ZERO,
                value: Decimal::ZERO,
            });

            match exec.action {
                TradeAction::Buy => {
                    entry.quantity += exec.quantity;
                    entry.value += value;
                }
                TradeAction::Sell => {
                    entry.quantity -= exec.quantity;
                    entry.value -= value;
                }
            }
        }

        positions.retain(|_, p| p.quantity > Decimal::ZERO);
        Self { positions }
    }

    /// Insert or replace a position.
    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Dollar value held in `symbol`, zero if none.
    pub fn value_of(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Number of distinct symbols held.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }
}

/// Successful executions since local midnight for one relationship.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyActivity {
    pub trade_count: u32,
    pub volume: Decimal,
}

impl DailyActivity {
    /// Sum successful executions created at or after `since`.
    pub fn from_executions(
        executions: &[CopyExecution],
        since: DateTime<Utc>,
        fallback_price: Decimal,
    ) -> Self {
        executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Success && e.created_at >= since)
            .fold(Self::default(), |acc, e| Self {
                trade_count: acc.trade_count + 1,
                volume: acc.volume + e.notional(fallback_price),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetType, CopyRelationship, FillDetails, LeaderTrade, OrderType};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn exec(symbol: &str, action: TradeAction, qty: Decimal, price: Decimal) -> CopyExecution {
        let trade = LeaderTrade {
            id: "t".to_string(),
            leader_id: "l".to_string(),
            account_id: "a".to_string(),
            symbol: symbol.to_string(),
            action,
            quantity: qty,
            price: Some(price),
            order_type: OrderType::Market,
            asset_type: AssetType::Stock,
            option: None,
            external_order_id: None,
            processed: false,
            detected_at: Utc::now(),
        };
        let rel = CopyRelationship::new("r", "l", "f");
        CopyExecution::pending(&trade, &rel, None)
            .with_quantity(qty)
            .succeeded(FillDetails {
                executed_price: Some(price),
                ..Default::default()
            })
    }

    #[test]
    fn test_replay_nets_buys_and_sells() {
        let executions = vec![
            exec("AAPL", TradeAction::Buy, dec!(10), dec!(150)),
            exec("AAPL", TradeAction::Sell, dec!(4), dec!(160)),
            exec("TSLA", TradeAction::Buy, dec!(2), dec!(200)),
            exec("TSLA", TradeAction::Sell, dec!(2), dec!(210)),
        ];

        let book = PositionBook::from_executions(&executions, dec!(100));

        assert_eq!(book.len(), 1);
        let aapl = book.get("AAPL").unwrap();
        assert_eq!(aapl.quantity, dec!(6));
        assert_eq!(aapl.value, dec!(860)); // 1500 - 640
        assert!(book.get("TSLA").is_none());
    }

    #[test]
    fn test_replay_ignores_non_success() {
        let failed = exec("NVDA", TradeAction::Buy, dec!(1), dec!(900)).failed("boom");
        let book = PositionBook::from_executions(&[failed], dec!(100));
        assert!(book.is_empty());
    }

    #[test]
    fn test_daily_activity_window() {
        let mut old = exec("AAPL", TradeAction::Buy, dec!(1), dec!(100));
        old.created_at = Utc::now() - Duration::days(2);
        let fresh = exec("AAPL", TradeAction::Buy, dec!(3), dec!(50));

        let since = Utc::now() - Duration::hours(1);
        let today = DailyActivity::from_executions(&[old, fresh], since, dec!(100));

        assert_eq!(today.trade_count, 1);
        assert_eq!(today.volume, dec!(150));
    }
}
