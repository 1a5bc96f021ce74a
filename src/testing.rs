//! In-memory fakes for engine and processor tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::broker::*;
use crate::db::RecordStore;
use crate::models::{
    AssetType, BrokerageConnection, CopyExecution, CopyRelationship, ExecutionStatus, LeaderTrade,
    OrderType, TradeAction,
};
use crate::trading::{Notification, NotificationSink, Sleeper};

/// Records requested delays instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Collects emitted notifications.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub notifications: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn len(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// Scriptable broker.
pub struct FakeBroker {
    pub symbols: Mutex<Result<Vec<SymbolMatch>, String>>,
    pub quote: Mutex<Result<Quote, String>>,
    pub impact: Mutex<Result<TradeImpact, String>>,
    /// Number of leading `place_order` calls that fail
    pub place_failures: AtomicU32,
    pub place_calls: AtomicU32,
    pub quote_calls: AtomicU32,
    pub fill_price: Option<Decimal>,
    pub impact_requests: Mutex<Vec<TradeImpactRequest>>,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self {
            symbols: Mutex::new(Ok(vec![SymbolMatch {
                symbol_id: "sym-aapl".to_string(),
                symbol: "AAPL".to_string(),
                description: "Apple Inc".to_string(),
            }])),
            quote: Mutex::new(Ok(Quote {
                last_price: Some(dec!(50)),
                ..Default::default()
            })),
            impact: Mutex::new(Ok(TradeImpact {
                trade: Some(ImpactTrade {
                    id: "ticket-1".to_string(),
                    price: None,
                }),
                trade_impacts: vec![ImpactDetail::default()],
            })),
            place_failures: AtomicU32::new(0),
            place_calls: AtomicU32::new(0),
            quote_calls: AtomicU32::new(0),
            fill_price: Some(dec!(187.50)),
            impact_requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBroker {
    pub fn failing_orders(failures: u32) -> Self {
        let broker = Self::default();
        broker.place_failures.store(failures, Ordering::SeqCst);
        broker
    }

    pub fn set_symbols(&self, result: Result<Vec<SymbolMatch>, String>) {
        *self.symbols.lock().unwrap() = result;
    }

    pub fn set_quote(&self, result: Result<Quote, String>) {
        *self.quote.lock().unwrap() = result;
    }

    pub fn set_impact(&self, result: Result<TradeImpact, String>) {
        *self.impact.lock().unwrap() = result;
    }

    pub fn place_calls(&self) -> u32 {
        self.place_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerGateway for FakeBroker {
    async fn search_symbols(&self, _query: &str) -> Result<Vec<SymbolMatch>> {
        self.symbols.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }

    async fn get_quote(
        &self,
        _credentials: &BrokerCredentials,
        _account_id: &str,
        _symbol: &str,
    ) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.quote.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }

    async fn check_trade_impact(
        &self,
        _credentials: &BrokerCredentials,
        request: &TradeImpactRequest,
    ) -> Result<TradeImpact> {
        self.impact_requests.lock().unwrap().push(request.clone());
        self.impact.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }

    async fn place_order(
        &self,
        _credentials: &BrokerCredentials,
        trade_id: &str,
        _wait_to_confirm: bool,
    ) -> Result<PlacedOrder> {
        let call = self.place_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.place_failures.load(Ordering::SeqCst) {
            return Err(anyhow!("Rate limited on attempt {}", call));
        }
        Ok(PlacedOrder {
            order_id: Some(format!("order-{}", trade_id)),
            executed_price: self.fill_price,
            status: Some("EXECUTED".to_string()),
            filled_units: None,
        })
    }

    async fn cancel_order(
        &self,
        _credentials: &BrokerCredentials,
        _account_id: &str,
        _order_id: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Record store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub trades: Mutex<Vec<LeaderTrade>>,
    pub relationships: Mutex<Vec<CopyRelationship>>,
    pub connections: Mutex<HashMap<String, BrokerageConnection>>,
    pub executions: Mutex<Vec<CopyExecution>>,
    /// Leader ids whose relationship lookup fails
    pub failing_leaders: Mutex<Vec<String>>,
    pub fail_pending: Mutex<bool>,
    /// When set, `insert_execution` errors and the row is kept in `dropped`
    pub fail_inserts: Mutex<bool>,
    pub dropped: Mutex<Vec<CopyExecution>>,
}

impl MemoryStore {
    pub fn add_trade(&self, trade: LeaderTrade) {
        self.trades.lock().unwrap().push(trade);
    }

    pub fn add_relationship(&self, relationship: CopyRelationship) {
        self.relationships.lock().unwrap().push(relationship);
    }

    pub fn add_connection(&self, user_id: &str, cash_balance: Decimal) {
        self.connections.lock().unwrap().insert(
            user_id.to_string(),
            BrokerageConnection {
                id: format!("conn-{}", user_id),
                user_id: user_id.to_string(),
                account_id: format!("acct-{}", user_id),
                broker_user_id: format!("bu-{}", user_id),
                broker_user_secret: "secret".to_string(),
                cash_balance,
                is_active: true,
            },
        );
    }

    pub fn executions(&self) -> Vec<CopyExecution> {
        self.executions.lock().unwrap().clone()
    }

    pub fn executions_for(&self, relationship_id: &str) -> Vec<CopyExecution> {
        self.executions()
            .into_iter()
            .filter(|e| e.relationship_id == relationship_id)
            .collect()
    }

    pub fn trades_copied(&self, relationship_id: &str) -> i64 {
        self.relationships
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == relationship_id)
            .map(|r| r.total_trades_copied)
            .unwrap_or(0)
    }

    pub fn is_processed(&self, trade_id: &str) -> bool {
        self.trades
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.id == trade_id && t.processed)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn pending_trades(&self) -> Result<Vec<LeaderTrade>> {
        if *self.fail_pending.lock().unwrap() {
            return Err(anyhow!("database unavailable"));
        }
        let mut pending: Vec<_> = self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| !t.processed)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.detected_at);
        Ok(pending)
    }

    async fn get_trade(&self, trade_id: &str) -> Result<Option<LeaderTrade>> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == trade_id)
            .cloned())
    }

    async fn mark_trade_processed(&self, trade_id: &str) -> Result<()> {
        let executions = self.executions.lock().unwrap();
        let mut trades = self.trades.lock().unwrap();
        if let Some(trade) = trades.iter_mut().find(|t| t.id == trade_id) {
            // Every active follower must already have a ledger row.
            let followers = self
                .relationships
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.leader_id == trade.leader_id && r.is_active())
                .count();
            let dropped = self.dropped.lock().unwrap();
            let recorded = executions
                .iter()
                .chain(dropped.iter())
                .filter(|e| e.trade_id == trade_id)
                .count();
            assert!(recorded >= followers, "trade {} marked before all followers ran", trade_id);
            trade.processed = true;
        }
        Ok(())
    }

    async fn active_relationships(&self, leader_id: &str) -> Result<Vec<CopyRelationship>> {
        if self.failing_leaders.lock().unwrap().iter().any(|l| l == leader_id) {
            return Err(anyhow!("relationship query failed"));
        }
        Ok(self
            .relationships
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.leader_id == leader_id && r.is_active())
            .cloned()
            .collect())
    }

    async fn active_connection(&self, user_id: &str) -> Result<Option<BrokerageConnection>> {
        Ok(self
            .connections
            .lock()
            .unwrap()
            .get(user_id)
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn successful_executions(
        &self,
        relationship_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CopyExecution>> {
        Ok(self
            .executions()
            .into_iter()
            .filter(|e| e.relationship_id == relationship_id)
            .filter(|e| e.status == ExecutionStatus::Success)
            .filter(|e| since.map_or(true, |s| e.created_at >= s))
            .collect())
    }

    async fn insert_execution(&self, execution: &CopyExecution) -> Result<()> {
        if *self.fail_inserts.lock().unwrap() {
            self.dropped.lock().unwrap().push(execution.clone());
            return Err(anyhow!("disk I/O error"));
        }
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }

    async fn increment_trades_copied(&self, relationship_id: &str) -> Result<()> {
        if let Some(rel) = self
            .relationships
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.id == relationship_id)
        {
            rel.total_trades_copied += 1;
        }
        Ok(())
    }
}

/// A market buy of 10 AAPL by `leader` at `price`.
pub fn leader_trade(id: &str, leader_id: &str, price: Option<Decimal>) -> LeaderTrade {
    LeaderTrade {
        id: id.to_string(),
        leader_id: leader_id.to_string(),
        account_id: format!("acct-{}", leader_id),
        symbol: "AAPL".to_string(),
        action: TradeAction::Buy,
        quantity: dec!(10),
        price,
        order_type: OrderType::Market,
        asset_type: AssetType::Stock,
        option: None,
        external_order_id: None,
        processed: false,
        detected_at: Utc::now(),
    }
}
