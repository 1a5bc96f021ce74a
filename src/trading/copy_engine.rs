//! Copy-trading engine: fans a leader trade out to followers and executes each copy.
//!
//! Per follower the pipeline runs filter, symbol resolution, pricing, sizing,
//! pre-trade check and order placement. Every path ends in exactly one
//! `CopyExecution` row (success, failed or skipped).

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerCredentials, BrokerGateway, TradeImpact, TradeImpactRequest};
use crate::db::RecordStore;
use crate::models::{
    BrokerageConnection, CopyExecution, CopyRelationship, DailyActivity, ExecutionStatus,
    FillDetails, LeaderTrade, PositionBook,
};

use super::position_sizer::{stop_loss_price, take_profit_price};
use super::{
    EngineConfig, Notification, NotificationSink, PositionSizer, ReferenceData, RetryPolicy,
    Sleeper, TokioSleeper, TradeFilter,
};

const NO_ACCOUNT: &str = "No brokerage account connected";
const SYMBOL_NOT_FOUND: &str = "Symbol not found";
const ZERO_SIZE: &str = "Position size calculated as 0";
const IMPACT_FAILED: &str = "Trade impact validation failed";

/// Execution counts for one leader trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeSummary {
    pub executions: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Executions whose ledger row could not be written
    pub unrecorded: usize,
}

impl TradeSummary {
    pub fn record(&mut self, status: ExecutionStatus) {
        self.executions += 1;
        match status {
            ExecutionStatus::Success => self.success += 1,
            ExecutionStatus::Failed => self.failed += 1,
            ExecutionStatus::Skipped => self.skipped += 1,
            ExecutionStatus::Pending => {}
        }
    }
}

impl fmt::Display for TradeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executions ({} success, {} failed, {} skipped)",
            self.executions, self.success, self.failed, self.skipped
        )?;
        if self.unrecorded > 0 {
            write!(f, ", {} not recorded", self.unrecorded)?;
        }
        Ok(())
    }
}

/// A finished execution and whether its ledger row was written.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    pub execution: CopyExecution,
    pub recorded: bool,
}

/// Orchestrates copy execution over injected broker, store and notification sink.
pub struct CopyEngine {
    broker: Arc<dyn BrokerGateway>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationSink>,
    filter: TradeFilter,
    sizer: PositionSizer,
    retry: RetryPolicy,
    config: EngineConfig,
}

impl CopyEngine {
    /// Create a new copy engine.
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn NotificationSink>,
        reference: Arc<dyn ReferenceData>,
        config: EngineConfig,
    ) -> Self {
        let filter = TradeFilter::new(reference)
            .with_fallbacks(config.fallback_price, config.fallback_balance);
        let retry = RetryPolicy::new(
            config.max_order_attempts,
            config.retry_base_delay(),
            Arc::new(TokioSleeper),
        );

        Self {
            broker,
            store,
            notifier,
            filter,
            sizer: PositionSizer::new(),
            retry,
            config,
        }
    }

    /// Replace how retry delays are waited out.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = RetryPolicy::new(
            self.config.max_order_attempts,
            self.config.retry_base_delay(),
            sleeper,
        );
        self
    }

    /// Copy one leader trade to every active follower.
    ///
    /// Fails only when the follower list cannot be loaded; per-follower
    /// problems end up in the ledger instead.
    pub async fn process_trade(&self, trade: &LeaderTrade) -> Result<TradeSummary> {
        let relationships = self
            .store
            .active_relationships(&trade.leader_id)
            .await
            .with_context(|| format!("Failed to load followers of {}", trade.leader_id))?;

        info!(
            trade_id = %trade.id,
            leader_id = %trade.leader_id,
            symbol = %trade.symbol,
            action = %trade.action,
            followers = relationships.len(),
            "Processing leader trade"
        );

        let outcomes: Vec<CopyOutcome> = stream::iter(relationships.iter())
            .map(|relationship| self.copy_for_follower(trade, relationship))
            .buffer_unordered(self.config.follower_concurrency.max(1))
            .collect()
            .await;

        let mut summary = TradeSummary::default();
        for outcome in outcomes {
            summary.record(outcome.execution.status);
            if !outcome.recorded {
                summary.unrecorded += 1;
            }
        }

        if summary.unrecorded > 0 {
            error!(
                trade_id = %trade.id,
                unrecorded = summary.unrecorded,
                "Ledger is missing executions for this trade"
            );
        }
        info!(trade_id = %trade.id, summary = %summary, "Leader trade processed");
        Ok(summary)
    }

    async fn copy_for_follower(
        &self,
        trade: &LeaderTrade,
        relationship: &CopyRelationship,
    ) -> CopyOutcome {
        match self.store.active_connection(&relationship.follower_id).await {
            Ok(Some(connection)) => self.execute_copy_trade(trade, relationship, &connection).await,
            Ok(None) => {
                info!(
                    trade_id = %trade.id,
                    follower_id = %relationship.follower_id,
                    "Follower has no active brokerage account"
                );
                let execution = CopyExecution::pending(trade, relationship, None).skipped(NO_ACCOUNT);
                self.finish(execution).await
            }
            Err(e) => {
                error!(
                    trade_id = %trade.id,
                    follower_id = %relationship.follower_id,
                    error = %e,
                    "Failed to load brokerage connection"
                );
                let execution =
                    CopyExecution::pending(trade, relationship, None).failed(e.to_string());
                self.finish(execution).await
            }
        }
    }

    /// Copy `trade` into one follower's account. Never returns an error:
    /// anything unexpected becomes a failed execution.
    pub async fn execute_copy_trade(
        &self,
        trade: &LeaderTrade,
        relationship: &CopyRelationship,
        connection: &BrokerageConnection,
    ) -> CopyOutcome {
        let pending = CopyExecution::pending(trade, relationship, Some(&connection.account_id));

        let execution = match self
            .run_pipeline(trade, relationship, connection, pending.clone())
            .await
        {
            Ok(execution) => execution,
            Err(e) => {
                warn!(
                    trade_id = %trade.id,
                    relationship_id = %relationship.id,
                    error = %e,
                    "Copy trade aborted"
                );
                pending.failed(e.to_string())
            }
        };

        self.finish(execution).await
    }

    async fn run_pipeline(
        &self,
        trade: &LeaderTrade,
        relationship: &CopyRelationship,
        connection: &BrokerageConnection,
        execution: CopyExecution,
    ) -> Result<CopyExecution> {
        let fallback_price = self.config.fallback_price;

        // 1. Positions and today's activity
        let since = local_midnight();
        let (history, today) = tokio::try_join!(
            self.store.successful_executions(&relationship.id, None),
            self.store.successful_executions(&relationship.id, Some(since)),
        )
        .context("Failed to load execution history")?;
        let positions = PositionBook::from_executions(&history, fallback_price);
        let daily = DailyActivity::from_executions(&today, since, fallback_price);

        // 2. Filters and exposure limits
        let verdict = self.filter.should_copy_trade(
            trade,
            relationship,
            connection.cash_balance,
            &positions,
            daily.trade_count,
            daily.volume,
        );
        if !verdict.should_copy {
            let reason = verdict.reason.unwrap_or_else(|| "Filtered".to_string());
            info!(
                trade_id = %trade.id,
                relationship_id = %relationship.id,
                reason = %reason,
                "Copy skipped by filter"
            );
            return Ok(execution.skipped(reason));
        }

        // 3. Symbol
        let Some(symbol_id) = self.resolve_symbol(&trade.symbol).await else {
            return Ok(execution.failed(SYMBOL_NOT_FOUND));
        };

        // 4. Price
        let credentials = BrokerCredentials::from(connection);
        let price = self
            .current_price(trade, &credentials, &connection.account_id)
            .await;

        // 5. Size
        let size = self.sizer.calculate_position_size(
            relationship,
            trade.quantity,
            trade.known_price(),
            connection.cash_balance,
            price,
        );
        if size.is_zero() {
            let reason = match &size.error {
                Some(err) => format!("{}: {}", ZERO_SIZE, err),
                None => ZERO_SIZE.to_string(),
            };
            info!(
                trade_id = %trade.id,
                relationship_id = %relationship.id,
                reason = %reason,
                "Copy skipped"
            );
            return Ok(execution.skipped(reason));
        }
        let execution = execution.with_quantity(size.quantity);

        // 6. Pre-trade check
        let request = TradeImpactRequest {
            account_id: connection.account_id.clone(),
            action: trade.action.as_str().to_string(),
            universal_symbol_id: symbol_id,
            order_type: trade.order_type.as_str().to_string(),
            time_in_force: self.config.time_in_force.clone(),
            units: size.quantity,
            price: trade.order_type.needs_price().then_some(price),
        };
        let ticket = match self.broker.check_trade_impact(&credentials, &request).await {
            Ok(TradeImpact {
                trade: Some(ticket), ..
            }) => ticket,
            Ok(_) => {
                warn!(trade_id = %trade.id, relationship_id = %relationship.id, "Trade impact returned no ticket");
                return Ok(execution.failed(IMPACT_FAILED));
            }
            Err(e) => {
                warn!(trade_id = %trade.id, relationship_id = %relationship.id, error = %e, "Trade impact check failed");
                return Ok(execution.failed(IMPACT_FAILED));
            }
        };

        // 7. Place with retry
        let broker = &self.broker;
        let creds = &credentials;
        let ticket_id = ticket.id.as_str();
        let wait_to_confirm = self.config.wait_to_confirm;
        let order = match self
            .retry
            .execute("place_order", move |attempt| {
                debug!(ticket_id = %ticket_id, attempt, "Placing order");
                broker.place_order(creds, ticket_id, wait_to_confirm)
            })
            .await
        {
            Ok(order) => order,
            Err(e) => return Ok(execution.failed(e.to_string())),
        };

        // 8. Fill details and protective prices
        let executed_price = order.executed_price.or(ticket.price).unwrap_or(price);
        let protective = &relationship.protective;
        let stop_loss = protective
            .stop_loss_percent
            .filter(|_| protective.auto_stop_loss)
            .map(|pct| stop_loss_price(executed_price, pct, trade.action));
        let take_profit = protective
            .take_profit_percent
            .filter(|_| protective.auto_take_profit)
            .map(|pct| take_profit_price(executed_price, pct, trade.action));

        // 9. Counter; the order is live, so a failed update only gets logged
        if let Err(e) = self.store.increment_trades_copied(&relationship.id).await {
            error!(relationship_id = %relationship.id, error = %e, "Failed to increment trades copied");
        }

        info!(
            trade_id = %trade.id,
            relationship_id = %relationship.id,
            follower_id = %relationship.follower_id,
            symbol = %trade.symbol,
            quantity = %size.quantity,
            price = %executed_price,
            "Copy trade executed"
        );

        Ok(execution.succeeded(FillDetails {
            order_id: order.order_id,
            executed_price: Some(executed_price),
            stop_loss_price: stop_loss,
            take_profit_price: take_profit,
        }))
    }

    /// Broker symbol id: exact (case-insensitive) ticker match, else the first hit.
    async fn resolve_symbol(&self, symbol: &str) -> Option<String> {
        let matches = match self.broker.search_symbols(symbol).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Symbol search failed");
                return None;
            }
        };

        let resolved = matches
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
            .or_else(|| matches.first())
            .map(|m| m.symbol_id.clone());

        if resolved.is_none() {
            warn!(symbol = %symbol, "Symbol not found");
        }
        resolved
    }

    /// Leader price if known, else a live quote, else the fallback price.
    async fn current_price(
        &self,
        trade: &LeaderTrade,
        credentials: &BrokerCredentials,
        account_id: &str,
    ) -> Decimal {
        if let Some(price) = trade.known_price() {
            return price;
        }

        match self
            .broker
            .get_quote(credentials, account_id, &trade.symbol)
            .await
        {
            Ok(quote) => quote.price().unwrap_or_else(|| {
                warn!(symbol = %trade.symbol, "Quote has no price, using fallback");
                self.config.fallback_price
            }),
            Err(e) => {
                warn!(symbol = %trade.symbol, error = %e, "Quote unavailable, using fallback");
                self.config.fallback_price
            }
        }
    }

    /// Persist the finished execution, then notify. Nothing is sent for a
    /// row that did not reach the ledger.
    async fn finish(&self, execution: CopyExecution) -> CopyOutcome {
        if let Err(e) = self.store.insert_execution(&execution).await {
            error!(
                execution_id = %execution.id,
                trade_id = %execution.trade_id,
                status = %execution.status,
                error = %e,
                "Failed to record copy execution"
            );
            return CopyOutcome {
                execution,
                recorded: false,
            };
        }

        if let Some(notification) = Notification::for_execution(&execution) {
            self.notifier.emit(notification);
        }
        CopyOutcome {
            execution,
            recorded: true,
        }
    }
}

fn local_midnight() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{ImpactTrade, Quote};
    use crate::models::{SizingMethod, TradeAction};
    use crate::testing::{leader_trade, FakeBroker, MemoryStore, RecordingSink, RecordingSleeper};
    use crate::trading::notifications::NotificationKind;
    use crate::trading::StaticReferenceData;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        broker: Arc<FakeBroker>,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        sleeper: Arc<RecordingSleeper>,
        engine: CopyEngine,
    }

    fn harness(broker: FakeBroker) -> Harness {
        let broker = Arc::new(broker);
        let store = Arc::new(MemoryStore::default());
        let sink = Arc::new(RecordingSink::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let engine = CopyEngine::new(
            broker.clone(),
            store.clone(),
            sink.clone(),
            Arc::new(StaticReferenceData::default()),
            EngineConfig::default(),
        )
        .with_sleeper(sleeper.clone());

        Harness {
            broker,
            store,
            sink,
            sleeper,
            engine,
        }
    }

    fn follower(h: &Harness, id: &str) -> CopyRelationship {
        let rel = CopyRelationship::new(format!("rel-{}", id), "leader", id);
        h.store.add_relationship(rel.clone());
        h.store.add_connection(id, dec!(10000));
        rel
    }

    async fn copy_one(h: &Harness, trade: &LeaderTrade) -> CopyExecution {
        h.engine.process_trade(trade).await.unwrap();
        let executions = h.store.executions();
        assert_eq!(executions.len(), 1);
        executions.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_successful_copy() {
        let h = harness(FakeBroker::default());
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.quantity, dec!(20));
        assert_eq!(exec.order_id.as_deref(), Some("order-ticket-1"));
        assert_eq!(exec.executed_price, Some(dec!(187.50)));
        assert_eq!(exec.account_id.as_deref(), Some("acct-alice"));
        assert!(exec.executed_at.is_some());
        assert_eq!(h.store.trades_copied("rel-alice"), 1);
        assert_eq!(h.broker.quote_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let notes = h.sink.notifications.lock().unwrap().clone();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::CopyTradeExecuted);
        assert_eq!(notes[0].user_id, "alice");
    }

    #[tokio::test]
    async fn test_missing_connection_is_skipped() {
        let h = harness(FakeBroker::default());
        h.store
            .add_relationship(CopyRelationship::new("rel-bob", "leader", "bob"));

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Skipped);
        assert_eq!(exec.error_message.as_deref(), Some(NO_ACCOUNT));
        assert!(exec.account_id.is_none());
        assert_eq!(h.broker.place_calls(), 0);
        assert_eq!(h.sink.len(), 0);
    }

    #[tokio::test]
    async fn test_filter_rejection_is_skipped() {
        let h = harness(FakeBroker::default());
        let mut rel = CopyRelationship::new("rel-alice", "leader", "alice");
        rel.filters.skip_penny_stocks = true;
        h.store.add_relationship(rel);
        h.store.add_connection("alice", dec!(10000));

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(3.20)))).await;

        assert_eq!(exec.status, ExecutionStatus::Skipped);
        let reason = exec.error_message.unwrap();
        assert!(reason.contains("$3.20"));
        assert!(reason.contains("$5.00"));
        assert_eq!(h.broker.place_calls(), 0);
    }

    #[tokio::test]
    async fn test_daily_limit_reads_ledger() {
        let h = harness(FakeBroker::default());
        let mut rel = CopyRelationship::new("rel-alice", "leader", "alice");
        rel.limits.enabled = true;
        rel.limits.max_daily_trades = Some(1);
        h.store.add_relationship(rel);
        h.store.add_connection("alice", dec!(10000));

        h.engine
            .process_trade(&leader_trade("t1", "leader", Some(dec!(50))))
            .await
            .unwrap();
        h.engine
            .process_trade(&leader_trade("t2", "leader", Some(dec!(50))))
            .await
            .unwrap();

        let executions = h.store.executions_for("rel-alice");
        assert_eq!(executions.len(), 2);
        let second = executions.iter().find(|e| e.trade_id == "t2").unwrap();
        assert_eq!(second.status, ExecutionStatus::Skipped);
        assert!(second
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Daily trade limit reached"));
    }

    #[tokio::test]
    async fn test_unknown_symbol_fails() {
        let h = harness(FakeBroker::default());
        h.broker.set_symbols(Ok(vec![]));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some(SYMBOL_NOT_FOUND));
        let notes = h.sink.notifications.lock().unwrap().clone();
        assert_eq!(notes[0].kind, NotificationKind::CopyTradeFailed);
    }

    #[tokio::test]
    async fn test_symbol_search_error_fails() {
        let h = harness(FakeBroker::default());
        h.broker.set_symbols(Err("search down".to_string()));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some(SYMBOL_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_exact_symbol_match_preferred() {
        let h = harness(FakeBroker::default());
        h.broker.set_symbols(Ok(vec![
            crate::broker::SymbolMatch {
                symbol_id: "sym-aapl-to".to_string(),
                symbol: "AAPL.TO".to_string(),
                description: String::new(),
            },
            crate::broker::SymbolMatch {
                symbol_id: "sym-aapl".to_string(),
                symbol: "aapl".to_string(),
                description: String::new(),
            },
        ]));
        follower(&h, "alice");

        copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        let requests = h.broker.impact_requests.lock().unwrap().clone();
        assert_eq!(requests[0].universal_symbol_id, "sym-aapl");
    }

    #[tokio::test]
    async fn test_misconfigured_sizing_is_skipped() {
        let h = harness(FakeBroker::default());
        let mut rel = CopyRelationship::new("rel-alice", "leader", "alice");
        rel.sizing.method = SizingMethod::FixedDollar;
        h.store.add_relationship(rel);
        h.store.add_connection("alice", dec!(10000));

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Skipped);
        assert!(exec.error_message.unwrap().starts_with(ZERO_SIZE));
        assert_eq!(h.sink.len(), 0);
    }

    #[tokio::test]
    async fn test_impact_without_ticket_fails() {
        let h = harness(FakeBroker::default());
        h.broker.set_impact(Ok(TradeImpact::default()));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some(IMPACT_FAILED));
        assert_eq!(exec.quantity, dec!(20));
        assert_eq!(h.broker.place_calls(), 0);
    }

    #[tokio::test]
    async fn test_impact_error_is_not_retried() {
        let h = harness(FakeBroker::default());
        h.broker.set_impact(Err("ticket rejected".to_string()));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some(IMPACT_FAILED));
        assert_eq!(h.broker.impact_requests.lock().unwrap().len(), 1);
        assert!(h.sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_retry_exhaustion_fails_with_last_error() {
        let h = harness(FakeBroker::failing_orders(3));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.error_message.as_deref(), Some("Rate limited on attempt 3"));
        assert_eq!(h.broker.place_calls(), 3);
        assert_eq!(h.store.trades_copied("rel-alice"), 0);

        let waited: Duration = h.sleeper.delays.lock().unwrap().iter().sum();
        assert!(waited >= Duration::from_secs(3) - Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_order_retry_recovers() {
        let h = harness(FakeBroker::failing_orders(2));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(h.broker.place_calls(), 3);
        assert_eq!(h.sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_price_uses_quote() {
        let h = harness(FakeBroker::default());
        follower(&h, "alice");

        copy_one(&h, &leader_trade("t1", "leader", None)).await;

        let requests = h.broker.impact_requests.lock().unwrap().clone();
        // 10% of 10,000 at the $50 quote
        assert_eq!(requests[0].units, dec!(20));
        assert!(requests[0].price.is_none());
    }

    #[tokio::test]
    async fn test_quote_failure_falls_back_to_default_price() {
        let h = harness(FakeBroker::default());
        h.broker.set_quote(Err("no market data".to_string()));
        follower(&h, "alice");

        copy_one(&h, &leader_trade("t1", "leader", None)).await;

        let requests = h.broker.impact_requests.lock().unwrap().clone();
        assert_eq!(requests[0].units, dec!(10));
    }

    #[tokio::test]
    async fn test_empty_quote_falls_back_to_default_price() {
        let h = harness(FakeBroker::default());
        h.broker.set_quote(Ok(Quote::default()));
        follower(&h, "alice");

        copy_one(&h, &leader_trade("t1", "leader", None)).await;

        let requests = h.broker.impact_requests.lock().unwrap().clone();
        assert_eq!(requests[0].units, dec!(10));
    }

    #[tokio::test]
    async fn test_limit_order_sends_price() {
        let h = harness(FakeBroker::default());
        follower(&h, "alice");
        let mut trade = leader_trade("t1", "leader", Some(dec!(50)));
        trade.order_type = crate::models::OrderType::Limit;

        copy_one(&h, &trade).await;

        let requests = h.broker.impact_requests.lock().unwrap().clone();
        assert_eq!(requests[0].order_type, "Limit");
        assert_eq!(requests[0].price, Some(dec!(50)));
        assert_eq!(requests[0].action, "BUY");
    }

    #[tokio::test]
    async fn test_protective_prices_recorded() {
        let h = harness(FakeBroker::default());
        let mut rel = CopyRelationship::new("rel-alice", "leader", "alice");
        rel.protective.auto_stop_loss = true;
        rel.protective.stop_loss_percent = Some(dec!(5));
        rel.protective.auto_take_profit = true;
        rel.protective.take_profit_percent = Some(dec!(10));
        h.store.add_relationship(rel);
        h.store.add_connection("alice", dec!(10000));

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        // Fill at 187.50
        assert_eq!(exec.stop_loss_price, Some(dec!(178.13)));
        assert_eq!(exec.take_profit_price, Some(dec!(206.25)));
    }

    #[tokio::test]
    async fn test_protective_prices_need_toggle() {
        let h = harness(FakeBroker::default());
        let mut rel = CopyRelationship::new("rel-alice", "leader", "alice");
        rel.protective.stop_loss_percent = Some(dec!(5));
        h.store.add_relationship(rel);
        h.store.add_connection("alice", dec!(10000));

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert!(exec.stop_loss_price.is_none());
        assert!(exec.take_profit_price.is_none());
    }

    #[tokio::test]
    async fn test_ticket_price_used_when_fill_price_missing() {
        let mut broker = FakeBroker::default();
        broker.fill_price = None;
        let h = harness(broker);
        h.broker.set_impact(Ok(TradeImpact {
            trade: Some(ImpactTrade {
                id: "ticket-9".to_string(),
                price: Some(dec!(51.25)),
            }),
            trade_impacts: vec![],
        }));
        follower(&h, "alice");

        let exec = copy_one(&h, &leader_trade("t1", "leader", Some(dec!(50)))).await;

        assert_eq!(exec.executed_price, Some(dec!(51.25)));
        assert_eq!(exec.order_id.as_deref(), Some("order-ticket-9"));
    }

    #[tokio::test]
    async fn test_every_follower_gets_one_execution() {
        let h = harness(FakeBroker::default());
        follower(&h, "alice");
        h.store
            .add_relationship(CopyRelationship::new("rel-bob", "leader", "bob"));
        let mut carol = CopyRelationship::new("rel-carol", "leader", "carol");
        carol.limits.enabled = true;
        carol.limits.max_daily_trades = Some(0);
        h.store.add_relationship(carol);
        h.store.add_connection("carol", dec!(5000));
        let mut paused = CopyRelationship::new("rel-dave", "leader", "dave");
        paused.status = crate::models::RelationshipStatus::Paused;
        h.store.add_relationship(paused);

        let mut trade = leader_trade("t1", "leader", Some(dec!(50)));
        trade.action = TradeAction::Sell;
        let summary = h.engine.process_trade(&trade).await.unwrap();

        assert_eq!(
            summary,
            TradeSummary {
                executions: 3,
                success: 1,
                failed: 0,
                skipped: 2,
                unrecorded: 0
            }
        );
        for rel in ["rel-alice", "rel-bob", "rel-carol"] {
            let executions = h.store.executions_for(rel);
            assert_eq!(executions.len(), 1, "{}", rel);
            assert!(executions[0].status.is_terminal());
        }
        assert!(h.store.executions_for("rel-dave").is_empty());
    }

    #[tokio::test]
    async fn test_relationship_load_failure_propagates() {
        let h = harness(FakeBroker::default());
        h.store
            .failing_leaders
            .lock()
            .unwrap()
            .push("leader".to_string());

        let result = h
            .engine
            .process_trade(&leader_trade("t1", "leader", Some(dec!(50))))
            .await;

        assert!(result.is_err());
        assert!(h.store.executions().is_empty());
    }

    #[test]
    fn test_summary_display() {
        let mut summary = TradeSummary::default();
        summary.record(ExecutionStatus::Success);
        summary.record(ExecutionStatus::Skipped);
        assert_eq!(
            summary.to_string(),
            "2 executions (1 success, 0 failed, 1 skipped)"
        );
        summary.unrecorded = 1;
        assert_eq!(
            summary.to_string(),
            "2 executions (1 success, 0 failed, 1 skipped), 1 not recorded"
        );
    }

    #[tokio::test]
    async fn test_ledger_insert_failure_counted_and_not_notified() {
        let h = harness(FakeBroker::default());
        follower(&h, "alice");
        follower(&h, "bob");
        *h.store.fail_inserts.lock().unwrap() = true;

        let summary = h
            .engine
            .process_trade(&leader_trade("t1", "leader", Some(dec!(50))))
            .await
            .unwrap();

        assert_eq!(summary.executions, 2);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.unrecorded, 2);
        assert!(h.store.executions().is_empty());
        assert_eq!(h.store.dropped.lock().unwrap().len(), 2);
        assert_eq!(h.sink.len(), 0);
    }
}
