//! Batch processor: drains unprocessed leader trades through the copy engine.
//!
//! Trades run one at a time, oldest detection first. A trade is marked
//! processed only after every follower execution for it has been attempted.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::RecordStore;
use crate::trading::{CopyEngine, TradeSummary};

/// Processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Database URL
    pub database_url: String,

    /// Seconds between batch passes in run mode
    pub poll_interval_secs: u64,

    /// Simulate orders instead of sending them to the broker
    pub dry_run: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./copytrader.db?mode=rwc".to_string(),
            poll_interval_secs: 30,
            dry_run: false,
        }
    }
}

/// Totals for one batch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Trades fanned out and marked processed
    pub trades_processed: usize,

    /// Trades left pending for the next pass
    pub trades_deferred: usize,

    pub executions: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Executions missing from the ledger because the insert failed
    pub unrecorded: usize,
}

impl BatchSummary {
    fn absorb(&mut self, trade: TradeSummary) {
        self.trades_processed += 1;
        self.executions += trade.executions;
        self.success += trade.success;
        self.failed += trade.failed;
        self.skipped += trade.skipped;
        self.unrecorded += trade.unrecorded;
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Batch Summary ===")?;
        writeln!(f, "Trades processed: {}", self.trades_processed)?;
        writeln!(f, "Trades deferred:  {}", self.trades_deferred)?;
        writeln!(f, "Executions:       {}", self.executions)?;
        writeln!(f, "  Success:        {}", self.success)?;
        writeln!(f, "  Failed:         {}", self.failed)?;
        write!(f, "  Skipped:        {}", self.skipped)?;
        if self.unrecorded > 0 {
            write!(f, "\nNot recorded:     {}", self.unrecorded)?;
        }
        Ok(())
    }
}

/// Runs batch passes over pending leader trades.
pub struct BatchProcessor {
    engine: Arc<CopyEngine>,
    store: Arc<dyn RecordStore>,
    config: ProcessorConfig,
    shutdown: Arc<AtomicBool>,
}

impl BatchProcessor {
    pub fn new(engine: Arc<CopyEngine>, store: Arc<dyn RecordStore>, config: ProcessorConfig) -> Self {
        Self {
            engine,
            store,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// One pass over every unprocessed trade, oldest first.
    ///
    /// Only a failure to read the pending list aborts the pass. When a trade's
    /// followers cannot be loaded the trade stays pending, and so do later
    /// trades from the same leader to keep that leader's order intact.
    pub async fn process_all_pending_trades(&self) -> Result<BatchSummary> {
        let trades = self
            .store
            .pending_trades()
            .await
            .context("Failed to load pending trades")?;

        if trades.is_empty() {
            debug!("No pending trades");
            return Ok(BatchSummary::default());
        }
        info!(count = trades.len(), "Processing pending trades");

        let mut summary = BatchSummary::default();
        let mut blocked_leaders: HashSet<String> = HashSet::new();

        for trade in &trades {
            if blocked_leaders.contains(&trade.leader_id) {
                debug!(trade_id = %trade.id, leader_id = %trade.leader_id, "Deferring trade behind earlier failure");
                summary.trades_deferred += 1;
                continue;
            }

            match self.engine.process_trade(trade).await {
                Ok(trade_summary) => {
                    self.store
                        .mark_trade_processed(&trade.id)
                        .await
                        .with_context(|| format!("Failed to mark trade {} processed", trade.id))?;
                    summary.absorb(trade_summary);
                }
                Err(e) => {
                    error!(
                        trade_id = %trade.id,
                        leader_id = %trade.leader_id,
                        error = %e,
                        "Trade left pending"
                    );
                    blocked_leaders.insert(trade.leader_id.clone());
                    summary.trades_deferred += 1;
                }
            }
        }

        info!(
            processed = summary.trades_processed,
            deferred = summary.trades_deferred,
            executions = summary.executions,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            unrecorded = summary.unrecorded,
            "Batch complete"
        );
        Ok(summary)
    }

    /// Process a single trade by id and mark it processed.
    pub async fn process_trade_by_id(&self, trade_id: &str) -> Result<TradeSummary> {
        let trade = self
            .store
            .get_trade(trade_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Trade {} not found", trade_id))?;

        if trade.processed {
            anyhow::bail!("Trade {} was already processed", trade_id);
        }

        let summary = self.engine.process_trade(&trade).await?;
        self.store
            .mark_trade_processed(&trade.id)
            .await
            .with_context(|| format!("Failed to mark trade {} processed", trade.id))?;

        Ok(summary)
    }

    /// Periodic batch passes until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            "Starting batch processor loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.process_all_pending_trades().await {
                error!(error = %e, "Batch pass failed");
            }
        }

        warn!("Batch processor stopped");
        Ok(())
    }
}
