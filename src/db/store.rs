//! Record store capability consumed by the copy engine and batch processor.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{BrokerageConnection, CopyExecution, CopyRelationship, LeaderTrade};

/// Persistent records the pipeline reads and writes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Unprocessed leader trades, oldest detection first.
    async fn pending_trades(&self) -> Result<Vec<LeaderTrade>>;

    async fn get_trade(&self, trade_id: &str) -> Result<Option<LeaderTrade>>;

    async fn mark_trade_processed(&self, trade_id: &str) -> Result<()>;

    /// Active relationships following `leader_id`.
    async fn active_relationships(&self, leader_id: &str) -> Result<Vec<CopyRelationship>>;

    /// The follower's single active brokerage connection, if any.
    async fn active_connection(&self, user_id: &str) -> Result<Option<BrokerageConnection>>;

    /// Successful executions for a relationship, optionally only those created since `since`.
    async fn successful_executions(
        &self,
        relationship_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CopyExecution>>;

    /// Append one finished execution. Never updates an existing row.
    async fn insert_execution(&self, execution: &CopyExecution) -> Result<()>;

    async fn increment_trades_copied(&self, relationship_id: &str) -> Result<()>;
}
