//! Database persistence for the copy-trade ledger.
//!
//! Stores everything the pipeline reads and writes:
//! - Leader trades awaiting fan-out
//! - Copy relationships and their sizing/filter/limit settings
//! - Followers' brokerage connections
//! - The append-only copy execution ledger
//! - Notifications for followers

mod store;

pub use store::RecordStore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, warn};

use crate::models::{
    BrokerageConnection, CopyExecution, CopyRelationship, ExposureLimits, LeaderTrade,
    OptionDetails, OptionType, ProtectiveOrders, SizingConfig, TradeFilters,
};
use crate::trading::{Notification, NotificationSink};

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Stored leader trade record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredLeaderTrade {
    pub id: String,
    pub leader_id: String,
    pub account_id: String,
    pub symbol: String,
    pub action: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub order_type: String,
    pub asset_type: String,
    pub option_type: Option<String>,
    pub option_strike: Option<f64>,
    pub option_expiration: Option<String>,
    pub option_contracts: Option<f64>,
    pub external_order_id: Option<String>,
    pub processed: bool,
    pub detected_at: DateTime<Utc>,
}

/// Stored copy relationship record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredRelationship {
    pub id: String,
    pub leader_id: String,
    pub follower_id: String,
    pub status: String,
    pub sizing_method: String,
    pub allocation_percent: Option<f64>,
    pub fixed_dollar_amount: Option<f64>,
    pub fixed_shares_amount: Option<f64>,
    pub risk_percent: Option<f64>,
    pub multiplier: Option<f64>,
    pub max_position_size: Option<f64>,
    pub auto_stop_loss: bool,
    pub stop_loss_percent: Option<f64>,
    pub auto_take_profit: bool,
    pub take_profit_percent: Option<f64>,
    pub skip_penny_stocks: bool,
    pub skip_options: bool,
    pub skip_0dte_options: bool,
    pub skip_crypto: bool,
    pub market_cap_filter_enabled: bool,
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
    pub price_filter_enabled: bool,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sector_filter_enabled: bool,
    pub allowed_sectors: String,
    pub blocked_sectors: String,
    pub exposure_limits_enabled: bool,
    pub max_position_concentration: Option<f64>,
    pub max_sector_concentration: Option<f64>,
    pub max_open_positions: Option<i64>,
    pub max_daily_trades: Option<i64>,
    pub max_daily_volume: Option<f64>,
    pub total_trades_copied: i64,
}

/// Stored brokerage connection record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredConnection {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub broker_user_id: String,
    pub broker_user_secret: String,
    pub cash_balance: f64,
    pub is_active: bool,
}

/// Stored copy execution record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredExecution {
    pub id: String,
    pub trade_id: String,
    pub relationship_id: String,
    pub follower_id: String,
    pub symbol: String,
    pub action: String,
    pub quantity: f64,
    pub status: String,
    pub account_id: Option<String>,
    pub asset_type: String,
    pub order_id: Option<String>,
    pub executed_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub error_message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Ledger counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub total: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::try_from(value).with_context(|| format!("Invalid decimal value {}", value))
}

fn to_decimal_opt(value: Option<f64>) -> Result<Option<Decimal>> {
    value.map(to_decimal).transpose()
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn to_f64_opt(value: Option<Decimal>) -> Option<f64> {
    value.map(to_f64)
}

fn to_limit(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl TryFrom<StoredLeaderTrade> for LeaderTrade {
    type Error = anyhow::Error;

    fn try_from(row: StoredLeaderTrade) -> Result<Self> {
        let has_option = row.option_type.is_some()
            || row.option_strike.is_some()
            || row.option_expiration.is_some()
            || row.option_contracts.is_some();

        let option = if has_option {
            Some(OptionDetails {
                option_type: match row.option_type.as_deref().map(str::to_lowercase).as_deref() {
                    Some("call") => Some(OptionType::Call),
                    Some("put") => Some(OptionType::Put),
                    _ => None,
                },
                strike: to_decimal_opt(row.option_strike)?,
                expiration: row.option_expiration,
                contracts: to_decimal_opt(row.option_contracts)?,
            })
        } else {
            None
        };

        Ok(Self {
            action: row.action.parse()?,
            quantity: to_decimal(row.quantity)?,
            price: to_decimal_opt(row.price)?,
            order_type: row.order_type.parse()?,
            asset_type: row.asset_type.parse()?,
            option,
            id: row.id,
            leader_id: row.leader_id,
            account_id: row.account_id,
            symbol: row.symbol,
            external_order_id: row.external_order_id,
            processed: row.processed,
            detected_at: row.detected_at,
        })
    }
}

impl TryFrom<StoredRelationship> for CopyRelationship {
    type Error = anyhow::Error;

    fn try_from(row: StoredRelationship) -> Result<Self> {
        let allowed_sectors: Vec<String> =
            serde_json::from_str(&row.allowed_sectors).unwrap_or_default();
        let blocked_sectors: Vec<String> =
            serde_json::from_str(&row.blocked_sectors).unwrap_or_default();

        Ok(Self {
            status: row.status.parse()?,
            sizing: SizingConfig {
                method: row.sizing_method.parse()?,
                allocation_percent: to_decimal_opt(row.allocation_percent)?,
                fixed_dollar_amount: to_decimal_opt(row.fixed_dollar_amount)?,
                fixed_shares_amount: to_decimal_opt(row.fixed_shares_amount)?,
                risk_percent: to_decimal_opt(row.risk_percent)?,
                multiplier: to_decimal_opt(row.multiplier)?,
                max_position_size: to_decimal_opt(row.max_position_size)?,
            },
            protective: ProtectiveOrders {
                auto_stop_loss: row.auto_stop_loss,
                stop_loss_percent: to_decimal_opt(row.stop_loss_percent)?,
                auto_take_profit: row.auto_take_profit,
                take_profit_percent: to_decimal_opt(row.take_profit_percent)?,
            },
            filters: TradeFilters {
                skip_penny_stocks: row.skip_penny_stocks,
                skip_options: row.skip_options,
                skip_0dte_options: row.skip_0dte_options,
                skip_crypto: row.skip_crypto,
                market_cap_filter_enabled: row.market_cap_filter_enabled,
                min_market_cap: to_decimal_opt(row.min_market_cap)?,
                max_market_cap: to_decimal_opt(row.max_market_cap)?,
                price_filter_enabled: row.price_filter_enabled,
                min_price: to_decimal_opt(row.min_price)?,
                max_price: to_decimal_opt(row.max_price)?,
                sector_filter_enabled: row.sector_filter_enabled,
                allowed_sectors,
                blocked_sectors,
            },
            limits: ExposureLimits {
                enabled: row.exposure_limits_enabled,
                max_position_concentration: to_decimal_opt(row.max_position_concentration)?,
                max_sector_concentration: to_decimal_opt(row.max_sector_concentration)?,
                max_open_positions: to_limit(row.max_open_positions),
                max_daily_trades: to_limit(row.max_daily_trades),
                max_daily_volume: to_decimal_opt(row.max_daily_volume)?,
            },
            id: row.id,
            leader_id: row.leader_id,
            follower_id: row.follower_id,
            total_trades_copied: row.total_trades_copied,
        })
    }
}

impl TryFrom<StoredConnection> for BrokerageConnection {
    type Error = anyhow::Error;

    fn try_from(row: StoredConnection) -> Result<Self> {
        Ok(Self {
            cash_balance: to_decimal(row.cash_balance)?,
            id: row.id,
            user_id: row.user_id,
            account_id: row.account_id,
            broker_user_id: row.broker_user_id,
            broker_user_secret: row.broker_user_secret,
            is_active: row.is_active,
        })
    }
}

impl TryFrom<StoredExecution> for CopyExecution {
    type Error = anyhow::Error;

    fn try_from(row: StoredExecution) -> Result<Self> {
        Ok(Self {
            action: row.action.parse()?,
            quantity: to_decimal(row.quantity)?,
            status: row.status.parse()?,
            asset_type: row.asset_type.parse()?,
            executed_price: to_decimal_opt(row.executed_price)?,
            stop_loss_price: to_decimal_opt(row.stop_loss_price)?,
            take_profit_price: to_decimal_opt(row.take_profit_price)?,
            id: row.id,
            trade_id: row.trade_id,
            relationship_id: row.relationship_id,
            follower_id: row.follower_id,
            symbol: row.symbol,
            account_id: row.account_id,
            order_id: row.order_id,
            error_message: row.error_message,
            executed_at: row.executed_at,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every in-memory connection is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        // Leader trades
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leader_trades (
                id TEXT PRIMARY KEY,
                leader_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                quantity REAL NOT NULL,
                price REAL,
                order_type TEXT NOT NULL DEFAULT 'Market',
                asset_type TEXT NOT NULL DEFAULT 'stock',
                option_type TEXT,
                option_strike REAL,
                option_expiration TEXT,
                option_contracts REAL,
                external_order_id TEXT,
                processed INTEGER NOT NULL DEFAULT 0,
                detected_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Copy relationships
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_relationships (
                id TEXT PRIMARY KEY,
                leader_id TEXT NOT NULL,
                follower_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                sizing_method TEXT NOT NULL DEFAULT 'proportional',
                allocation_percent REAL,
                fixed_dollar_amount REAL,
                fixed_shares_amount REAL,
                risk_percent REAL,
                multiplier REAL,
                max_position_size REAL,
                auto_stop_loss INTEGER NOT NULL DEFAULT 0,
                stop_loss_percent REAL,
                auto_take_profit INTEGER NOT NULL DEFAULT 0,
                take_profit_percent REAL,
                skip_penny_stocks INTEGER NOT NULL DEFAULT 0,
                skip_options INTEGER NOT NULL DEFAULT 0,
                skip_0dte_options INTEGER NOT NULL DEFAULT 0,
                skip_crypto INTEGER NOT NULL DEFAULT 0,
                market_cap_filter_enabled INTEGER NOT NULL DEFAULT 0,
                min_market_cap REAL,
                max_market_cap REAL,
                price_filter_enabled INTEGER NOT NULL DEFAULT 0,
                min_price REAL,
                max_price REAL,
                sector_filter_enabled INTEGER NOT NULL DEFAULT 0,
                allowed_sectors TEXT NOT NULL DEFAULT '[]',
                blocked_sectors TEXT NOT NULL DEFAULT '[]',
                exposure_limits_enabled INTEGER NOT NULL DEFAULT 0,
                max_position_concentration REAL,
                max_sector_concentration REAL,
                max_open_positions INTEGER,
                max_daily_trades INTEGER,
                max_daily_volume REAL,
                total_trades_copied INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Brokerage connections
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS brokerage_connections (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                broker_user_id TEXT NOT NULL,
                broker_user_secret TEXT NOT NULL,
                cash_balance REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Copy executions (append-only)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_executions (
                id TEXT PRIMARY KEY,
                trade_id TEXT NOT NULL,
                relationship_id TEXT NOT NULL,
                follower_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                quantity REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                account_id TEXT,
                asset_type TEXT NOT NULL,
                order_id TEXT,
                executed_price REAL,
                stop_loss_price REAL,
                take_profit_price REAL,
                error_message TEXT,
                executed_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (trade_id) REFERENCES leader_trades(id),
                FOREIGN KEY (relationship_id) REFERENCES copy_relationships(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Notifications
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                execution_id TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_leader_trades_pending ON leader_trades(processed, detected_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_relationships_leader ON copy_relationships(leader_id, status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_connections_user ON brokerage_connections(user_id, is_active)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_relationship ON copy_executions(relationship_id, status, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_trade ON copy_executions(trade_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Leader Trades ====================

    /// Insert a detected leader trade (ingestion side). Duplicate ids are ignored.
    pub async fn insert_leader_trade(&self, trade: &LeaderTrade) -> Result<()> {
        let option = trade.option.as_ref();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO leader_trades (
                id, leader_id, account_id, symbol, action, quantity, price,
                order_type, asset_type, option_type, option_strike, option_expiration,
                option_contracts, external_order_id, processed, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.leader_id)
        .bind(&trade.account_id)
        .bind(&trade.symbol)
        .bind(trade.action.as_str())
        .bind(to_f64(trade.quantity))
        .bind(to_f64_opt(trade.price))
        .bind(trade.order_type.as_str())
        .bind(trade.asset_type.as_str())
        .bind(option.and_then(|o| o.option_type).map(|t| match t {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }))
        .bind(to_f64_opt(option.and_then(|o| o.strike)))
        .bind(option.and_then(|o| o.expiration.clone()))
        .bind(to_f64_opt(option.and_then(|o| o.contracts)))
        .bind(&trade.external_order_id)
        .bind(trade.processed)
        .bind(trade.detected_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Relationships ====================

    /// Save or replace a copy relationship.
    pub async fn save_relationship(&self, rel: &CopyRelationship) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO copy_relationships (
                id, leader_id, follower_id, status, sizing_method,
                allocation_percent, fixed_dollar_amount, fixed_shares_amount, risk_percent,
                multiplier, max_position_size,
                auto_stop_loss, stop_loss_percent, auto_take_profit, take_profit_percent,
                skip_penny_stocks, skip_options, skip_0dte_options, skip_crypto,
                market_cap_filter_enabled, min_market_cap, max_market_cap,
                price_filter_enabled, min_price, max_price,
                sector_filter_enabled, allowed_sectors, blocked_sectors,
                exposure_limits_enabled, max_position_concentration, max_sector_concentration,
                max_open_positions, max_daily_trades, max_daily_volume,
                total_trades_copied, updated_at
            ) VALUES (
                ?, ?, ?, ?, ?,
                ?, ?, ?, ?,
                ?, ?,
                ?, ?, ?, ?,
                ?, ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?,
                ?, datetime('now')
            )
            "#,
        )
        .bind(&rel.id)
        .bind(&rel.leader_id)
        .bind(&rel.follower_id)
        .bind(rel.status.as_str())
        .bind(rel.sizing.method.as_str())
        .bind(to_f64_opt(rel.sizing.allocation_percent))
        .bind(to_f64_opt(rel.sizing.fixed_dollar_amount))
        .bind(to_f64_opt(rel.sizing.fixed_shares_amount))
        .bind(to_f64_opt(rel.sizing.risk_percent))
        .bind(to_f64_opt(rel.sizing.multiplier))
        .bind(to_f64_opt(rel.sizing.max_position_size))
        .bind(rel.protective.auto_stop_loss)
        .bind(to_f64_opt(rel.protective.stop_loss_percent))
        .bind(rel.protective.auto_take_profit)
        .bind(to_f64_opt(rel.protective.take_profit_percent))
        .bind(rel.filters.skip_penny_stocks)
        .bind(rel.filters.skip_options)
        .bind(rel.filters.skip_0dte_options)
        .bind(rel.filters.skip_crypto)
        .bind(rel.filters.market_cap_filter_enabled)
        .bind(to_f64_opt(rel.filters.min_market_cap))
        .bind(to_f64_opt(rel.filters.max_market_cap))
        .bind(rel.filters.price_filter_enabled)
        .bind(to_f64_opt(rel.filters.min_price))
        .bind(to_f64_opt(rel.filters.max_price))
        .bind(rel.filters.sector_filter_enabled)
        .bind(serde_json::to_string(&rel.filters.allowed_sectors)?)
        .bind(serde_json::to_string(&rel.filters.blocked_sectors)?)
        .bind(rel.limits.enabled)
        .bind(to_f64_opt(rel.limits.max_position_concentration))
        .bind(to_f64_opt(rel.limits.max_sector_concentration))
        .bind(rel.limits.max_open_positions.map(i64::from))
        .bind(rel.limits.max_daily_trades.map(i64::from))
        .bind(to_f64_opt(rel.limits.max_daily_volume))
        .bind(rel.total_trades_copied)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_relationship(&self, id: &str) -> Result<Option<CopyRelationship>> {
        sqlx::query_as::<_, StoredRelationship>("SELECT * FROM copy_relationships WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(CopyRelationship::try_from)
            .transpose()
    }

    // ==================== Connections ====================

    /// Save or replace a brokerage connection.
    pub async fn save_connection(&self, conn: &BrokerageConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO brokerage_connections (
                id, user_id, account_id, broker_user_id, broker_user_secret, cash_balance, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conn.id)
        .bind(&conn.user_id)
        .bind(&conn.account_id)
        .bind(&conn.broker_user_id)
        .bind(&conn.broker_user_secret)
        .bind(to_f64(conn.cash_balance))
        .bind(conn.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Executions ====================

    /// Executions recorded for one leader trade.
    pub async fn executions_for_trade(&self, trade_id: &str) -> Result<Vec<CopyExecution>> {
        let rows = sqlx::query_as::<_, StoredExecution>(
            "SELECT * FROM copy_executions WHERE trade_id = ? ORDER BY created_at",
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch executions")?;

        convert_all(rows)
    }

    /// Most recent executions, newest first.
    pub async fn recent_executions(&self, limit: i64) -> Result<Vec<CopyExecution>> {
        let rows = sqlx::query_as::<_, StoredExecution>(
            "SELECT * FROM copy_executions ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent executions")?;

        convert_all(rows)
    }

    /// Get execution ledger statistics.
    pub async fn execution_stats(&self) -> Result<ExecutionStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM copy_executions GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = ExecutionStats::default();
        for (status, count) in rows {
            stats.total += count;
            match status.as_str() {
                "success" => stats.success = count,
                "failed" => stats.failed = count,
                "skipped" => stats.skipped = count,
                other => warn!(status = %other, count, "Unexpected execution status in ledger"),
            }
        }

        Ok(stats)
    }

    // ==================== Notifications ====================

    /// Record a notification.
    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, message, execution_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.execution_id)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn notification_count(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

}

#[async_trait]
impl RecordStore for Database {
    async fn pending_trades(&self) -> Result<Vec<LeaderTrade>> {
        let rows = sqlx::query_as::<_, StoredLeaderTrade>(
            "SELECT * FROM leader_trades WHERE processed = 0 ORDER BY detected_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pending trades")?;

        convert_all(rows)
    }

    async fn get_trade(&self, trade_id: &str) -> Result<Option<LeaderTrade>> {
        sqlx::query_as::<_, StoredLeaderTrade>("SELECT * FROM leader_trades WHERE id = ?")
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await?
            .map(LeaderTrade::try_from)
            .transpose()
    }

    async fn mark_trade_processed(&self, trade_id: &str) -> Result<()> {
        sqlx::query("UPDATE leader_trades SET processed = 1 WHERE id = ?")
            .bind(trade_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn active_relationships(&self, leader_id: &str) -> Result<Vec<CopyRelationship>> {
        let rows = sqlx::query_as::<_, StoredRelationship>(
            "SELECT * FROM copy_relationships WHERE leader_id = ? AND status = 'active' ORDER BY created_at, id",
        )
        .bind(leader_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch relationships")?;

        convert_all(rows)
    }

    async fn active_connection(&self, user_id: &str) -> Result<Option<BrokerageConnection>> {
        sqlx::query_as::<_, StoredConnection>(
            "SELECT * FROM brokerage_connections WHERE user_id = ? AND is_active = 1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch brokerage connection")?
        .map(BrokerageConnection::try_from)
        .transpose()
    }

    async fn successful_executions(
        &self,
        relationship_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CopyExecution>> {
        let rows = sqlx::query_as::<_, StoredExecution>(
            r#"
            SELECT * FROM copy_executions
            WHERE relationship_id = ? AND status = 'success'
              AND (? IS NULL OR created_at >= ?)
            ORDER BY created_at
            "#,
        )
        .bind(relationship_id)
        .bind(since)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch executions")?;

        convert_all(rows)
    }

    async fn insert_execution(&self, e: &CopyExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO copy_executions (
                id, trade_id, relationship_id, follower_id, symbol, action, quantity, status,
                account_id, asset_type, order_id, executed_price, stop_loss_price,
                take_profit_price, error_message, executed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&e.id)
        .bind(&e.trade_id)
        .bind(&e.relationship_id)
        .bind(&e.follower_id)
        .bind(&e.symbol)
        .bind(e.action.as_str())
        .bind(to_f64(e.quantity))
        .bind(e.status.as_str())
        .bind(&e.account_id)
        .bind(e.asset_type.as_str())
        .bind(&e.order_id)
        .bind(to_f64_opt(e.executed_price))
        .bind(to_f64_opt(e.stop_loss_price))
        .bind(to_f64_opt(e.take_profit_price))
        .bind(&e.error_message)
        .bind(e.executed_at)
        .bind(e.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert copy execution")?;

        debug!(execution_id = %e.id, status = %e.status, "Execution recorded");
        Ok(())
    }

    async fn increment_trades_copied(&self, relationship_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE copy_relationships SET total_trades_copied = total_trades_copied + 1, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(relationship_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Notification sink that persists to the `notifications` table on a background task.
#[derive(Clone)]
pub struct StoreNotificationSink {
    db: Database,
}

impl StoreNotificationSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl NotificationSink for StoreNotificationSink {
    fn emit(&self, notification: Notification) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = db.insert_notification(&notification).await {
                warn!(user_id = %notification.user_id, error = %e, "Failed to store notification");
            }
        });
    }
}
