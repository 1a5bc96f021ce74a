//! Copy-Trade Executor
//!
//! Fans leader trades out to followers: filters each copy against the
//! follower's rules and exposure limits, sizes the position, pre-checks it
//! with the broker and places the order with retries.

mod broker;
mod db;
mod models;
mod processor;
mod trading;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::broker::{BrokerClient, BrokerGateway, PaperBroker};
use crate::db::{Database, StoreNotificationSink};
use crate::processor::{BatchProcessor, ProcessorConfig};
use crate::trading::{CopyEngine, EngineConfig, LogSink, NotificationSink, StaticReferenceData};

/// Copy-trade executor CLI.
#[derive(Parser)]
#[command(name = "copytrader")]
#[command(about = "Copy leader trades into follower brokerage accounts", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(
        short,
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./copytrader.db?mode=rwc"
    )]
    database: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Engine configuration file (JSON); defaults apply when omitted
    #[arg(short, long, env = "ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Simulate orders instead of sending them to the broker
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pass over all pending leader trades
    Process,

    /// Run batch passes periodically until Ctrl-C
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },

    /// Process a single leader trade by id
    Trade {
        /// Leader trade id
        id: String,
    },

    /// Show execution ledger statistics
    Status {
        /// Number of recent executions to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: i64,
    },

    /// Show the effective engine configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let engine_config = load_engine_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&engine_config)?);
        }

        Commands::Status { limit } => {
            let db = Database::new(&cli.database).await?;
            let stats = db.execution_stats().await?;
            let recent = db.recent_executions(limit).await?;

            println!("\n=== Execution Ledger ===");
            println!("Total:            {}", stats.total);
            println!("Success:          {}", stats.success);
            println!("Failed:           {}", stats.failed);
            println!("Skipped:          {}", stats.skipped);

            if !recent.is_empty() {
                println!("\n=== Recent Executions ===");
                println!(
                    "{:<20} {:<10} {:<5} {:>8} {:<8} {:<30}",
                    "CREATED", "SYMBOL", "SIDE", "QTY", "STATUS", "DETAIL"
                );
                println!("{}", "-".repeat(86));
                for e in &recent {
                    let detail = match (&e.error_message, &e.order_id) {
                        (Some(err), _) => err.clone(),
                        (None, Some(order)) => format!("order {}", order),
                        (None, None) => String::new(),
                    };
                    println!(
                        "{:<20} {:<10} {:<5} {:>8} {:<8} {:<30}",
                        e.created_at.format("%Y-%m-%d %H:%M:%S"),
                        truncate(&e.symbol, 10),
                        e.action,
                        e.quantity,
                        e.status,
                        truncate(&detail, 30)
                    );
                }
            }
        }

        Commands::Process => {
            let processor = build_processor(&cli.database, cli.dry_run, 0, engine_config).await?;
            let summary = processor.process_all_pending_trades().await?;
            println!("\n{}", summary);
        }

        Commands::Trade { id } => {
            let processor = build_processor(&cli.database, cli.dry_run, 0, engine_config).await?;
            let summary = processor.process_trade_by_id(&id).await?;
            println!("\nTrade {}: {}", id, summary);
        }

        Commands::Run { interval } => {
            let processor =
                build_processor(&cli.database, cli.dry_run, interval, engine_config).await?;

            println!("\n=== Copy-Trade Executor ===");
            println!("Polling interval: {}s", interval);
            println!(
                "Mode: {}",
                if cli.dry_run { "DRY RUN (no real orders)" } else { "LIVE TRADING" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            processor.run().await?;
        }
    }

    Ok(())
}

fn load_engine_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid engine config in {}", path.display()))
}

async fn build_processor(
    database_url: &str,
    dry_run: bool,
    poll_interval_secs: u64,
    engine_config: EngineConfig,
) -> Result<BatchProcessor> {
    let db = Database::new(database_url).await?;

    let broker: Arc<dyn BrokerGateway> = if dry_run {
        info!("Dry run: orders are simulated");
        Arc::new(PaperBroker::new())
    } else {
        match BrokerClient::from_env() {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!("Broker client not configured: {}. Running in dry-run mode.", e);
                Arc::new(PaperBroker::new())
            }
        }
    };

    // Simulated fills are logged, not delivered to followers.
    let notifier: Arc<dyn NotificationSink> = if dry_run {
        Arc::new(LogSink)
    } else {
        Arc::new(StoreNotificationSink::new(db.clone()))
    };

    let store = Arc::new(db);
    let engine = CopyEngine::new(
        broker,
        store.clone(),
        notifier,
        Arc::new(StaticReferenceData::default()),
        engine_config,
    );

    let config = ProcessorConfig {
        database_url: database_url.to_string(),
        poll_interval_secs,
        dry_run,
    };

    Ok(BatchProcessor::new(Arc::new(engine), store, config))
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
