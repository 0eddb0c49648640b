//! CLI command definitions and dispatch.

pub mod check_config;
pub mod dispatch;
pub mod migrate;
pub mod policies;
pub mod purge;
pub mod status;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;

use herald_core::config::AppConfig;
use herald_core::result::AppResult;
use herald_database::{DatabasePool, MemoryNotificationStore, NotificationStore, PgNotificationStore};

use crate::output::OutputFormat;

/// Herald: ERP notification dispatch and delivery tracking
#[derive(Debug, Parser)]
#[command(name = "herald", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Dispatch a notification intent read from a JSON file
    Dispatch(dispatch::DispatchArgs),
    /// Show the per-channel delivery status of a notification
    Status(status::StatusArgs),
    /// Show delivery and seen statistics of a notification
    Stats(status::StatusArgs),
    /// List the dispatch policy table
    Policies,
    /// Validate the configuration
    CheckConfig,
    /// Apply database migrations
    Migrate,
    /// Purge expired dedup history
    PurgeHistory,
}

impl Cli {
    /// Execute the selected command.
    pub async fn execute(&self, config: AppConfig) -> anyhow::Result<()> {
        match &self.command {
            Commands::Dispatch(args) => dispatch::execute(args, config, self.format).await,
            Commands::Status(args) => status::status(args, config, self.format).await,
            Commands::Stats(args) => status::stats(args, config, self.format).await,
            Commands::Policies => policies::execute(&config, self.format),
            Commands::CheckConfig => check_config::execute(&config, &self.config),
            Commands::Migrate => migrate::execute(&config).await,
            Commands::PurgeHistory => purge::execute(&config).await,
        }
    }
}

/// The configured store: PostgreSQL when a URL is set, otherwise a fresh
/// in-memory store.
pub async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn NotificationStore>> {
    if config.database.url.is_none() {
        warn!("No database.url configured; using a transient in-memory store");
        return Ok(Arc::new(MemoryNotificationStore::new()));
    }
    let pool = DatabasePool::connect(&config.database).await?;
    Ok(Arc::new(PgNotificationStore::new(pool.pool().clone())))
}
