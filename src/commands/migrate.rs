//! `herald migrate`.

use herald_core::config::AppConfig;
use herald_database::DatabasePool;
use herald_database::migration::run_migrations;

use crate::output;

/// Execute the migrate command
pub async fn execute(config: &AppConfig) -> anyhow::Result<()> {
    if config.database.url.is_none() {
        anyhow::bail!("database.url is not configured; nothing to migrate");
    }
    let pool = DatabasePool::connect(&config.database).await?;
    run_migrations(pool.pool()).await?;
    pool.close().await;
    output::print_success("All migrations applied");
    Ok(())
}
