//! `herald purge-history`: one-shot dedup history purge.

use herald_core::config::AppConfig;
use herald_worker::purge_dedup_history;

use crate::output;

/// Execute the purge-history command
pub async fn execute(config: &AppConfig) -> anyhow::Result<()> {
    let store = super::open_store(config).await?;
    let removed =
        purge_dedup_history(store.as_ref(), config.dispatch.dedup_retention_days).await?;
    output::print_success(&format!(
        "Removed {removed} dedup entries older than {} days",
        config.dispatch.dedup_retention_days
    ));
    Ok(())
}
