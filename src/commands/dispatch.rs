//! `herald dispatch`: send one intent and optionally wait for delivery.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use herald_core::config::AppConfig;
use herald_dispatch::EngineBuilder;
use herald_entity::NotificationIntent;
use herald_service::StaticAudienceProvider;

use crate::output::{self, OutputFormat};

/// Arguments for the dispatch command
#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// JSON file holding the notification intent
    #[arg(long)]
    pub intent: PathBuf,

    /// JSON directory of users, roles, sectors and assignees
    #[arg(long)]
    pub directory: Option<PathBuf>,

    /// Wait until every delivery is terminal
    #[arg(long)]
    pub wait: bool,

    /// Maximum seconds to wait with --wait
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
}

/// Execute the dispatch command
pub async fn execute(
    args: &DispatchArgs,
    config: AppConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&args.intent)
        .await
        .with_context(|| format!("reading {}", args.intent.display()))?;
    let intent: NotificationIntent =
        serde_json::from_str(&raw).context("parsing notification intent")?;

    let audience = match &args.directory {
        Some(path) => StaticAudienceProvider::from_json_file(path)?,
        None => StaticAudienceProvider::new(),
    };
    let store = super::open_store(&config).await?;
    let engine = EngineBuilder::new(config)
        .store(store)
        .audience(Arc::new(audience))
        .build()?;

    let result = engine.dispatch(intent).await?;
    match format {
        OutputFormat::Json => output::print_json(&result)?,
        OutputFormat::Table if result.duplicate => output::print_warning(&format!(
            "Duplicate dispatch; existing notification {}",
            result.notification_id
        )),
        OutputFormat::Table => {
            output::print_success(&format!(
                "Notification {} dispatched: {} deliveries to {} recipients",
                result.notification_id,
                result.submitted_count(),
                result.recipients.len()
            ));
            for recipient in &result.recipients {
                for skipped in &recipient.skipped {
                    output::print_warning(&format!(
                        "{} skipped for {}: {}",
                        skipped.channel, recipient.user_id, skipped.reason
                    ));
                }
            }
        }
    }

    if args.wait && !result.duplicate {
        let report = engine
            .wait_settled(result.notification_id, Duration::from_secs(args.timeout))
            .await?;
        super::status::print_report(&report, format)?;
        if !report.is_settled() {
            output::print_warning("Timed out before every delivery settled");
        }
    }

    engine.shutdown().await?;
    Ok(())
}
