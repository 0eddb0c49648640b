//! `herald status` and `herald stats`.

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use herald_core::config::AppConfig;
use herald_core::types::NotificationId;
use herald_service::{DeliveryStatusReport, DeliveryTracker, NotificationStats};

use crate::output::{self, OutputFormat};

/// Arguments naming one notification
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Notification id
    pub id: String,
}

/// Per-channel counts
#[derive(Debug, Serialize, Tabled)]
struct ChannelRow {
    channel: String,
    total: usize,
    pending: usize,
    sent: usize,
    delivered: usize,
    failed: usize,
    retrying: usize,
    failed_permanent: usize,
}

/// One delivery record
#[derive(Debug, Serialize, Tabled)]
struct RecordRow {
    user_id: String,
    channel: String,
    status: String,
    attempts: u32,
    last_error: String,
}

/// Totals for one notification
#[derive(Debug, Serialize, Tabled)]
struct StatsRow {
    deliveries: usize,
    delivered: usize,
    failed: usize,
    pending: usize,
    recipients: usize,
    seen: usize,
    delivery_rate: String,
    seen_rate: String,
}

impl From<&NotificationStats> for StatsRow {
    fn from(stats: &NotificationStats) -> Self {
        Self {
            deliveries: stats.total,
            delivered: stats.delivered,
            failed: stats.failed,
            pending: stats.pending,
            recipients: stats.recipients,
            seen: stats.seen,
            delivery_rate: format!("{:.1}%", stats.delivery_rate),
            seen_rate: format!("{:.1}%", stats.seen_rate),
        }
    }
}

async fn tracker(config: &AppConfig) -> anyhow::Result<DeliveryTracker> {
    Ok(DeliveryTracker::new(super::open_store(config).await?))
}

fn parse_id(raw: &str) -> anyhow::Result<NotificationId> {
    raw.parse()
        .with_context(|| format!("'{raw}' is not a notification id"))
}

/// Print a delivery status report.
pub fn print_report(report: &DeliveryStatusReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return output::print_json(report);
    }
    let channels: Vec<ChannelRow> = report
        .channels
        .iter()
        .map(|(channel, counts)| ChannelRow {
            channel: channel.as_str().to_string(),
            total: counts.total,
            pending: counts.pending,
            sent: counts.sent,
            delivered: counts.delivered,
            failed: counts.failed,
            retrying: counts.retrying,
            failed_permanent: counts.failed_permanent,
        })
        .collect();
    let records: Vec<RecordRow> = report
        .records
        .iter()
        .map(|record| RecordRow {
            user_id: record.user_id.to_string(),
            channel: record.channel.to_string(),
            status: record.status.to_string(),
            attempts: record.attempts,
            last_error: record
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        })
        .collect();

    println!("Notification {}", report.notification_id);
    output::print_list(&channels, format)?;
    output::print_list(&records, format)
}

/// Execute `status`
pub async fn status(args: &StatusArgs, config: AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let report = tracker(&config).await?.delivery_status(id).await?;
    print_report(&report, format)
}

/// Execute `stats`
pub async fn stats(args: &StatusArgs, config: AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let stats = tracker(&config).await?.stats(id).await?;
    if format == OutputFormat::Json {
        return output::print_json(&stats);
    }
    println!("Notification {id}");
    output::print_item(&StatsRow::from(&stats), format)
}
