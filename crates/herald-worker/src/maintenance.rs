//! Cron-driven maintenance jobs.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use herald_core::config::MaintenanceConfig;
use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_database::NotificationStore;

/// Delete dedup history older than `retention_days`. Returns rows removed.
pub async fn purge_dedup_history(
    store: &dyn NotificationStore,
    retention_days: u32,
) -> AppResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let removed = store.purge_dispatch_history(cutoff).await?;
    info!(removed, cutoff = %cutoff, "Purged dedup history");
    Ok(removed)
}

/// Owns the cron scheduler running maintenance jobs.
pub struct MaintenanceScheduler {
    scheduler: JobScheduler,
    store: Arc<dyn NotificationStore>,
    retention_days: u32,
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler")
            .field("retention_days", &self.retention_days)
            .finish()
    }
}

impl MaintenanceScheduler {
    /// Create an idle scheduler.
    pub async fn new(store: Arc<dyn NotificationStore>, retention_days: u32) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;
        Ok(Self {
            scheduler,
            store,
            retention_days,
        })
    }

    /// Register every maintenance job described by `config`.
    pub async fn register(&self, config: &MaintenanceConfig) -> AppResult<()> {
        self.register_dedup_cleanup(&config.dedup_cleanup_cron)
            .await
    }

    /// Start running registered jobs.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;
        info!("Maintenance scheduler started");
        Ok(())
    }

    /// Stop the scheduler.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shut down scheduler: {e}")))?;
        info!("Maintenance scheduler shut down");
        Ok(())
    }

    async fn register_dedup_cleanup(&self, cron: &str) -> AppResult<()> {
        let store = Arc::clone(&self.store);
        let retention_days = self.retention_days;
        let job = CronJob::new_async(cron, move |_uuid, _lock| {
            let store = Arc::clone(&store);
            Box::pin(async move {
                debug!("Running dedup history cleanup");
                if let Err(e) = purge_dedup_history(store.as_ref(), retention_days).await {
                    error!(error = %e, "Dedup history cleanup failed");
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!("Invalid dedup cleanup schedule '{cron}': {e}"))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add dedup cleanup job: {e}")))?;
        info!(cron = %cron, retention_days, "Registered: dedup history cleanup");
        Ok(())
    }
}
