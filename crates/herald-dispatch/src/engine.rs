//! The engine facade hosts embed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use herald_channels::in_app::InAppHub;
use herald_channels::{AdapterRegistry, ChannelAdapter};
use herald_core::config::AppConfig;
use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_core::types::{NotificationId, UserId};
use herald_database::{InboxEntry, MemoryNotificationStore, NotificationStore};
use herald_entity::{Channel, DeliveryStatus, NotificationIntent};
use herald_service::{
    AudienceProvider, DeliveryStatusReport, DeliveryTracker, NotificationStats, PolicyResolver,
    PreferenceService, StaticAudienceProvider,
};
use herald_worker::{
    DeliveryProcessor, DeliveryTask, MaintenanceScheduler, RateLimiter, RetryPolicy, WorkerPools,
    purge_dedup_history,
};

use crate::dispatcher::NotificationDispatcher;
use crate::outcome::DispatchResult;

/// Assembles a [`NotificationEngine`]. Anything not supplied is built
/// from the configuration: an in-memory store, the seeded policy table
/// with config overrides, adapters for every enabled channel and an empty
/// static audience.
pub struct EngineBuilder {
    config: AppConfig,
    store: Option<Arc<dyn NotificationStore>>,
    audience: Option<Arc<dyn AudienceProvider>>,
    policies: Option<PolicyResolver>,
    adapters: Option<AdapterRegistry>,
    extra_adapters: Vec<Arc<dyn ChannelAdapter>>,
    hub: Option<Arc<InAppHub>>,
}

impl EngineBuilder {
    /// Start from a configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: None,
            audience: None,
            policies: None,
            adapters: None,
            extra_adapters: Vec::new(),
            hub: None,
        }
    }

    /// Use this store.
    pub fn store(mut self, store: Arc<dyn NotificationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use this audience provider.
    pub fn audience(mut self, audience: Arc<dyn AudienceProvider>) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Use this policy table instead of the seeded one.
    pub fn policies(mut self, policies: PolicyResolver) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Use exactly these adapters.
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Add or replace one adapter on top of the configured ones.
    pub fn adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.extra_adapters.push(adapter);
        self
    }

    /// Share an existing in-app hub.
    pub fn in_app_hub(mut self, hub: Arc<InAppHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the engine and start its worker pools. Must run inside a
    /// Tokio runtime.
    pub fn build(self) -> AppResult<NotificationEngine> {
        let config = self.config;
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(AppError::configuration(format!(
                "Invalid configuration: {}",
                problems.join("; ")
            )));
        }
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryNotificationStore::new()) as Arc<dyn NotificationStore>);
        let audience = self
            .audience
            .unwrap_or_else(|| Arc::new(StaticAudienceProvider::new()) as Arc<dyn AudienceProvider>);
        let policies = Arc::new(match self.policies {
            Some(policies) => policies,
            None => PolicyResolver::from_config(&config.policies)?,
        });
        let hub = self
            .hub
            .unwrap_or_else(|| Arc::new(InAppHub::new(&config.channels.in_app)));
        let mut adapters = match self.adapters {
            Some(adapters) => adapters,
            None => AdapterRegistry::from_config(&config.channels, Arc::clone(&hub))?,
        };
        for adapter in self.extra_adapters {
            adapters.register(adapter);
        }
        let adapters = Arc::new(adapters);

        let tracker = Arc::new(DeliveryTracker::new(Arc::clone(&store)));
        let preferences = PreferenceService::new(Arc::clone(&store), Arc::clone(&policies));
        let processor = Arc::new(DeliveryProcessor::new(
            Arc::clone(&tracker),
            Arc::clone(&adapters),
            RateLimiter::from_config(&config.rate_limits),
            RetryPolicy::from_config(&config.retry),
        ));
        let pools = WorkerPools::start(
            processor,
            &adapters.channels(),
            &config.channels,
            config.dispatch.submit_buffer,
        );
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&policies),
            preferences.clone(),
            audience,
            Arc::clone(&store),
            pools.submitter(),
            config.dispatch.exclude_actor,
        );

        info!(
            channels = ?adapters.channels(),
            policies = policies.len(),
            "Notification engine started"
        );

        Ok(NotificationEngine {
            config,
            store,
            policies,
            preferences,
            tracker,
            dispatcher,
            pools,
            hub,
            maintenance: Mutex::new(None),
        })
    }
}

/// Dispatch plus the read and update entry points for UI and reporting.
#[derive(Debug)]
pub struct NotificationEngine {
    config: AppConfig,
    store: Arc<dyn NotificationStore>,
    policies: Arc<PolicyResolver>,
    preferences: PreferenceService,
    tracker: Arc<DeliveryTracker>,
    dispatcher: NotificationDispatcher,
    pools: WorkerPools,
    hub: Arc<InAppHub>,
    maintenance: Mutex<Option<MaintenanceScheduler>>,
}

impl NotificationEngine {
    /// Engine with defaults for everything but the configuration.
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        EngineBuilder::new(config).build()
    }

    /// Dispatch an intent. Returns once deliveries are queued.
    pub async fn dispatch(&self, intent: NotificationIntent) -> AppResult<DispatchResult> {
        self.dispatcher.dispatch(intent).await
    }

    /// Per-channel delivery breakdown of a notification.
    pub async fn delivery_status(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<DeliveryStatusReport> {
        self.tracker.delivery_status(notification_id).await
    }

    /// Delivery and seen totals of a notification.
    pub async fn stats(&self, notification_id: NotificationId) -> AppResult<NotificationStats> {
        self.tracker.stats(notification_id).await
    }

    /// Notifications the user has not opened.
    pub async fn unseen_count(&self, user_id: UserId) -> AppResult<u64> {
        self.tracker.unseen_count(user_id).await
    }

    /// Mark a notification opened. Idempotent; `false` when already seen.
    pub async fn mark_seen(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> AppResult<bool> {
        self.tracker.mark_seen(user_id, notification_id).await
    }

    /// The user's notifications, newest first.
    pub async fn notifications_for(&self, user_id: UserId) -> AppResult<Vec<InboxEntry>> {
        self.tracker.notifications_for(user_id).await
    }

    /// Supersede every open delivery of a notification.
    pub async fn cancel(&self, notification_id: NotificationId) -> AppResult<usize> {
        self.tracker.cancel(notification_id).await
    }

    /// Poll until every delivery of the notification is terminal or
    /// `timeout` elapses. Returns the last report either way.
    pub async fn wait_settled(
        &self,
        notification_id: NotificationId,
        timeout: Duration,
    ) -> AppResult<DeliveryStatusReport> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let report = self.tracker.delivery_status(notification_id).await?;
            if report.is_settled() || tokio::time::Instant::now() >= deadline {
                return Ok(report);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Resubmit every open delivery found in the store. Run once at
    /// startup. Returns how many records were resubmitted.
    pub async fn recover(&self) -> AppResult<usize> {
        let submitter = self.pools.submitter();
        let available: BTreeSet<Channel> = submitter.channels().into_iter().collect();
        let now = Utc::now();
        let mut resubmitted = 0;

        for record in self.tracker.open_records().await? {
            if !available.contains(&record.channel) {
                warn!(
                    delivery_id = %record.id,
                    channel = %record.channel,
                    "Open delivery on a channel without transport left untouched"
                );
                continue;
            }
            let task = DeliveryTask {
                delivery_id: record.id,
                channel: record.channel,
            };
            let delay = match (record.status, record.next_retry_at) {
                (DeliveryStatus::Retrying, Some(at)) if at > now => {
                    (at - now).to_std().unwrap_or_default()
                }
                _ => Duration::ZERO,
            };
            if delay.is_zero() {
                submitter.submit(task).await?;
            } else {
                submitter.submit_after(task, delay);
            }
            resubmitted += 1;
        }

        info!(resubmitted, "Recovered open deliveries");
        Ok(resubmitted)
    }

    /// Start the cron maintenance jobs if enabled. Calling it again is a
    /// no-op.
    pub async fn start_maintenance(&self) -> AppResult<()> {
        if !self.config.maintenance.enabled {
            info!("Maintenance disabled");
            return Ok(());
        }
        let mut slot = self.maintenance.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        let scheduler = MaintenanceScheduler::new(
            Arc::clone(&self.store),
            self.config.dispatch.dedup_retention_days,
        )
        .await?;
        scheduler.register(&self.config.maintenance).await?;
        scheduler.start().await?;
        *slot = Some(scheduler);
        Ok(())
    }

    /// Purge expired dedup history now. Returns rows removed.
    pub async fn purge_history(&self) -> AppResult<u64> {
        purge_dedup_history(
            self.store.as_ref(),
            self.config.dispatch.dedup_retention_days,
        )
        .await
    }

    /// Stop maintenance and drain the worker pools.
    pub async fn shutdown(&self) -> AppResult<()> {
        if let Some(mut scheduler) = self.maintenance.lock().await.take() {
            scheduler.shutdown().await?;
        }
        self.pools.shutdown().await;
        Ok(())
    }

    /// Channel preference management.
    pub fn preferences(&self) -> &PreferenceService {
        &self.preferences
    }

    /// The policy table in use.
    pub fn policies(&self) -> &PolicyResolver {
        &self.policies
    }

    /// Live in-app connections.
    pub fn in_app_hub(&self) -> &Arc<InAppHub> {
        &self.hub
    }

    /// Direct access to the store.
    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }
}
