//! Bounded per-channel worker pools.
//!
//! Each channel gets its own queue and runner. The runner admits at most
//! `concurrency` tasks at a time through a semaphore and spawns each one.
//! Retries and deferrals never block a worker: they become delayed
//! resubmissions onto the same channel's queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use herald_core::config::ChannelsConfig;
use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_core::types::DeliveryId;
use herald_entity::Channel;

use crate::processor::DeliveryProcessor;

/// Grace period for in-flight tasks on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause before retrying a task whose store access failed transiently.
const STORE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A unit of work: one delivery record on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTask {
    /// Record to process.
    pub delivery_id: DeliveryId,
    /// Channel pool that handles it.
    pub channel: Channel,
}

/// Worker count configured for a channel.
pub fn concurrency_for(config: &ChannelsConfig, channel: Channel) -> usize {
    let configured = match channel {
        Channel::InApp => config.in_app.concurrency,
        Channel::Push => config.push.concurrency,
        Channel::WhatsApp => config.whatsapp.concurrency,
        Channel::Email => config.email.concurrency,
        Channel::Sms => config.sms.concurrency,
    };
    configured.max(1)
}

/// Cloneable handle that feeds the channel queues.
#[derive(Debug, Clone)]
pub struct Submitter {
    queues: Arc<HashMap<Channel, mpsc::Sender<DeliveryTask>>>,
    shutdown: watch::Receiver<bool>,
}

impl Submitter {
    /// Queue a task on its channel's pool.
    pub async fn submit(&self, task: DeliveryTask) -> AppResult<()> {
        let queue = self.queues.get(&task.channel).ok_or_else(|| {
            AppError::configuration(format!("No worker pool for channel {}", task.channel))
        })?;
        queue.send(task).await.map_err(|_| {
            AppError::service_unavailable(format!("Worker pool for {} is stopped", task.channel))
        })
    }

    /// Queue a task once `delay` has elapsed. Dropped silently if the pools
    /// shut down first.
    pub fn submit_after(&self, task: DeliveryTask, delay: Duration) {
        let submitter = self.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(delivery_id = %task.delivery_id, "Delayed submission dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = submitter.submit(task).await {
                        warn!(delivery_id = %task.delivery_id, error = %e, "Delayed submission failed");
                    }
                }
            }
        });
    }

    /// Channels that have a pool.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.queues.keys().copied().collect();
        channels.sort();
        channels
    }
}

/// The running set of channel pools.
#[derive(Debug)]
pub struct WorkerPools {
    submitter: Submitter,
    shutdown: watch::Sender<bool>,
    runners: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPools {
    /// Start one pool per channel in `channels`.
    pub fn start(
        processor: Arc<DeliveryProcessor>,
        channels: &[Channel],
        config: &ChannelsConfig,
        buffer: usize,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut queues = HashMap::new();
        let mut receivers = Vec::new();
        for &channel in channels {
            let (tx, rx) = mpsc::channel(buffer.max(1));
            queues.insert(channel, tx);
            receivers.push((channel, rx));
        }

        let submitter = Submitter {
            queues: Arc::new(queues),
            shutdown: shutdown_rx,
        };

        let runners = receivers
            .into_iter()
            .map(|(channel, rx)| {
                let runner = ChannelRunner {
                    channel,
                    concurrency: concurrency_for(config, channel),
                    processor: Arc::clone(&processor),
                    submitter: submitter.clone(),
                };
                tokio::spawn(runner.run(rx))
            })
            .collect();

        Self {
            submitter,
            shutdown,
            runners: Mutex::new(runners),
        }
    }

    /// Handle for submitting tasks.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Stop accepting work, let in-flight tasks finish, and wait for every
    /// runner to exit.
    pub async fn shutdown(&self) {
        if self.shutdown.send(true).is_err() {
            debug!("Worker pools already stopped");
        }
        let runners = std::mem::take(&mut *self.runners.lock().await);
        for runner in runners {
            if let Err(e) = runner.await {
                error!(error = %e, "Channel runner panicked");
            }
        }
        info!("Worker pools shut down");
    }
}

struct ChannelRunner {
    channel: Channel,
    concurrency: usize,
    processor: Arc<DeliveryProcessor>,
    submitter: Submitter,
}

impl ChannelRunner {
    async fn run(self, mut queue: mpsc::Receiver<DeliveryTask>) {
        let mut shutdown = self.submitter.shutdown.clone();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(channel = %self.channel, concurrency = self.concurrency, "Channel pool started");

        loop {
            let task = tokio::select! {
                _ = shutdown.changed() => break,
                task = queue.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let processor = Arc::clone(&self.processor);
            let submitter = self.submitter.clone();

            tokio::spawn(async move {
                let _permit = permit;
                match processor.process(task.delivery_id).await {
                    Ok(outcome) => {
                        if let Some(delay) = outcome.resubmit_after() {
                            submitter.submit_after(task, delay);
                        }
                    }
                    Err(e) if e.kind.is_transient() => {
                        warn!(
                            delivery_id = %task.delivery_id,
                            channel = %task.channel,
                            error = %e,
                            "Delivery task interrupted, resubmitting"
                        );
                        submitter.submit_after(task, STORE_RETRY_DELAY);
                    }
                    Err(e) => error!(
                        delivery_id = %task.delivery_id,
                        channel = %task.channel,
                        error = %e,
                        "Delivery task failed"
                    ),
                }
            });
        }

        debug!(channel = %self.channel, "Waiting for in-flight deliveries");
        let permits = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if tokio::time::timeout(DRAIN_TIMEOUT, semaphore.acquire_many(permits))
            .await
            .is_err()
        {
            warn!(channel = %self.channel, "In-flight deliveries still running after drain timeout");
        }
        info!(channel = %self.channel, "Channel pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use herald_channels::{AdapterRegistry, ChannelAdapter, DeliveryPayload, OutboundMessage};
    use herald_core::types::{NotificationId, UserId};
    use herald_database::{MemoryNotificationStore, NotificationStore};
    use herald_entity::{DeliveryError, DeliveryRecord, DeliveryStatus, Importance, Notification};
    use herald_service::DeliveryTracker;

    use super::*;
    use crate::limiter::RateLimiter;
    use crate::retry::RetryPolicy;

    /// Fails the first `failures` sends, then succeeds; tracks peak concurrency.
    #[derive(Debug, Default)]
    struct Flaky {
        failures: usize,
        sends: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChannelAdapter for Flaky {
        fn channel(&self) -> Channel {
            Channel::Push
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(10)
        }

        fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
            Ok(OutboundMessage::from_payload(
                payload,
                payload.require_destination("push token")?.to_string(),
                payload.title.clone(),
                payload.body.clone(),
            ))
        }

        async fn send(&self, _message: &OutboundMessage) -> Result<(), DeliveryError> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.sends.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(DeliveryError::retryable("HTTP_503", "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    async fn setup(
        adapter: Arc<Flaky>,
        recipients: usize,
        concurrency: usize,
    ) -> (Arc<MemoryNotificationStore>, WorkerPools, Vec<DeliveryRecord>) {
        let store = Arc::new(MemoryNotificationStore::new());
        let notification = Notification {
            id: NotificationId::new(),
            key: "task.overdue".parse().unwrap(),
            title: "Task overdue".into(),
            body: "Audit was due yesterday".into(),
            importance: Importance::High,
            action_url: None,
            entity: None,
            data: serde_json::json!({}),
            channels: [Channel::Push].into(),
            actor: None,
            dedup_key: None,
            created_at: Utc::now(),
            scheduled_at: None,
            sent_at: None,
        };
        let records: Vec<DeliveryRecord> = (0..recipients)
            .map(|_| {
                DeliveryRecord::pending(
                    notification.id,
                    UserId::new(),
                    Channel::Push,
                    Some("device-token-0123456789".into()),
                )
            })
            .collect();
        store.create_dispatch(&notification, &records).await.unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(adapter);
        let processor = Arc::new(DeliveryProcessor::new(
            Arc::new(DeliveryTracker::new(store.clone())),
            Arc::new(registry),
            RateLimiter::new(),
            RetryPolicy::default(),
        ));
        let mut config = ChannelsConfig::default();
        config.push.concurrency = concurrency;
        let pools = WorkerPools::start(processor, &[Channel::Push], &config, 16);
        (store, pools, records)
    }

    async fn wait_settled(store: &MemoryNotificationStore, records: &[DeliveryRecord]) {
        for _ in 0..1_000 {
            let open = store.list_open_deliveries().await.unwrap();
            if open.iter().all(|r| records.iter().all(|own| own.id != r.id)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("deliveries did not settle");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let adapter = Arc::new(Flaky::default());
        let (store, pools, records) = setup(adapter.clone(), 6, 2).await;
        let submitter = pools.submitter();
        for record in &records {
            submitter
                .submit(DeliveryTask {
                    delivery_id: record.id,
                    channel: Channel::Push,
                })
                .await
                .unwrap();
        }

        wait_settled(&store, &records).await;
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 6);
        assert!(adapter.peak.load(Ordering::SeqCst) <= 2);
        pools.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_resubmitted_after_backoff() {
        let adapter = Arc::new(Flaky {
            failures: 1,
            ..Flaky::default()
        });
        let (store, pools, records) = setup(adapter.clone(), 1, 1).await;
        let started = tokio::time::Instant::now();
        pools
            .submitter()
            .submit(DeliveryTask {
                delivery_id: records[0].id,
                channel: Channel::Push,
            })
            .await
            .unwrap();

        wait_settled(&store, &records).await;
        assert!(started.elapsed() >= Duration::from_secs(5));
        let stored = store.get_delivery(records[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
        assert_eq!(stored.attempts, 2);
        pools.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_to_unknown_channel() {
        let adapter = Arc::new(Flaky::default());
        let (_store, pools, _records) = setup(adapter, 0, 1).await;
        let err = pools
            .submitter()
            .submit(DeliveryTask {
                delivery_id: DeliveryId::new(),
                channel: Channel::Email,
            })
            .await
            .unwrap_err();
        assert!(err.message.contains("No worker pool"));
        pools.shutdown().await;
    }
}
