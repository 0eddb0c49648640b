//! One delivery attempt, from admission to terminal or retry decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use herald_channels::{AdapterRegistry, DeliveryPayload};
use herald_core::error::ErrorKind;
use herald_core::result::AppResult;
use herald_core::types::DeliveryId;
use herald_entity::{DeliveryError, DeliveryRecord, DeliveryStatus};
use herald_service::DeliveryTracker;

use crate::limiter::{Admission, RateLimiter};
use crate::retry::RetryPolicy;

/// What happened to a delivery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The transport accepted the message.
    Delivered,
    /// The record reached `FAILED_PERMANENT`.
    FailedPermanently,
    /// A retryable failure; the next attempt is due after the delay.
    RetryScheduled(Duration),
    /// Not attempted yet (rate limited or scheduled for later); resubmit
    /// after the delay. No attempt was counted.
    Deferred(Duration),
    /// Nothing to do: the record is terminal or another task owns it.
    Skipped,
}

impl ProcessOutcome {
    /// Delay after which the task should be submitted again, if any.
    pub fn resubmit_after(&self) -> Option<Duration> {
        match self {
            Self::RetryScheduled(delay) | Self::Deferred(delay) => Some(*delay),
            Self::Delivered | Self::FailedPermanently | Self::Skipped => None,
        }
    }
}

fn chrono_delay(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Wall-clock time that advances with the Tokio timer, so stored due times
/// agree with the delays the pools sleep for.
#[derive(Debug, Clone, Copy)]
struct Clock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            origin_utc: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.origin_utc + chrono_delay(self.origin.elapsed())
    }

    fn after(&self, delay: Duration) -> DateTime<Utc> {
        self.now() + chrono_delay(delay)
    }

    /// Time left until `at`, or `None` when it has passed.
    fn until(&self, at: DateTime<Utc>) -> Option<Duration> {
        let now = self.now();
        (at > now).then(|| (at - now).to_std().unwrap_or_default())
    }
}

fn interrupted() -> DeliveryError {
    DeliveryError::retryable("INTERRUPTED", "Attempt was interrupted before completing")
}

/// Drives a delivery record through one attempt. All state changes go
/// through the [`DeliveryTracker`].
#[derive(Debug, Clone)]
pub struct DeliveryProcessor {
    tracker: Arc<DeliveryTracker>,
    adapters: Arc<AdapterRegistry>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    clock: Clock,
}

impl DeliveryProcessor {
    /// Creates a new processor.
    pub fn new(
        tracker: Arc<DeliveryTracker>,
        adapters: Arc<AdapterRegistry>,
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tracker,
            adapters,
            limiter,
            retry,
            clock: Clock::start(),
        }
    }

    /// Process one delivery record. A transition lost to a concurrent
    /// writer (such as a cancellation) counts as [`ProcessOutcome::Skipped`].
    pub async fn process(&self, id: DeliveryId) -> AppResult<ProcessOutcome> {
        match self.attempt(id).await {
            Err(e) if e.is(ErrorKind::Conflict) => {
                debug!(delivery_id = %id, error = %e, "Delivery taken over elsewhere");
                Ok(ProcessOutcome::Skipped)
            }
            other => other,
        }
    }

    async fn attempt(&self, id: DeliveryId) -> AppResult<ProcessOutcome> {
        let mut record = self.tracker.record(id).await?;
        match record.status {
            DeliveryStatus::Delivered | DeliveryStatus::FailedPermanent => {
                return Ok(ProcessOutcome::Skipped);
            }
            DeliveryStatus::Retrying => {
                if let Some(wait) = record.next_retry_at.and_then(|at| self.clock.until(at)) {
                    debug!(delivery_id = %id, wait_ms = wait.as_millis() as u64, "Retry not due yet");
                    return Ok(ProcessOutcome::Deferred(wait));
                }
                record = self.tracker.requeue(id).await?;
            }
            DeliveryStatus::Sent => {
                let err = interrupted();
                let record = self.tracker.mark_failed(id, err.clone()).await?;
                return self.settle_failure(&record, err).await;
            }
            DeliveryStatus::Failed => {
                let err = record.last_error.clone().unwrap_or_else(interrupted);
                return self.settle_failure(&record, err).await;
            }
            DeliveryStatus::Pending => {}
        }

        let notification = self.tracker.notification(record.notification_id).await?;
        if let Some((at, wait)) = notification
            .scheduled_at
            .and_then(|at| self.clock.until(at).map(|wait| (at, wait)))
        {
            debug!(delivery_id = %id, scheduled_at = %at, "Delivery not due yet");
            return Ok(ProcessOutcome::Deferred(wait));
        }

        let Some(adapter) = self.adapters.get(record.channel) else {
            let err = DeliveryError::permanent(
                "CHANNEL_UNAVAILABLE",
                format!("No adapter registered for {}", record.channel),
            );
            error!(delivery_id = %id, channel = %record.channel, "No adapter for channel");
            self.tracker.mark_failed_permanently(id, err).await?;
            return Ok(ProcessOutcome::FailedPermanently);
        };

        let payload = DeliveryPayload::for_record(&notification, &record);
        let message = match adapter.prepare(&payload) {
            Ok(message) => message,
            Err(err) => {
                error!(
                    delivery_id = %id,
                    channel = %record.channel,
                    user_id = %record.user_id,
                    error = %err,
                    "Invalid contact data, delivery failed permanently"
                );
                self.tracker.mark_failed_permanently(id, err).await?;
                return Ok(ProcessOutcome::FailedPermanently);
            }
        };

        if let Admission::Denied { retry_after } = self.limiter.try_acquire(record.channel).await {
            debug!(
                delivery_id = %id,
                channel = %record.channel,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limited, deferring"
            );
            self.tracker
                .schedule_retry(id, self.clock.after(retry_after), None)
                .await?;
            return Ok(ProcessOutcome::Deferred(retry_after));
        }

        let record = self.tracker.mark_sent(id).await?;
        match adapter.deliver(&message).await {
            Ok(()) => {
                self.tracker.mark_delivered(id).await?;
                info!(
                    delivery_id = %id,
                    notification_id = %record.notification_id,
                    channel = %record.channel,
                    attempt = record.attempts,
                    "Delivered"
                );
                Ok(ProcessOutcome::Delivered)
            }
            Err(err) => {
                let record = self.tracker.mark_failed(id, err.clone()).await?;
                self.settle_failure(&record, err).await
            }
        }
    }

    /// Decide between a retry and a permanent failure for a `FAILED` record.
    async fn settle_failure(
        &self,
        record: &DeliveryRecord,
        err: DeliveryError,
    ) -> AppResult<ProcessOutcome> {
        if self.retry.should_retry(record.attempts, &err) {
            let delay = self.retry.delay_for(record.attempts, &err);
            warn!(
                delivery_id = %record.id,
                channel = %record.channel,
                attempt = record.attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "Delivery failed, retry scheduled"
            );
            self.tracker
                .schedule_retry(record.id, self.clock.after(delay), None)
                .await?;
            return Ok(ProcessOutcome::RetryScheduled(delay));
        }

        error!(
            delivery_id = %record.id,
            channel = %record.channel,
            attempt = record.attempts,
            error = %err,
            "Delivery failed permanently"
        );
        self.tracker.mark_failed_permanently(record.id, err).await?;
        Ok(ProcessOutcome::FailedPermanently)
    }
}
