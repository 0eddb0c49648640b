//! Delivery tracker: the single writer of delivery and seen records.
//!
//! Every mutation loads the record, applies a transition on the entity and
//! writes it back with a compare-and-set on the previous status. A lost race
//! or an illegal transition surfaces as a `Conflict` error; callers decide
//! whether that is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_core::types::{DeliveryId, NotificationId, UserId};
use herald_database::{InboxEntry, NotificationStore};
use herald_entity::delivery::IllegalTransition;
use herald_entity::{
    Channel, DeliveryError, DeliveryRecord, DeliveryStatus, Notification, SeenRecord,
};

/// Lost CAS races tolerated by [`DeliveryTracker::cancel`] per record.
const CANCEL_ATTEMPTS: usize = 5;

/// Record counts for one channel of a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelBreakdown {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
    pub retrying: usize,
    pub failed_permanent: usize,
}

impl ChannelBreakdown {
    fn count(&mut self, status: DeliveryStatus) {
        self.total += 1;
        match status {
            DeliveryStatus::Pending => self.pending += 1,
            DeliveryStatus::Sent => self.sent += 1,
            DeliveryStatus::Delivered => self.delivered += 1,
            DeliveryStatus::Failed => self.failed += 1,
            DeliveryStatus::Retrying => self.retrying += 1,
            DeliveryStatus::FailedPermanent => self.failed_permanent += 1,
        }
    }
}

/// Per-channel delivery state of one notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStatusReport {
    pub notification_id: NotificationId,
    pub channels: BTreeMap<Channel, ChannelBreakdown>,
    pub records: Vec<DeliveryRecord>,
}

impl DeliveryStatusReport {
    /// Whether every record reached a terminal status.
    pub fn is_settled(&self) -> bool {
        self.records.iter().all(DeliveryRecord::is_terminal)
    }
}

/// Aggregate outcome of one notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationStats {
    /// Delivery records.
    pub total: usize,
    /// Records in `DELIVERED`.
    pub delivered: usize,
    /// Records in `FAILED_PERMANENT`.
    pub failed: usize,
    /// Records still in flight.
    pub pending: usize,
    /// Distinct recipients.
    pub recipients: usize,
    /// Recipients who opened the notification.
    pub seen: usize,
    /// `delivered / total` as a percentage.
    pub delivery_rate: f64,
    /// `seen / recipients` as a percentage.
    pub seen_rate: f64,
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn illegal(id: DeliveryId, err: IllegalTransition) -> AppError {
    AppError::conflict(format!("Delivery {id}: {err}"))
}

/// Owns delivery-state mutation and the reporting reads built on it.
#[derive(Debug, Clone)]
pub struct DeliveryTracker {
    store: Arc<dyn NotificationStore>,
}

impl DeliveryTracker {
    /// Creates a new tracker.
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Load a record, failing with `NotFound` when it does not exist.
    pub async fn record(&self, id: DeliveryId) -> AppResult<DeliveryRecord> {
        self.store
            .get_delivery(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Delivery {id} not found")))
    }

    async fn transition<F>(&self, id: DeliveryId, apply: F) -> AppResult<DeliveryRecord>
    where
        F: FnOnce(&mut DeliveryRecord) -> Result<(), IllegalTransition>,
    {
        let mut record = self.record(id).await?;
        let expected = record.status;
        apply(&mut record).map_err(|e| illegal(id, e))?;

        if !self.store.update_delivery(&record, expected).await? {
            return Err(AppError::conflict(format!(
                "Delivery {id} changed concurrently (expected {expected})"
            )));
        }
        debug!(
            delivery_id = %id,
            from = %expected,
            to = %record.status,
            "Delivery transition"
        );
        Ok(record)
    }

    /// `PENDING -> SENT`, counting one attempt.
    pub async fn mark_sent(&self, id: DeliveryId) -> AppResult<DeliveryRecord> {
        self.transition(id, DeliveryRecord::begin_attempt).await
    }

    /// `SENT -> DELIVERED`. The first delivery also stamps the
    /// notification's `sent_at`.
    pub async fn mark_delivered(&self, id: DeliveryId) -> AppResult<DeliveryRecord> {
        let record = self.transition(id, DeliveryRecord::succeed).await?;
        let at = record.delivered_at.unwrap_or_else(Utc::now);
        self.store
            .mark_notification_sent(record.notification_id, at)
            .await?;
        Ok(record)
    }

    /// `SENT -> FAILED`.
    pub async fn mark_failed(
        &self,
        id: DeliveryId,
        error: DeliveryError,
    ) -> AppResult<DeliveryRecord> {
        self.transition(id, |r| r.fail(error)).await
    }

    /// `FAILED -> RETRYING` or `PENDING -> RETRYING`, due at `at`.
    pub async fn schedule_retry(
        &self,
        id: DeliveryId,
        at: DateTime<Utc>,
        error: Option<DeliveryError>,
    ) -> AppResult<DeliveryRecord> {
        self.transition(id, |r| r.schedule_retry(at, error)).await
    }

    /// `RETRYING -> PENDING`.
    pub async fn requeue(&self, id: DeliveryId) -> AppResult<DeliveryRecord> {
        self.transition(id, DeliveryRecord::requeue).await
    }

    /// Any non-terminal status `-> FAILED_PERMANENT`.
    pub async fn mark_failed_permanently(
        &self,
        id: DeliveryId,
        error: DeliveryError,
    ) -> AppResult<DeliveryRecord> {
        self.transition(id, |r| r.fail_permanently(error)).await
    }

    /// Supersede every open delivery of a notification. Returns how many
    /// records were closed.
    pub async fn cancel(&self, notification_id: NotificationId) -> AppResult<usize> {
        self.notification(notification_id).await?;
        let mut cancelled = 0;

        for mut record in self.store.list_deliveries(notification_id).await? {
            for _ in 0..CANCEL_ATTEMPTS {
                if record.is_terminal() {
                    break;
                }
                let expected = record.status;
                record
                    .fail_permanently(DeliveryError::superseded("Notification was cancelled"))
                    .map_err(|e| illegal(record.id, e))?;
                if self.store.update_delivery(&record, expected).await? {
                    cancelled += 1;
                    break;
                }
                record = self.record(record.id).await?;
            }
        }

        info!(notification_id = %notification_id, cancelled, "Notification cancelled");
        Ok(cancelled)
    }

    /// Mark a notification opened by `user_id`. Returns `false` when it was
    /// already marked. Only recipients of the notification can mark it.
    pub async fn mark_seen(&self, user_id: UserId, notification_id: NotificationId) -> AppResult<bool> {
        self.notification(notification_id).await?;
        let is_recipient = self
            .store
            .list_deliveries(notification_id)
            .await?
            .iter()
            .any(|r| r.user_id == user_id);
        if !is_recipient {
            return Err(AppError::not_found(format!(
                "User {user_id} is not a recipient of notification {notification_id}"
            )));
        }

        let inserted = self
            .store
            .insert_seen(&SeenRecord::now(notification_id, user_id))
            .await?;
        if inserted {
            debug!(notification_id = %notification_id, user_id = %user_id, "Marked seen");
        }
        Ok(inserted)
    }

    /// Number of the user's notifications not yet opened.
    pub async fn unseen_count(&self, user_id: UserId) -> AppResult<u64> {
        self.store.count_unseen(user_id).await
    }

    /// The user's notifications, newest first, with their seen stamp.
    pub async fn notifications_for(&self, user_id: UserId) -> AppResult<Vec<InboxEntry>> {
        self.store.inbox(user_id).await
    }

    /// Every record that has not reached a terminal status.
    pub async fn open_records(&self) -> AppResult<Vec<DeliveryRecord>> {
        self.store.list_open_deliveries().await
    }

    /// Per-channel breakdown of a notification's deliveries.
    pub async fn delivery_status(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<DeliveryStatusReport> {
        self.notification(notification_id).await?;
        let records = self.store.list_deliveries(notification_id).await?;

        let mut channels: BTreeMap<Channel, ChannelBreakdown> = BTreeMap::new();
        for record in &records {
            channels.entry(record.channel).or_default().count(record.status);
        }

        Ok(DeliveryStatusReport {
            notification_id,
            channels,
            records,
        })
    }

    /// Delivery and seen totals for a notification.
    pub async fn stats(&self, notification_id: NotificationId) -> AppResult<NotificationStats> {
        self.notification(notification_id).await?;
        let records = self.store.list_deliveries(notification_id).await?;
        let recipient_ids: BTreeSet<UserId> = records.iter().map(|r| r.user_id).collect();
        let seen = self
            .store
            .list_seen(notification_id)
            .await?
            .iter()
            .filter(|s| recipient_ids.contains(&s.user_id))
            .count();

        let delivered = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Delivered)
            .count();
        let failed = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::FailedPermanent)
            .count();
        let recipients = recipient_ids.len();

        Ok(NotificationStats {
            total: records.len(),
            delivered,
            failed,
            pending: records.len() - delivered - failed,
            recipients,
            seen,
            delivery_rate: percentage(delivered, records.len()),
            seen_rate: percentage(seen, recipients),
        })
    }

    /// Load a notification, failing with `NotFound` when it does not exist.
    pub async fn notification(&self, id: NotificationId) -> AppResult<Notification> {
        self.store
            .get_notification(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Notification {id} not found")))
    }
}
