//! Persistence contract for the notification engine.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herald_core::result::AppResult;
use herald_core::types::{DeliveryId, NotificationId, UserId};
use herald_entity::{
    ChannelPreference, DeliveryRecord, DeliveryStatus, Notification, NotificationKey, SeenRecord,
};

/// Outcome of [`NotificationStore::create_dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchCreation {
    /// The notification and its delivery records were written.
    Created,
    /// The dedup key was already used; nothing was written.
    Duplicate(NotificationId),
}

/// One notification as seen from a recipient's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    /// The notification.
    pub notification: Notification,
    /// When the user opened it, if they have.
    pub seen_at: Option<DateTime<Utc>>,
}

/// Durable storage for notifications and everything hanging off them.
///
/// Implementations must guarantee:
/// - `create_dispatch` is atomic: the dedup history row, the notification
///   and every delivery record are written together or not at all.
/// - at most one delivery record per `(notification, user, channel)`.
/// - at most one seen record per `(notification, user)`.
/// - `update_delivery` only writes when the stored status still equals
///   `expected`.
#[async_trait]
pub trait NotificationStore: Send + Sync + std::fmt::Debug {
    /// Persist a notification with its delivery records. When
    /// `notification.dedup_key` is set and already recorded for the same
    /// key, nothing is written and the existing id is returned.
    async fn create_dispatch(
        &self,
        notification: &Notification,
        records: &[DeliveryRecord],
    ) -> AppResult<DispatchCreation>;

    /// Fetch a notification.
    async fn get_notification(&self, id: NotificationId) -> AppResult<Option<Notification>>;

    /// Stamp `sent_at` unless it is already set.
    async fn mark_notification_sent(&self, id: NotificationId, at: DateTime<Utc>)
    -> AppResult<()>;

    /// Fetch one delivery record.
    async fn get_delivery(&self, id: DeliveryId) -> AppResult<Option<DeliveryRecord>>;

    /// All delivery records of a notification.
    async fn list_deliveries(&self, notification_id: NotificationId)
    -> AppResult<Vec<DeliveryRecord>>;

    /// Every record not yet `DELIVERED` or `FAILED_PERMANENT`.
    async fn list_open_deliveries(&self) -> AppResult<Vec<DeliveryRecord>>;

    /// Overwrite a record if its stored status is still `expected`.
    /// Returns `false` when another writer got there first.
    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryStatus,
    ) -> AppResult<bool>;

    /// Insert a seen marker. Returns `false` if one already existed.
    async fn insert_seen(&self, record: &SeenRecord) -> AppResult<bool>;

    /// Seen markers of a notification.
    async fn list_seen(&self, notification_id: NotificationId) -> AppResult<Vec<SeenRecord>>;

    /// Notifications the user has a delivery record for, newest first.
    async fn inbox(&self, user_id: UserId) -> AppResult<Vec<InboxEntry>>;

    /// Number of inbox notifications without a seen marker.
    async fn count_unseen(&self, user_id: UserId) -> AppResult<u64>;

    /// Stored preference for a user and key.
    async fn get_preference(
        &self,
        user_id: UserId,
        key: &NotificationKey,
    ) -> AppResult<Option<ChannelPreference>>;

    /// Insert or replace a preference.
    async fn upsert_preference(&self, preference: &ChannelPreference) -> AppResult<()>;

    /// Delete dedup history recorded before `cutoff`. Returns rows removed.
    async fn purge_dispatch_history(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
