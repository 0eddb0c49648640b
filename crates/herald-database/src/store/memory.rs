//! In-memory notification store for single-node hosts and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_core::types::{DeliveryId, NotificationId, UserId};
use herald_entity::{
    Channel, ChannelPreference, DeliveryRecord, DeliveryStatus, Notification, NotificationKey,
    SeenRecord,
};

use super::{DispatchCreation, InboxEntry, NotificationStore};

#[derive(Debug, Default)]
struct InnerState {
    notifications: HashMap<NotificationId, Notification>,
    deliveries: BTreeMap<DeliveryId, DeliveryRecord>,
    delivery_keys: HashSet<(NotificationId, UserId, Channel)>,
    seen: HashMap<(NotificationId, UserId), SeenRecord>,
    preferences: HashMap<(UserId, NotificationKey), ChannelPreference>,
    /// `(key, dedup_key) -> (notification, recorded at)`
    history: HashMap<(String, String), (NotificationId, DateTime<Utc>)>,
}

/// Notification store backed by a Tokio mutex. Contents are lost on exit.
///
/// Only dedup history is ever purged; notifications, delivery records and
/// seen marks are kept for the life of the process. Use it for tests, the
/// CLI and short-lived single-node hosts; long-running hosts want the
/// PostgreSQL store.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationStore {
    state: Arc<Mutex<InnerState>>,
}

impl MemoryNotificationStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create_dispatch(
        &self,
        notification: &Notification,
        records: &[DeliveryRecord],
    ) -> AppResult<DispatchCreation> {
        let mut state = self.state.lock().await;

        let history_key = notification
            .dedup_key
            .as_ref()
            .map(|dedup| (notification.key.to_string(), dedup.clone()));

        if let Some(key) = &history_key {
            if let Some((existing, _)) = state.history.get(key) {
                debug!(dedup_key = %key.1, existing = %existing, "Dedup key already dispatched");
                return Ok(DispatchCreation::Duplicate(*existing));
            }
        }

        if state.notifications.contains_key(&notification.id) {
            return Err(AppError::conflict(format!(
                "Notification {} already exists",
                notification.id
            )));
        }

        let mut keys = HashSet::with_capacity(records.len());
        for record in records {
            let triple = (record.notification_id, record.user_id, record.channel);
            if record.notification_id != notification.id {
                return Err(AppError::validation(format!(
                    "Delivery {} does not belong to notification {}",
                    record.id, notification.id
                )));
            }
            if !keys.insert(triple) || state.delivery_keys.contains(&triple) {
                return Err(AppError::conflict(format!(
                    "Duplicate delivery for user {} on {}",
                    record.user_id, record.channel
                )));
            }
        }

        if let Some(key) = history_key {
            state
                .history
                .insert(key, (notification.id, notification.created_at));
        }
        state
            .notifications
            .insert(notification.id, notification.clone());
        state.delivery_keys.extend(keys);
        for record in records {
            state.deliveries.insert(record.id, record.clone());
        }

        Ok(DispatchCreation::Created)
    }

    async fn get_notification(&self, id: NotificationId) -> AppResult<Option<Notification>> {
        Ok(self.state.lock().await.notifications.get(&id).cloned())
    }

    async fn mark_notification_sent(
        &self,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let notification = state
            .notifications
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Notification {id} not found")))?;
        notification.sent_at.get_or_insert(at);
        Ok(())
    }

    async fn get_delivery(&self, id: DeliveryId) -> AppResult<Option<DeliveryRecord>> {
        Ok(self.state.lock().await.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<Vec<DeliveryRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state
            .deliveries
            .values()
            .filter(|r| r.notification_id == notification_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.user_id, r.channel));
        Ok(records)
    }

    async fn list_open_deliveries(&self) -> AppResult<Vec<DeliveryRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect())
    }

    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryStatus,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let stored = state
            .deliveries
            .get_mut(&record.id)
            .ok_or_else(|| AppError::not_found(format!("Delivery {} not found", record.id)))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = record.clone();
        Ok(true)
    }

    async fn insert_seen(&self, record: &SeenRecord) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if !state.notifications.contains_key(&record.notification_id) {
            return Err(AppError::not_found(format!(
                "Notification {} not found",
                record.notification_id
            )));
        }
        let key = (record.notification_id, record.user_id);
        if state.seen.contains_key(&key) {
            return Ok(false);
        }
        state.seen.insert(key, record.clone());
        Ok(true)
    }

    async fn list_seen(&self, notification_id: NotificationId) -> AppResult<Vec<SeenRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .seen
            .values()
            .filter(|s| s.notification_id == notification_id)
            .cloned()
            .collect())
    }

    async fn inbox(&self, user_id: UserId) -> AppResult<Vec<InboxEntry>> {
        let state = self.state.lock().await;
        let ids: HashSet<NotificationId> = state
            .delivery_keys
            .iter()
            .filter(|(_, user, _)| *user == user_id)
            .map(|(notification, _, _)| *notification)
            .collect();

        let mut entries: Vec<InboxEntry> = ids
            .into_iter()
            .filter_map(|id| state.notifications.get(&id))
            .map(|notification| InboxEntry {
                seen_at: state
                    .seen
                    .get(&(notification.id, user_id))
                    .map(|s| s.seen_at),
                notification: notification.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.notification
                .created_at
                .cmp(&a.notification.created_at)
                .then_with(|| b.notification.id.cmp(&a.notification.id))
        });
        Ok(entries)
    }

    async fn count_unseen(&self, user_id: UserId) -> AppResult<u64> {
        let state = self.state.lock().await;
        let ids: HashSet<NotificationId> = state
            .delivery_keys
            .iter()
            .filter(|(_, user, _)| *user == user_id)
            .map(|(notification, _, _)| *notification)
            .collect();
        Ok(ids
            .iter()
            .filter(|id| !state.seen.contains_key(&(**id, user_id)))
            .count() as u64)
    }

    async fn get_preference(
        &self,
        user_id: UserId,
        key: &NotificationKey,
    ) -> AppResult<Option<ChannelPreference>> {
        let state = self.state.lock().await;
        Ok(state.preferences.get(&(user_id, key.clone())).cloned())
    }

    async fn upsert_preference(&self, preference: &ChannelPreference) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.preferences.insert(
            (preference.user_id, preference.key.clone()),
            preference.clone(),
        );
        Ok(())
    }

    async fn purge_dispatch_history(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|_, (_, recorded)| *recorded >= cutoff);
        Ok((before - state.history.len()) as u64)
    }
}
