//! PostgreSQL notification store.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use herald_core::error::{AppError, ErrorKind};
use herald_core::result::AppResult;
use herald_core::types::{DeliveryId, NotificationId, UserId};
use herald_entity::{
    Channel, ChannelPreference, DeliveryRecord, DeliveryStatus, EntityRef, Notification,
    NotificationKey, SeenRecord,
};

use super::{DispatchCreation, InboxEntry, NotificationStore};

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

fn decode_err(context: &str, detail: impl std::fmt::Display) -> AppError {
    AppError::database(format!("{context}: {detail}"))
}

fn parse_channels(values: Vec<String>) -> AppResult<BTreeSet<Channel>> {
    values
        .iter()
        .map(|v| v.parse::<Channel>().map_err(|e| decode_err("Bad channel", e)))
        .collect()
}

fn channel_names(channels: &BTreeSet<Channel>) -> Vec<String> {
    channels.iter().map(|c| c.as_str().to_string()).collect()
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    notification_key: String,
    title: String,
    body: String,
    importance: String,
    action_url: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<String>,
    data: Value,
    channels: Vec<String>,
    actor: Option<Value>,
    dedup_key: Option<String>,
    created_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let entity = match (row.entity_type, row.entity_id) {
            (Some(entity_type), Some(entity_id)) => Some(EntityRef {
                entity_type,
                entity_id,
            }),
            _ => None,
        };
        Ok(Self {
            id: row.id.into(),
            key: row
                .notification_key
                .parse()
                .map_err(|e| decode_err("Bad notification key", e))?,
            title: row.title,
            body: row.body,
            importance: row
                .importance
                .parse()
                .map_err(|e| decode_err("Bad importance", e))?,
            action_url: row.action_url,
            entity,
            data: row.data,
            channels: parse_channels(row.channels)?,
            actor: row.actor.map(serde_json::from_value).transpose()?,
            dedup_key: row.dedup_key,
            created_at: row.created_at,
            scheduled_at: row.scheduled_at,
            sent_at: row.sent_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeliveryRow {
    id: Uuid,
    notification_id: Uuid,
    user_id: Uuid,
    channel: String,
    destination: Option<String>,
    status: String,
    attempts: i32,
    last_error: Option<Value>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = AppError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            notification_id: row.notification_id.into(),
            user_id: row.user_id.into(),
            channel: row
                .channel
                .parse()
                .map_err(|e| decode_err("Bad channel", e))?,
            destination: row.destination,
            status: row
                .status
                .parse()
                .map_err(|e| decode_err("Bad delivery status", e))?,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error.map(serde_json::from_value).transpose()?,
            created_at: row.created_at,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            failed_at: row.failed_at,
            next_retry_at: row.next_retry_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PreferenceRow {
    user_id: Uuid,
    notification_key: String,
    enabled: Option<Vec<String>>,
    disabled: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferenceRow> for ChannelPreference {
    type Error = AppError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id.into(),
            key: row
                .notification_key
                .parse()
                .map_err(|e| decode_err("Bad notification key", e))?,
            enabled: row.enabled.map(parse_channels).transpose()?,
            disabled: parse_channels(row.disabled)?,
            updated_at: row.updated_at,
        })
    }
}

const DELIVERY_COLUMNS: &str = "id, notification_id, user_id, channel, destination, status, \
     attempts, last_error, created_at, sent_at, delivered_at, failed_at, next_retry_at, updated_at";

/// Notification store over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    /// Create a store on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create_dispatch(
        &self,
        notification: &Notification,
        records: &[DeliveryRecord],
    ) -> AppResult<DispatchCreation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin dispatch transaction"))?;

        let key = notification.key.to_string();

        if let Some(dedup_key) = &notification.dedup_key {
            let inserted = sqlx::query(
                "INSERT INTO dispatch_history (notification_key, dedup_key, notification_id, created_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(&key)
            .bind(dedup_key)
            .bind(notification.id)
            .bind(notification.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to record dispatch history"))?
            .rows_affected();

            if inserted == 0 {
                let existing: Uuid = sqlx::query_scalar(
                    "SELECT notification_id FROM dispatch_history \
                     WHERE notification_key = $1 AND dedup_key = $2",
                )
                .bind(&key)
                .bind(dedup_key)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err("Failed to read dispatch history"))?;
                tx.rollback()
                    .await
                    .map_err(db_err("Failed to roll back dispatch"))?;
                debug!(dedup_key = %dedup_key, existing = %existing, "Dedup key already dispatched");
                return Ok(DispatchCreation::Duplicate(existing.into()));
            }
        }

        let actor = notification.actor.map(serde_json::to_value).transpose()?;
        sqlx::query(
            "INSERT INTO notifications (id, notification_key, title, body, importance, action_url, \
             entity_type, entity_id, data, channels, actor, dedup_key, created_at, scheduled_at, sent_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(notification.id)
        .bind(&key)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.importance.as_str())
        .bind(&notification.action_url)
        .bind(notification.entity.as_ref().map(|e| e.entity_type.as_str()))
        .bind(notification.entity.as_ref().map(|e| e.entity_id.as_str()))
        .bind(&notification.data)
        .bind(channel_names(&notification.channels))
        .bind(actor)
        .bind(&notification.dedup_key)
        .bind(notification.created_at)
        .bind(notification.scheduled_at)
        .bind(notification.sent_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => AppError::conflict(format!(
                "Notification {} already exists",
                notification.id
            )),
            _ => AppError::with_source(ErrorKind::Database, "Failed to insert notification", e),
        })?;

        for record in records {
            let last_error = record.last_error.as_ref().map(serde_json::to_value).transpose()?;
            sqlx::query(&format!(
                "INSERT INTO delivery_records ({DELIVERY_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ))
            .bind(record.id)
            .bind(record.notification_id)
            .bind(record.user_id)
            .bind(record.channel.as_str())
            .bind(&record.destination)
            .bind(record.status.as_str())
            .bind(record.attempts as i32)
            .bind(last_error)
            .bind(record.created_at)
            .bind(record.sent_at)
            .bind(record.delivered_at)
            .bind(record.failed_at)
            .bind(record.next_retry_at)
            .bind(record.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => AppError::conflict(format!(
                    "Duplicate delivery for user {} on {}",
                    record.user_id, record.channel
                )),
                _ => AppError::with_source(ErrorKind::Database, "Failed to insert delivery", e),
            })?;
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit dispatch"))?;
        Ok(DispatchCreation::Created)
    }

    async fn get_notification(&self, id: NotificationId) -> AppResult<Option<Notification>> {
        sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to load notification"))?
            .map(Notification::try_from)
            .transpose()
    }

    async fn mark_notification_sent(
        &self,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET sent_at = COALESCE(sent_at, $2) WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to stamp notification sent_at"))?;
        Ok(())
    }

    async fn get_delivery(&self, id: DeliveryId) -> AppResult<Option<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to load delivery"))?
        .map(DeliveryRecord::try_from)
        .transpose()
    }

    async fn list_deliveries(
        &self,
        notification_id: NotificationId,
    ) -> AppResult<Vec<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery_records \
             WHERE notification_id = $1 ORDER BY user_id, channel"
        ))
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list deliveries"))?
        .into_iter()
        .map(DeliveryRecord::try_from)
        .collect()
    }

    async fn list_open_deliveries(&self) -> AppResult<Vec<DeliveryRecord>> {
        sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery_records \
             WHERE status NOT IN ('DELIVERED', 'FAILED_PERMANENT') ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list open deliveries"))?
        .into_iter()
        .map(DeliveryRecord::try_from)
        .collect()
    }

    async fn update_delivery(
        &self,
        record: &DeliveryRecord,
        expected: DeliveryStatus,
    ) -> AppResult<bool> {
        let last_error = record.last_error.as_ref().map(serde_json::to_value).transpose()?;
        let updated = sqlx::query(
            "UPDATE delivery_records SET status = $2, attempts = $3, last_error = $4, \
             sent_at = $5, delivered_at = $6, failed_at = $7, next_retry_at = $8, updated_at = $9 \
             WHERE id = $1 AND status = $10",
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.attempts as i32)
        .bind(last_error)
        .bind(record.sent_at)
        .bind(record.delivered_at)
        .bind(record.failed_at)
        .bind(record.next_retry_at)
        .bind(record.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to update delivery"))?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }
        match self.get_delivery(record.id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::not_found(format!(
                "Delivery {} not found",
                record.id
            ))),
        }
    }

    async fn insert_seen(&self, record: &SeenRecord) -> AppResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO seen_records (notification_id, user_id, seen_at) VALUES ($1, $2, $3) \
             ON CONFLICT (notification_id, user_id) DO NOTHING",
        )
        .bind(record.notification_id)
        .bind(record.user_id)
        .bind(record.seen_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_foreign_key_violation() => AppError::not_found(format!(
                "Notification {} not found",
                record.notification_id
            )),
            _ => AppError::with_source(ErrorKind::Database, "Failed to mark seen", e),
        })?
        .rows_affected();
        Ok(inserted == 1)
    }

    async fn list_seen(&self, notification_id: NotificationId) -> AppResult<Vec<SeenRecord>> {
        let rows: Vec<(Uuid, Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT notification_id, user_id, seen_at FROM seen_records WHERE notification_id = $1",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list seen records"))?;

        Ok(rows
            .into_iter()
            .map(|(notification_id, user_id, seen_at)| SeenRecord {
                notification_id: notification_id.into(),
                user_id: user_id.into(),
                seen_at,
            })
            .collect())
    }

    async fn inbox(&self, user_id: UserId) -> AppResult<Vec<InboxEntry>> {
        #[derive(FromRow)]
        struct InboxRow {
            #[sqlx(flatten)]
            notification: NotificationRow,
            seen_at: Option<DateTime<Utc>>,
        }

        let rows = sqlx::query_as::<_, InboxRow>(
            "SELECT n.*, s.seen_at FROM notifications n \
             JOIN (SELECT DISTINCT notification_id FROM delivery_records WHERE user_id = $1) d \
               ON d.notification_id = n.id \
             LEFT JOIN seen_records s ON s.notification_id = n.id AND s.user_id = $1 \
             ORDER BY n.created_at DESC, n.id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to load inbox"))?;

        rows.into_iter()
            .map(|row| {
                Ok(InboxEntry {
                    notification: row.notification.try_into()?,
                    seen_at: row.seen_at,
                })
            })
            .collect()
    }

    async fn count_unseen(&self, user_id: UserId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT d.notification_id) FROM delivery_records d \
             LEFT JOIN seen_records s ON s.notification_id = d.notification_id AND s.user_id = d.user_id \
             WHERE d.user_id = $1 AND s.seen_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to count unseen"))?;
        Ok(count.max(0) as u64)
    }

    async fn get_preference(
        &self,
        user_id: UserId,
        key: &NotificationKey,
    ) -> AppResult<Option<ChannelPreference>> {
        sqlx::query_as::<_, PreferenceRow>(
            "SELECT user_id, notification_key, enabled, disabled, updated_at \
             FROM channel_preferences WHERE user_id = $1 AND notification_key = $2",
        )
        .bind(user_id)
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to load preference"))?
        .map(ChannelPreference::try_from)
        .transpose()
    }

    async fn upsert_preference(&self, preference: &ChannelPreference) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO channel_preferences (user_id, notification_key, enabled, disabled, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, notification_key) DO UPDATE \
             SET enabled = EXCLUDED.enabled, disabled = EXCLUDED.disabled, updated_at = EXCLUDED.updated_at",
        )
        .bind(preference.user_id)
        .bind(preference.key.to_string())
        .bind(preference.enabled.as_ref().map(channel_names))
        .bind(channel_names(&preference.disabled))
        .bind(preference.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to save preference"))?;
        Ok(())
    }

    async fn purge_dispatch_history(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let removed = sqlx::query("DELETE FROM dispatch_history WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to purge dispatch history"))?
            .rows_affected();
        Ok(removed)
    }
}
