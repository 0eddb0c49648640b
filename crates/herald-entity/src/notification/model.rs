//! Notification entity model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herald_core::types::NotificationId;

use super::importance::Importance;
use super::intent::{Actor, EntityRef};
use super::key::NotificationKey;
use crate::channel::Channel;

/// A dispatched notification. Created once per dispatch and immutable
/// afterwards except for its scheduling fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: NotificationId,
    /// Policy key the notification was dispatched under.
    pub key: NotificationKey,
    /// Rendered title.
    pub title: String,
    /// Rendered body.
    pub body: String,
    /// Importance.
    pub importance: Importance,
    /// Where the notification links to.
    pub action_url: Option<String>,
    /// Related domain entity.
    pub entity: Option<EntityRef>,
    /// Template data the notification was rendered from.
    pub data: serde_json::Value,
    /// Union of channels targeted across all recipients.
    pub channels: BTreeSet<Channel>,
    /// Who caused the event.
    pub actor: Option<Actor>,
    /// Dedup key, if the producer supplied one.
    pub dedup_key: Option<String>,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
    /// Deliver no earlier than this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the first delivery succeeded.
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Whether deliveries may start at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map(|at| at <= now).unwrap_or(true)
    }
}
