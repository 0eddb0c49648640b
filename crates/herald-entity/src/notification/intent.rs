//! The ephemeral input handed to the dispatcher by event producers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use herald_core::types::UserId;

use super::key::NotificationKey;

/// Reference to the domain entity a notification concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type, e.g. `"item"`.
    pub entity_type: String,
    /// Entity identifier as the producer knows it.
    pub entity_id: String,
}

impl EntityRef {
    /// Build an entity reference.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// Who caused the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Actor {
    /// Raised by the system itself (scheduled checks, automations).
    System,
    /// Raised by a user action.
    User(UserId),
}

impl Actor {
    /// The acting user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User(id) => Some(*id),
        }
    }
}

/// Per-field overrides that win over the policy's rendered templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOverrides {
    /// Replacement title.
    #[serde(default)]
    pub title: Option<String>,
    /// Replacement body.
    #[serde(default)]
    pub body: Option<String>,
    /// Replacement action URL.
    #[serde(default)]
    pub action_url: Option<String>,
}

/// Describes what happened and whom it concerns, before audience and
/// channel resolution. Consumed by a single dispatch; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    /// Policy key.
    pub key: NotificationKey,
    /// Related entity.
    #[serde(default)]
    pub entity: Option<EntityRef>,
    /// Template data.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Field overrides.
    #[serde(default)]
    pub overrides: ContentOverrides,
    /// Explicit recipients; bypasses the policy's audience rule.
    #[serde(default)]
    pub recipients: Option<Vec<UserId>>,
    /// Who caused the event.
    #[serde(default)]
    pub actor: Option<Actor>,
    /// Stable key making repeated triggers of the same logical event a no-op.
    #[serde(default)]
    pub dedup_key: Option<String>,
    /// Deliver no earlier than this instant.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NotificationIntent {
    /// Start an intent for the given policy key.
    pub fn new(key: NotificationKey) -> Self {
        Self {
            key,
            entity: None,
            data: Map::new(),
            overrides: ContentOverrides::default(),
            recipients: None,
            actor: None,
            dedup_key: None,
            scheduled_at: None,
        }
    }

    /// Attach the related entity.
    pub fn for_entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity = Some(EntityRef::new(entity_type, entity_id));
        self
    }

    /// Add one template data field.
    pub fn with_data(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.data.insert(field.to_string(), value.into());
        self
    }

    /// Override the rendered title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.overrides.title = Some(title.into());
        self
    }

    /// Override the rendered body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.overrides.body = Some(body.into());
        self
    }

    /// Send to exactly these users.
    pub fn to_recipients(mut self, recipients: Vec<UserId>) -> Self {
        self.recipients = Some(recipients);
        self
    }

    /// Record who caused the event.
    pub fn by(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Use an explicit dedup key.
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Dedup on the related entity and calendar day, so a recurring job
    /// notifies once per entity per day. Without an entity the policy key
    /// stands in for it.
    pub fn deduplicated_daily(mut self, day: NaiveDate) -> Self {
        let subject = match &self.entity {
            Some(entity) => format!("{}-{}", entity.entity_type, entity.entity_id),
            None => self.key.to_string(),
        };
        self.dedup_key = Some(daily_dedup_key(&subject, day));
        self
    }

    /// Deliver no earlier than `at`.
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// Format a `"<subject>:<YYYY-MM-DD>"` dedup key.
pub fn daily_dedup_key(subject: &str, day: NaiveDate) -> String {
    format!("{}:{}", subject, day.format("%Y-%m-%d"))
}
