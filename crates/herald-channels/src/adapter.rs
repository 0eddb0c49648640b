//! The uniform transport contract.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use herald_core::types::{NotificationId, UserId};
use herald_entity::{Channel, DeliveryError, DeliveryRecord, Importance, Notification};

/// Everything a transport needs to deliver one record, before validation.
#[derive(Debug, Clone)]
pub struct DeliveryPayload {
    /// Notification being delivered.
    pub notification_id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Raw address as stored on the delivery record.
    pub destination: Option<String>,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Link target.
    pub action_url: Option<String>,
    /// Importance.
    pub importance: Importance,
    /// Template data, forwarded to transports that carry structured data.
    pub data: serde_json::Value,
}

impl DeliveryPayload {
    /// Build the payload for `record` of `notification`.
    pub fn for_record(notification: &Notification, record: &DeliveryRecord) -> Self {
        Self {
            notification_id: notification.id,
            user_id: record.user_id,
            destination: record.destination.clone(),
            title: notification.title.clone(),
            body: notification.body.clone(),
            action_url: notification.action_url.clone(),
            importance: notification.importance,
            data: notification.data.clone(),
        }
    }

    /// The destination, or a validation error naming the missing contact.
    pub fn require_destination(&self, what: &str) -> Result<&str, DeliveryError> {
        self.destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                DeliveryError::validation(
                    "MISSING_CONTACT",
                    format!("user {} has no {what}", self.user_id),
                )
            })
    }
}

/// A payload that passed validation: normalized destination and content
/// already cut to the transport's limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Notification being delivered.
    pub notification_id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Normalized address.
    pub destination: String,
    /// Truncated title.
    pub title: String,
    /// Truncated body.
    pub body: String,
    /// Link target.
    pub action_url: Option<String>,
    /// Importance.
    pub importance: Importance,
    /// Template data.
    pub data: serde_json::Value,
}

impl OutboundMessage {
    /// Carry the payload's content over to a normalized destination.
    pub fn from_payload(
        payload: &DeliveryPayload,
        destination: String,
        title: String,
        body: String,
    ) -> Self {
        Self {
            notification_id: payload.notification_id,
            user_id: payload.user_id,
            destination,
            title,
            body,
            action_url: payload.action_url.clone(),
            importance: payload.importance,
            data: payload.data.clone(),
        }
    }
}

/// A delivery transport.
///
/// `prepare` runs before the rate limiter so malformed contact data never
/// consumes quota. `send` performs the transport call; callers go through
/// [`ChannelAdapter::deliver`], which bounds it by [`ChannelAdapter::timeout`].
#[async_trait]
pub trait ChannelAdapter: Send + Sync + std::fmt::Debug {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Upper bound for one transport call.
    fn timeout(&self) -> Duration;

    /// Validate and normalize the destination, truncate content.
    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError>;

    /// Perform the transport call.
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;

    /// `send` bounded by the adapter's timeout. An elapsed timeout is
    /// always retryable.
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let limit = self.timeout();
        match tokio::time::timeout(limit, self.send(message)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    channel = %self.channel(),
                    notification_id = %message.notification_id,
                    timeout_ms = limit.as_millis() as u64,
                    "Transport call timed out"
                );
                Err(DeliveryError::timeout(limit))
            }
        }
    }
}
