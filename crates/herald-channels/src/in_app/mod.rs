//! In-app socket delivery.

pub mod hub;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use herald_entity::{Channel, DeliveryError};

use crate::adapter::{ChannelAdapter, DeliveryPayload, OutboundMessage};

pub use hub::{InAppHub, InAppMessage, SubscriptionId};

/// Pushes notifications to the recipient's open sockets.
///
/// Best effort: a user with no open socket still counts as delivered.
/// Whether the user actually looked is tracked by seen records.
#[derive(Debug, Clone)]
pub struct InAppAdapter {
    hub: Arc<InAppHub>,
}

impl InAppAdapter {
    /// Adapter publishing to `hub`.
    pub fn new(hub: Arc<InAppHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl ChannelAdapter for InAppAdapter {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
        Ok(OutboundMessage::from_payload(
            payload,
            payload.user_id.to_string(),
            payload.title.clone(),
            payload.body.clone(),
        ))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let reached = self.hub.publish(message.user_id, InAppMessage::from(message));
        debug!(
            notification_id = %message.notification_id,
            user_id = %message.user_id,
            sockets = reached,
            "In-app notification published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use herald_core::config::channels::InAppChannelConfig;
    use herald_core::types::{NotificationId, UserId};
    use herald_entity::Importance;

    use super::*;

    fn payload(user_id: UserId) -> DeliveryPayload {
        DeliveryPayload {
            notification_id: NotificationId::new(),
            user_id,
            destination: None,
            title: "Task assigned".into(),
            body: "You were assigned to Audit".into(),
            action_url: None,
            importance: Importance::Normal,
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_offline_user_still_ok() {
        let adapter = InAppAdapter::new(Arc::new(InAppHub::new(&InAppChannelConfig::default())));
        let message = adapter.prepare(&payload(UserId::new())).unwrap();
        adapter.deliver(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_online_user_receives_message() {
        let hub = Arc::new(InAppHub::new(&InAppChannelConfig::default()));
        let user = UserId::new();
        let (_id, mut rx) = hub.subscribe(user);

        let adapter = InAppAdapter::new(hub);
        let message = adapter.prepare(&payload(user)).unwrap();
        adapter.deliver(&message).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.notification_id, message.notification_id);
        assert_eq!(received.title, "Task assigned");
    }
}
