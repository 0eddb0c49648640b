//! Registry of open in-app sockets, indexed by user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use herald_core::config::channels::InAppChannelConfig;
use herald_core::types::{NotificationId, UserId};
use herald_entity::Importance;

use crate::adapter::OutboundMessage;

/// Identifies one open socket.
pub type SubscriptionId = Uuid;

/// Frame pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InAppMessage {
    /// Notification id, used by the client to mark it seen.
    pub notification_id: NotificationId,
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Link target.
    pub action_url: Option<String>,
    /// Importance.
    pub importance: Importance,
    /// When the frame was published.
    pub published_at: DateTime<Utc>,
}

impl From<&OutboundMessage> for InAppMessage {
    fn from(message: &OutboundMessage) -> Self {
        Self {
            notification_id: message.notification_id,
            title: message.title.clone(),
            body: message.body.clone(),
            action_url: message.action_url.clone(),
            importance: message.importance,
            published_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::Sender<InAppMessage>,
}

/// Thread-safe map of user to open sockets. The web layer owns the socket
/// itself and forwards whatever arrives on the receiver.
#[derive(Debug)]
pub struct InAppHub {
    by_user: DashMap<UserId, Vec<Arc<Subscriber>>>,
    buffer: usize,
    max_per_user: usize,
}

impl InAppHub {
    /// An empty hub.
    pub fn new(config: &InAppChannelConfig) -> Self {
        Self {
            by_user: DashMap::new(),
            buffer: config.connection_buffer.max(1),
            max_per_user: config.max_connections_per_user.max(1),
        }
    }

    /// Open a socket for `user_id`. The oldest socket is dropped when the
    /// user is already at the connection limit.
    pub fn subscribe(&self, user_id: UserId) -> (SubscriptionId, mpsc::Receiver<InAppMessage>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let subscriber = Arc::new(Subscriber {
            id: Uuid::new_v4(),
            sender,
        });
        let id = subscriber.id;

        let mut sockets = self.by_user.entry(user_id).or_default();
        if sockets.len() >= self.max_per_user {
            warn!(
                user_id = %user_id,
                max = self.max_per_user,
                "User at max in-app connections, dropping oldest"
            );
            sockets.remove(0);
        }
        sockets.push(subscriber);
        (id, receiver)
    }

    /// Close a socket.
    pub fn unsubscribe(&self, user_id: UserId, id: SubscriptionId) {
        if let Some(mut sockets) = self.by_user.get_mut(&user_id) {
            sockets.retain(|s| s.id != id);
            if sockets.is_empty() {
                drop(sockets);
                self.by_user.remove_if(&user_id, |_, v| v.is_empty());
            }
        }
    }

    /// Push `message` to every open socket of `user_id`. Returns how many
    /// sockets accepted it. Closed sockets are pruned, full ones skipped.
    pub fn publish(&self, user_id: UserId, message: InAppMessage) -> usize {
        let Some(mut sockets) = self.by_user.get_mut(&user_id) else {
            return 0;
        };

        let mut reached = 0;
        sockets.retain(|socket| match socket.sender.try_send(message.clone()) {
            Ok(()) => {
                reached += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id = %user_id, socket = %socket.id, "In-app buffer full, frame dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id = %user_id, socket = %socket.id, "Pruning closed in-app socket");
                false
            }
        });
        reached
    }

    /// Number of open sockets for `user_id`.
    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.by_user.get(&user_id).map(|s| s.len()).unwrap_or(0)
    }
}
