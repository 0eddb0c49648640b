//! In-app seen marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herald_core::types::{NotificationId, UserId};

/// Marks a notification opened by a user. At most one per
/// `(notification_id, user_id)`, independent of channel delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    /// The notification that was opened.
    pub notification_id: NotificationId,
    /// Who opened it.
    pub user_id: UserId,
    /// When it was first opened.
    pub seen_at: DateTime<Utc>,
}

impl SeenRecord {
    /// A seen marker stamped now.
    pub fn now(notification_id: NotificationId, user_id: UserId) -> Self {
        Self {
            notification_id,
            user_id,
            seen_at: Utc::now(),
        }
    }
}
