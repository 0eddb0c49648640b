//! Dispatch results.

use std::collections::BTreeMap;

use serde::Serialize;

use herald_core::types::{DeliveryId, NotificationId, UserId};
use herald_entity::Channel;

/// A channel the recipient would have received but that was not submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChannel {
    pub channel: Channel,
    pub reason: String,
}

/// What was submitted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientOutcome {
    pub user_id: UserId,
    /// Delivery record created per submitted channel.
    pub submitted: BTreeMap<Channel, DeliveryId>,
    pub skipped: Vec<SkippedChannel>,
}

/// Returned by a dispatch once its deliveries are queued. Delivery itself
/// is asynchronous; poll the delivery status for completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    /// The new notification, or the existing one for a duplicate.
    pub notification_id: NotificationId,
    /// The dedup key was already dispatched; nothing new was created.
    pub duplicate: bool,
    pub recipients: Vec<RecipientOutcome>,
}

impl DispatchResult {
    /// Result for a dedup hit.
    pub fn duplicate(notification_id: NotificationId) -> Self {
        Self {
            notification_id,
            duplicate: true,
            recipients: Vec::new(),
        }
    }

    /// Number of delivery records submitted.
    pub fn submitted_count(&self) -> usize {
        self.recipients.iter().map(|r| r.submitted.len()).sum()
    }

    /// Every delivery record created, in recipient order.
    pub fn delivery_ids(&self) -> impl Iterator<Item = DeliveryId> + '_ {
        self.recipients
            .iter()
            .flat_map(|r| r.submitted.values().copied())
    }
}
