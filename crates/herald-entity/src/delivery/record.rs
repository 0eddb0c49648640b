//! Delivery record model and its transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herald_core::types::{DeliveryId, NotificationId, UserId};

use super::error::DeliveryError;
use super::status::DeliveryStatus;
use crate::channel::Channel;

/// Raised when a transition is not allowed from the record's current status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal delivery transition {from} -> {to}")]
pub struct IllegalTransition {
    /// Status the record was in.
    pub from: DeliveryStatus,
    /// Status that was requested.
    pub to: DeliveryStatus,
}

/// One delivery of a notification to one user over one channel.
///
/// Unique per `(notification_id, user_id, channel)`. Only the delivery
/// tracker mutates records, always through the transition methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Record identifier.
    pub id: DeliveryId,
    /// Owning notification.
    pub notification_id: NotificationId,
    /// Recipient.
    pub user_id: UserId,
    /// Transport.
    pub channel: Channel,
    /// Resolved address on the channel (email, phone, device token, user id).
    pub destination: Option<String>,
    /// Current status.
    pub status: DeliveryStatus,
    /// Transport attempts made so far.
    pub attempts: u32,
    /// Most recent classified failure.
    pub last_error: Option<DeliveryError>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the latest attempt was handed to the transport.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the transport accepted the message.
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the latest failure happened.
    pub failed_at: Option<DateTime<Utc>>,
    /// When the scheduled retry is due.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// A fresh `PENDING` record.
    pub fn pending(
        notification_id: NotificationId,
        user_id: UserId,
        channel: Channel,
        destination: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeliveryId::new(),
            notification_id,
            user_id,
            channel,
            destination,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            next_retry_at: None,
            updated_at: now,
        }
    }

    /// Whether the record can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: DeliveryStatus) -> Result<(), IllegalTransition> {
        if !self.status.can_transition_to(to) {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `PENDING -> SENT`; counts one attempt.
    pub fn begin_attempt(&mut self) -> Result<(), IllegalTransition> {
        self.transition(DeliveryStatus::Sent)?;
        self.attempts += 1;
        self.sent_at = Some(self.updated_at);
        self.next_retry_at = None;
        Ok(())
    }

    /// `SENT -> DELIVERED`.
    pub fn succeed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(DeliveryStatus::Delivered)?;
        self.delivered_at = Some(self.updated_at);
        Ok(())
    }

    /// `SENT -> FAILED`, recording the classified error.
    pub fn fail(&mut self, error: DeliveryError) -> Result<(), IllegalTransition> {
        self.transition(DeliveryStatus::Failed)?;
        self.failed_at = Some(self.updated_at);
        self.last_error = Some(error);
        Ok(())
    }

    /// `FAILED -> RETRYING` or `PENDING -> RETRYING` (deferred by the rate
    /// limiter before any attempt was made).
    pub fn schedule_retry(
        &mut self,
        at: DateTime<Utc>,
        error: Option<DeliveryError>,
    ) -> Result<(), IllegalTransition> {
        self.transition(DeliveryStatus::Retrying)?;
        self.next_retry_at = Some(at);
        if let Some(error) = error {
            self.last_error = Some(error);
        }
        Ok(())
    }

    /// `RETRYING -> PENDING` once the retry is due.
    pub fn requeue(&mut self) -> Result<(), IllegalTransition> {
        self.transition(DeliveryStatus::Pending)?;
        self.next_retry_at = None;
        Ok(())
    }

    /// Any non-terminal status `-> FAILED_PERMANENT`.
    pub fn fail_permanently(&mut self, error: DeliveryError) -> Result<(), IllegalTransition> {
        self.transition(DeliveryStatus::FailedPermanent)?;
        self.failed_at = Some(self.updated_at);
        self.next_retry_at = None;
        self.last_error = Some(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeliveryRecord {
        DeliveryRecord::pending(
            NotificationId::new(),
            UserId::new(),
            Channel::Push,
            Some("token".into()),
        )
    }

    #[test]
    fn test_successful_attempt() {
        let mut rec = record();
        rec.begin_attempt().unwrap();
        assert_eq!(rec.attempts, 1);
        assert!(rec.sent_at.is_some());
        rec.succeed().unwrap();
        assert_eq!(rec.status, DeliveryStatus::Delivered);
        assert!(rec.is_terminal());
    }

    #[test]
    fn test_retry_cycle_counts_attempts() {
        let mut rec = record();
        rec.begin_attempt().unwrap();
        rec.fail(DeliveryError::retryable("TIMEOUT", "slow")).unwrap();
        rec.schedule_retry(Utc::now(), None).unwrap();
        assert_eq!(rec.status, DeliveryStatus::Retrying);
        assert!(rec.next_retry_at.is_some());
        rec.requeue().unwrap();
        rec.begin_attempt().unwrap();
        assert_eq!(rec.attempts, 2);
        assert_eq!(rec.last_error.as_ref().unwrap().code, "TIMEOUT");
    }

    #[test]
    fn test_validation_failure_skips_attempt() {
        let mut rec = record();
        rec.fail_permanently(DeliveryError::validation("BAD_TOKEN", "short"))
            .unwrap();
        assert_eq!(rec.status, DeliveryStatus::FailedPermanent);
        assert_eq!(rec.attempts, 0);
    }

    #[test]
    fn test_terminal_rejects_changes() {
        let mut rec = record();
        rec.fail_permanently(DeliveryError::superseded("cancelled"))
            .unwrap();
        let err = rec.begin_attempt().unwrap_err();
        assert_eq!(err.from, DeliveryStatus::FailedPermanent);
        assert_eq!(err.to, DeliveryStatus::Sent);
        assert_eq!(rec.attempts, 0);
    }
}
