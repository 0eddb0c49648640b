//! Delivery record state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a single (notification, recipient, channel) delivery.
///
/// ```text
/// PENDING ──► SENT ──► DELIVERED
///   │  │        │
///   │  │        └──► FAILED ──► RETRYING ──► PENDING
///   │  └──► RETRYING (rate-limited before any attempt)
///   └──────────────► FAILED_PERMANENT  (reachable from every non-terminal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Waiting for a worker.
    Pending,
    /// Handed to the transport, outcome not yet known.
    Sent,
    /// Transport accepted the message.
    Delivered,
    /// Last attempt failed; the retry decision has not been taken yet.
    Failed,
    /// Waiting for a scheduled retry.
    Retrying,
    /// Will never be attempted again.
    FailedPermanent,
}

impl DeliveryStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [DeliveryStatus; 6] = [
        Self::Pending,
        Self::Sent,
        Self::Delivered,
        Self::Failed,
        Self::Retrying,
        Self::FailedPermanent,
    ];

    /// Whether the record can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::FailedPermanent)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, next) {
            (Delivered | FailedPermanent, _) => false,
            (_, FailedPermanent) => true,
            (Pending, Sent | Retrying) => true,
            (Sent, Delivered | Failed) => true,
            (Failed, Retrying) => true,
            (Retrying, Pending) => true,
            _ => false,
        }
    }

    /// Upper-case storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
            Self::FailedPermanent => "FAILED_PERMANENT",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown delivery status '{s}'"))
    }
}
