//! Classified per-delivery failures.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification deciding whether a failed delivery is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Recipient contact data is malformed. Never retried.
    Validation,
    /// Timeout, connection reset, transient 5xx. Retried with backoff.
    RetryableTransport,
    /// Invalid recipient, unregistered account, hard bounce. Never retried.
    PermanentTransport,
    /// Transport or local rate limit. Retried using the suggested delay.
    QuotaExceeded,
    /// The notification was cancelled before delivery finished.
    Superseded,
}

impl ErrorClass {
    /// Whether the retry scheduler may attempt the delivery again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableTransport | Self::QuotaExceeded)
    }

    /// Upper-case storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::RetryableTransport => "RETRYABLE_TRANSPORT",
            Self::PermanentTransport => "PERMANENT_TRANSPORT",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Superseded => "SUPERSEDED",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Validation,
            Self::RetryableTransport,
            Self::PermanentTransport,
            Self::QuotaExceeded,
            Self::Superseded,
        ]
        .into_iter()
        .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown error class '{s}'"))
    }
}

/// A classified delivery failure, stored as the record's last error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{class}] {code}: {message}")]
pub struct DeliveryError {
    /// Classification.
    pub class: ErrorClass,
    /// Short machine-readable code, e.g. `"TIMEOUT"` or `"NOT_REGISTERED"`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
    /// Delay suggested by the transport or rate limiter, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl DeliveryError {
    /// Build an error with the given classification.
    pub fn new(class: ErrorClass, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Malformed contact data.
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, code, message)
    }

    /// Transient transport failure.
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::RetryableTransport, code, message)
    }

    /// Permanent transport failure.
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::PermanentTransport, code, message)
    }

    /// Transport call exceeded its deadline. Always retryable.
    pub fn timeout(after: Duration) -> Self {
        Self::retryable(
            "TIMEOUT",
            format!("transport did not answer within {}ms", after.as_millis()),
        )
    }

    /// Rate limited, optionally with a suggested wait.
    pub fn quota_exceeded(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            ..Self::new(ErrorClass::QuotaExceeded, "QUOTA_EXCEEDED", message)
        }
    }

    /// Cancelled before completion.
    pub fn superseded(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Superseded, "SUPERSEDED", message)
    }

    /// Whether the retry scheduler may attempt the delivery again.
    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }

    /// The suggested wait, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}
