//! Unified application error types for Herald.
//!
//! Errors that abort an operation (an unknown notification key, a broken
//! template contract, a failed store write) are [`AppError`]s. Failures of
//! a single channel delivery are *not* `AppError`s; they are classified
//! delivery errors owned by `herald-entity` and recorded on the delivery
//! record instead of being propagated.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested resource was not found.
    NotFound,
    /// Input validation failed (malformed intent, template contract violation).
    Validation,
    /// A conflict occurred (illegal state transition, lost concurrent update).
    Conflict,
    /// A rate limit was exceeded.
    RateLimit,
    /// An internal error occurred.
    Internal,
    /// A database error occurred.
    Database,
    /// A configuration error occurred (including unconfigured notification keys).
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An external collaborator (audience provider, transport) failed.
    ExternalService,
    /// The service is temporarily unavailable (e.g. worker pools shut down).
    ServiceUnavailable,
}

impl ErrorKind {
    /// Stable upper-case code, used in log fields and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION",
            Self::Conflict => "CONFLICT",
            Self::RateLimit => "RATE_LIMIT",
            Self::Internal => "INTERNAL",
            Self::Database => "DATABASE",
            Self::Configuration => "CONFIGURATION",
            Self::Serialization => "SERIALIZATION",
            Self::ExternalService => "EXTERNAL_SERVICE",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    /// Whether repeating the same call later may succeed. Configuration
    /// and validation problems never go away on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database | Self::ExternalService | Self::ServiceUnavailable | Self::RateLimit
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unified application error used throughout Herald.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

macro_rules! kind_constructors {
    ($($(#[$doc:meta])* $fn_name:ident => $kind:ident),* $(,)?) => {
        impl AppError {
            $(
                $(#[$doc])*
                pub fn $fn_name(message: impl Into<String>) -> Self {
                    Self::new(ErrorKind::$kind, message)
                }
            )*
        }
    };
}

kind_constructors! {
    /// Missing notification, delivery record or preference.
    not_found => NotFound,
    /// Malformed intent or broken template contract.
    validation => Validation,
    /// Illegal or lost delivery state transition.
    conflict => Conflict,
    /// Invariant broken inside the engine.
    internal => Internal,
    /// Store failure.
    database => Database,
    /// Unknown notification key or bad settings.
    configuration => Configuration,
    /// Worker pools stopped.
    service_unavailable => ServiceUnavailable,
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Internal, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
