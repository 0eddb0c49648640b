//! Delivery channel enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A delivery transport. The set is closed: each variant has exactly one
/// adapter implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// In-app socket delivery.
    #[serde(rename = "IN_APP")]
    InApp,
    /// Mobile push notification.
    #[serde(rename = "PUSH")]
    Push,
    /// WhatsApp-style chat message.
    #[serde(rename = "WHATSAPP")]
    WhatsApp,
    /// Email over SMTP.
    #[serde(rename = "EMAIL")]
    Email,
    /// SMS text message.
    #[serde(rename = "SMS")]
    Sms,
}

impl Channel {
    /// Every channel, in a stable order.
    pub const ALL: [Channel; 5] = [
        Self::InApp,
        Self::Push,
        Self::WhatsApp,
        Self::Email,
        Self::Sms,
    ];

    /// Wire/storage name, e.g. `"IN_APP"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "IN_APP",
            Self::Push => "PUSH",
            Self::WhatsApp => "WHATSAPP",
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
        }
    }

    /// Lower-case name used as a configuration key, e.g. `"in_app"`.
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Push => "push",
            Self::WhatsApp => "whatsapp",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a channel name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}'")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    /// Accepts storage names and configuration names in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "in_app" | "inapp" | "socket" => Ok(Self::InApp),
            "push" => Ok(Self::Push),
            "whatsapp" | "chat" => Ok(Self::WhatsApp),
            "email" | "mail" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}
