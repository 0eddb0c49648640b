//! Notification importance levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Importance of a notification, carried to transports that support it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Importance {
    /// Background information.
    Low,
    /// Standard events.
    #[default]
    Normal,
    /// Important events.
    High,
    /// Requires immediate attention.
    Urgent,
}

impl Importance {
    /// Upper-case storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    /// Priority hint understood by push gateways.
    pub fn push_priority(&self) -> &'static str {
        match self {
            Self::High | Self::Urgent => "high",
            Self::Low | Self::Normal => "normal",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("unknown importance '{other}'")),
        }
    }
}
