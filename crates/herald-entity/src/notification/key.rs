//! `<notification-type>.<event>` policy keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies a dispatch policy: a notification type plus the event that
/// fired, written as `"item.out_of_stock"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotificationKey {
    /// Notification type, e.g. `"item"`.
    pub notification_type: String,
    /// Event within the type, e.g. `"out_of_stock"`.
    pub event: String,
}

impl NotificationKey {
    /// Build a key from its parts.
    pub fn new(notification_type: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            notification_type: notification_type.into(),
            event: event.into(),
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.notification_type, self.event)
    }
}

impl FromStr for NotificationKey {
    type Err = String;

    /// Splits on the first `.`; both halves must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((kind, event)) if !kind.is_empty() && !event.is_empty() => {
                Ok(Self::new(kind, event))
            }
            _ => Err(format!(
                "notification key '{s}' must have the form '<type>.<event>'"
            )),
        }
    }
}

impl TryFrom<String> for NotificationKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NotificationKey> for String {
    fn from(key: NotificationKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_dot() {
        let key: NotificationKey = "item.out_of_stock".parse().unwrap();
        assert_eq!(key.notification_type, "item");
        assert_eq!(key.event, "out_of_stock");

        let nested: NotificationKey = "ppe.delivery.pending".parse().unwrap();
        assert_eq!(nested.notification_type, "ppe");
        assert_eq!(nested.event, "delivery.pending");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("item".parse::<NotificationKey>().is_err());
        assert!(".event".parse::<NotificationKey>().is_err());
        assert!("item.".parse::<NotificationKey>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let key = NotificationKey::new("task", "overdue");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"task.overdue\"");
        let back: NotificationKey = serde_json::from_str("\"task.overdue\"").unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<NotificationKey>("\"broken\"").is_err());
    }
}
