//! Notification domain entities.

pub mod importance;
pub mod intent;
pub mod key;
pub mod model;

pub use importance::Importance;
pub use intent::{Actor, ContentOverrides, EntityRef, NotificationIntent, daily_dedup_key};
pub use key::NotificationKey;
pub use model::Notification;
