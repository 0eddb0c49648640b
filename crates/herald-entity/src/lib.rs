//! # herald-entity
//!
//! Domain entity models for Herald. Every struct in this crate is either a
//! persisted record (notification, delivery record, seen record, channel
//! preference) or a value object consumed by the dispatcher (intent,
//! policy, recipient). All entities derive `Debug`, `Clone`, `Serialize`,
//! and `Deserialize`.

pub mod channel;
pub mod delivery;
pub mod notification;
pub mod policy;
pub mod preference;
pub mod recipient;
pub mod seen;

pub use channel::Channel;
pub use delivery::{DeliveryError, DeliveryRecord, DeliveryStatus, ErrorClass};
pub use notification::{
    Actor, ContentOverrides, EntityRef, Importance, Notification, NotificationIntent,
    NotificationKey,
};
pub use policy::{AudienceRule, ContentTemplate, DispatchPolicy};
pub use preference::{ChannelPreference, PreferenceView};
pub use recipient::Recipient;
pub use seen::SeenRecord;
