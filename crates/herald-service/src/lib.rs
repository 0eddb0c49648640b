//! # herald-service
//!
//! Services sitting between the dispatcher and the store. Each service
//! takes its collaborators at construction time as `Arc` references.
//!
//! - [`PolicyResolver`]: notification key to dispatch policy.
//! - [`PreferenceService`]: effective channel set per user.
//! - [`DeliveryTracker`]: the only writer of delivery and seen records.
//! - [`AudienceProvider`]: who belongs to a role, sector or assignment.
//! - [`formatter`]: `{field}` template rendering.

pub mod audience;
pub mod formatter;
pub mod policy;
pub mod preference;
pub mod tracker;

pub use audience::{AudienceProvider, StaticAudienceProvider};
pub use formatter::RenderedContent;
pub use policy::PolicyResolver;
pub use preference::{PreferenceService, effective_channels};
pub use tracker::{ChannelBreakdown, DeliveryStatusReport, DeliveryTracker, NotificationStats};
