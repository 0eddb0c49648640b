//! Dispatch policy entries supplied through configuration.
//!
//! Channel names, importance, and audience are kept as plain strings here;
//! they are parsed into typed values by the policy resolver, which reports
//! unknown names as configuration errors.

use serde::{Deserialize, Serialize};

/// One dispatch policy, keyed by `"<notification-type>.<event>"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy key, e.g. `"item.out_of_stock"`.
    pub key: String,
    /// Channels that are always delivered.
    #[serde(default)]
    pub mandatory_channels: Vec<String>,
    /// Optional channels enabled unless the user opts out.
    #[serde(default)]
    pub optional_channels: Vec<String>,
    /// Importance: `low`, `normal`, `high`, `urgent`.
    #[serde(default)]
    pub importance: Option<String>,
    /// Audience rule: `explicit`, `assignees`, `role:<name>`, `sector:<name>`.
    #[serde(default)]
    pub audience: Option<String>,
    /// Title template with `{field}` placeholders.
    #[serde(default)]
    pub title: Option<String>,
    /// Body template with `{field}` placeholders.
    #[serde(default)]
    pub body: Option<String>,
    /// Action URL template with `{field}` placeholders.
    #[serde(default)]
    pub action_url: Option<String>,
    /// Template data fields every intent must provide.
    #[serde(default)]
    pub required_fields: Vec<String>,
}
