//! Dispatch policies: per-key channel, audience and content rules.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::Channel;
use crate::notification::{Importance, NotificationKey};

/// Who receives a notification when the intent carries no explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AudienceRule {
    /// Only the intent's explicit recipients.
    Explicit,
    /// Users assigned to the related entity.
    Assignees,
    /// Every user holding the named role.
    Role(String),
    /// Every user in the named sector.
    Sector(String),
}

impl fmt::Display for AudienceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("explicit"),
            Self::Assignees => f.write_str("assignees"),
            Self::Role(role) => write!(f, "role:{role}"),
            Self::Sector(sector) => write!(f, "sector:{sector}"),
        }
    }
}

impl FromStr for AudienceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some(("role", name)) if !name.is_empty() => Ok(Self::Role(name.to_string())),
            Some(("sector", name)) if !name.is_empty() => Ok(Self::Sector(name.to_string())),
            None if s == "explicit" => Ok(Self::Explicit),
            None if s == "assignees" => Ok(Self::Assignees),
            _ => Err(format!(
                "unknown audience rule '{s}' (expected explicit, assignees, role:<name> or sector:<name>)"
            )),
        }
    }
}

impl TryFrom<String> for AudienceRule {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AudienceRule> for String {
    fn from(rule: AudienceRule) -> Self {
        rule.to_string()
    }
}

/// Title/body/action-URL templates with `{field}` placeholders and the
/// data fields a dispatch must supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTemplate {
    /// Title template.
    pub title: String,
    /// Body template.
    pub body: String,
    /// Action URL template.
    #[serde(default)]
    pub action_url: Option<String>,
    /// Fields that must be present in the intent's template data.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl ContentTemplate {
    /// Required fields absent from `data` (null counts as absent).
    pub fn missing_fields(&self, data: &Map<String, Value>) -> Vec<&str> {
        self.required_fields
            .iter()
            .filter(|field| data.get(field.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect()
    }
}

/// The resolved rules for one notification key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPolicy {
    /// The key this policy answers for.
    pub key: NotificationKey,
    /// Channels that are always used and cannot be disabled.
    pub mandatory_channels: BTreeSet<Channel>,
    /// Channels used unless the user opts out.
    pub optional_channels: BTreeSet<Channel>,
    /// Audience when the intent has no explicit recipients.
    pub audience: AudienceRule,
    /// Importance stamped on the notification.
    pub importance: Importance,
    /// Content templates and data contract.
    pub template: ContentTemplate,
}

impl DispatchPolicy {
    /// Every channel the policy can ever target.
    pub fn all_channels(&self) -> BTreeSet<Channel> {
        self.mandatory_channels
            .union(&self.optional_channels)
            .copied()
            .collect()
    }

    /// Whether `channel` cannot be disabled.
    pub fn is_mandatory(&self, channel: Channel) -> bool {
        self.mandatory_channels.contains(&channel)
    }
}
