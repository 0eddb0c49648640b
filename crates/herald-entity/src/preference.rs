//! Per-user channel preferences.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use herald_core::types::UserId;

use crate::channel::Channel;
use crate::notification::NotificationKey;

/// A user's stored channel choice for one notification key.
///
/// `enabled`, when present, is the exact optional set the user picked and
/// takes precedence over `disabled`. Mandatory channels are never stored
/// here; they come from the policy at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreference {
    /// Owner.
    pub user_id: UserId,
    /// Notification key the preference applies to.
    pub key: NotificationKey,
    /// Explicit enabled optional channels.
    #[serde(default)]
    pub enabled: Option<BTreeSet<Channel>>,
    /// Optional channels the user turned off.
    #[serde(default)]
    pub disabled: BTreeSet<Channel>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl ChannelPreference {
    /// A preference that disables the given channels.
    pub fn disabling(
        user_id: UserId,
        key: NotificationKey,
        disabled: impl IntoIterator<Item = Channel>,
    ) -> Self {
        Self {
            user_id,
            key,
            enabled: None,
            disabled: disabled.into_iter().collect(),
            updated_at: Utc::now(),
        }
    }

    /// A preference that enables exactly the given optional channels.
    pub fn enabling(
        user_id: UserId,
        key: NotificationKey,
        enabled: impl IntoIterator<Item = Channel>,
    ) -> Self {
        Self {
            user_id,
            key,
            enabled: Some(enabled.into_iter().collect()),
            disabled: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }
}

/// What a settings screen shows for one user and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceView {
    /// Notification key.
    pub key: NotificationKey,
    /// Read-only channels inherited from the policy.
    pub mandatory: BTreeSet<Channel>,
    /// Optional channels the user can toggle.
    pub optional: BTreeSet<Channel>,
    /// Channels that will actually be used.
    pub effective: BTreeSet<Channel>,
}
