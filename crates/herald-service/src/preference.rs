//! Effective channel resolution from policy and user preference.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use herald_core::result::AppResult;
use herald_core::types::UserId;
use herald_database::NotificationStore;
use herald_entity::{Channel, ChannelPreference, DispatchPolicy, NotificationKey, PreferenceView};

use crate::policy::PolicyResolver;

/// Channels a user receives for a policy:
/// `mandatory ∪ (optional ∩ enabled)` when the preference lists enabled
/// channels, else `mandatory ∪ (optional − disabled)`.
///
/// Mandatory channels cannot be switched off; a preference naming them is
/// ignored for those channels.
pub fn effective_channels(
    policy: &DispatchPolicy,
    preference: Option<&ChannelPreference>,
) -> BTreeSet<Channel> {
    let optional: BTreeSet<Channel> = match preference {
        None => policy.optional_channels.clone(),
        Some(pref) => match &pref.enabled {
            Some(enabled) => policy
                .optional_channels
                .intersection(enabled)
                .copied()
                .collect(),
            None => policy
                .optional_channels
                .difference(&pref.disabled)
                .copied()
                .collect(),
        },
    };
    policy.mandatory_channels.union(&optional).copied().collect()
}

/// Reads and writes user channel preferences.
#[derive(Debug, Clone)]
pub struct PreferenceService {
    store: Arc<dyn NotificationStore>,
    policies: Arc<PolicyResolver>,
}

impl PreferenceService {
    /// Creates a new preference service.
    pub fn new(store: Arc<dyn NotificationStore>, policies: Arc<PolicyResolver>) -> Self {
        Self { store, policies }
    }

    /// Effective channels for `user_id` under `policy`.
    pub async fn effective_channels(
        &self,
        user_id: UserId,
        policy: &DispatchPolicy,
    ) -> AppResult<BTreeSet<Channel>> {
        let preference = self.store.get_preference(user_id, &policy.key).await?;
        Ok(effective_channels(policy, preference.as_ref()))
    }

    /// Settings view for one user and key.
    pub async fn view(&self, user_id: UserId, key: &NotificationKey) -> AppResult<PreferenceView> {
        let policy = self.policies.resolve(key)?;
        let effective = self.effective_channels(user_id, policy).await?;
        Ok(PreferenceView {
            key: key.clone(),
            mandatory: policy.mandatory_channels.clone(),
            optional: policy.optional_channels.clone(),
            effective,
        })
    }

    /// Store a preference. Channels outside the policy's optional set are
    /// dropped; mandatory channels can never be disabled.
    pub async fn update(
        &self,
        user_id: UserId,
        key: &NotificationKey,
        enabled: Option<BTreeSet<Channel>>,
        disabled: BTreeSet<Channel>,
    ) -> AppResult<PreferenceView> {
        let policy = self.policies.resolve(key)?;
        let keep = |set: BTreeSet<Channel>| -> BTreeSet<Channel> {
            set.into_iter()
                .filter(|c| policy.optional_channels.contains(c))
                .collect()
        };

        let preference = ChannelPreference {
            user_id,
            key: key.clone(),
            enabled: enabled.map(keep),
            disabled: keep(disabled),
            updated_at: Utc::now(),
        };
        self.store.upsert_preference(&preference).await?;
        debug!(user_id = %user_id, key = %key, "Channel preference updated");

        Ok(PreferenceView {
            key: key.clone(),
            mandatory: policy.mandatory_channels.clone(),
            optional: policy.optional_channels.clone(),
            effective: effective_channels(policy, Some(&preference)),
        })
    }
}

#[cfg(test)]
mod tests {
    use herald_database::MemoryNotificationStore;

    use super::*;

    fn key(raw: &str) -> NotificationKey {
        raw.parse().unwrap()
    }

    fn service() -> PreferenceService {
        PreferenceService::new(
            Arc::new(MemoryNotificationStore::new()),
            Arc::new(PolicyResolver::seeded()),
        )
    }

    #[test]
    fn test_defaults_are_all_channels() {
        let resolver = PolicyResolver::seeded();
        let policy = resolver.resolve(&key("task.overdue")).unwrap();
        assert_eq!(effective_channels(policy, None), policy.all_channels());
    }

    #[test]
    fn test_mandatory_wins_over_disabled() {
        let resolver = PolicyResolver::seeded();
        let policy = resolver.resolve(&key("item.out_of_stock")).unwrap();
        let pref = ChannelPreference::disabling(
            UserId::new(),
            policy.key.clone(),
            [Channel::Push, Channel::Email],
        );
        let effective = effective_channels(policy, Some(&pref));
        assert_eq!(
            effective,
            BTreeSet::from([Channel::InApp, Channel::Push, Channel::WhatsApp])
        );
    }

    #[test]
    fn test_enabled_list_takes_precedence() {
        let resolver = PolicyResolver::seeded();
        let policy = resolver.resolve(&key("task.overdue")).unwrap();
        let mut pref = ChannelPreference::enabling(UserId::new(), policy.key.clone(), [Channel::Email]);
        pref.disabled.insert(Channel::Email);
        let effective = effective_channels(policy, Some(&pref));
        assert_eq!(
            effective,
            BTreeSet::from([Channel::InApp, Channel::Push, Channel::Email])
        );
    }

    #[tokio::test]
    async fn test_update_strips_mandatory_and_unknown() {
        let service = service();
        let user = UserId::new();
        let view = service
            .update(
                user,
                &key("task.overdue"),
                None,
                BTreeSet::from([Channel::Push, Channel::Sms, Channel::WhatsApp]),
            )
            .await
            .unwrap();
        assert!(view.effective.contains(&Channel::Push));
        assert!(!view.effective.contains(&Channel::WhatsApp));
        assert!(view.effective.contains(&Channel::Email));

        let stored = service.view(user, &key("task.overdue")).await.unwrap();
        assert_eq!(stored, view);
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let service = service();
        assert!(service.view(UserId::new(), &key("nope.never")).await.is_err());
    }
}
