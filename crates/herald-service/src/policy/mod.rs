//! Configuration resolver: notification key to dispatch policy.

mod seed;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use herald_core::config::PolicyConfig;
use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_entity::{
    AudienceRule, Channel, ContentTemplate, DispatchPolicy, Importance, NotificationKey,
};

pub use seed::seeded_policies;

/// Read-only policy table. Lookups never mutate it.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    policies: BTreeMap<NotificationKey, DispatchPolicy>,
}

impl PolicyResolver {
    /// An empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in ERP policies.
    pub fn seeded() -> Self {
        let mut resolver = Self::empty();
        for entry in seeded_policies() {
            if let Ok(policy) = build_policy(&entry, None) {
                resolver.insert(policy);
            }
        }
        resolver
    }

    /// The seeded table with `overrides` applied. An entry whose key is
    /// already known replaces only the fields it sets; a new key must
    /// provide at least a title.
    pub fn from_config(overrides: &[PolicyConfig]) -> AppResult<Self> {
        let mut resolver = Self::seeded();
        for entry in overrides {
            let key = parse_key(&entry.key)?;
            let policy = build_policy(entry, resolver.policies.get(&key))?;
            debug!(key = %key, "Policy configured");
            resolver.insert(policy);
        }
        Ok(resolver)
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, policy: DispatchPolicy) {
        self.policies.insert(policy.key.clone(), policy);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.insert(policy);
        self
    }

    /// The policy for `key`. Unknown keys are configuration errors.
    pub fn resolve(&self, key: &NotificationKey) -> AppResult<&DispatchPolicy> {
        self.policies.get(key).ok_or_else(|| {
            AppError::configuration(format!("Unconfigured notification key '{key}'"))
        })
    }

    /// Every policy, ordered by key.
    pub fn list(&self) -> impl Iterator<Item = &DispatchPolicy> {
        self.policies.values()
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

fn parse_key(raw: &str) -> AppResult<NotificationKey> {
    raw.parse()
        .map_err(|e: String| AppError::configuration(format!("policies: {e}")))
}

fn parse_channels(key: &str, field: &str, names: &[String]) -> AppResult<BTreeSet<Channel>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Channel>().map_err(|e| {
                AppError::configuration(format!("policies.{key}.{field}: {e}"))
            })
        })
        .collect()
}

fn build_policy(entry: &PolicyConfig, base: Option<&DispatchPolicy>) -> AppResult<DispatchPolicy> {
    let key = parse_key(&entry.key)?;

    let mandatory = if entry.mandatory_channels.is_empty() {
        base.map(|b| b.mandatory_channels.clone()).unwrap_or_default()
    } else {
        parse_channels(&entry.key, "mandatory_channels", &entry.mandatory_channels)?
    };
    let mut optional = if entry.optional_channels.is_empty() {
        base.map(|b| b.optional_channels.clone()).unwrap_or_default()
    } else {
        parse_channels(&entry.key, "optional_channels", &entry.optional_channels)?
    };
    optional.retain(|c| !mandatory.contains(c));

    let importance = match &entry.importance {
        Some(raw) => raw
            .parse::<Importance>()
            .map_err(|e| AppError::configuration(format!("policies.{key}.importance: {e}")))?,
        None => base.map(|b| b.importance).unwrap_or_default(),
    };
    let audience = match &entry.audience {
        Some(raw) => raw
            .parse::<AudienceRule>()
            .map_err(|e| AppError::configuration(format!("policies.{key}.audience: {e}")))?,
        None => base
            .map(|b| b.audience.clone())
            .unwrap_or(AudienceRule::Explicit),
    };

    let base_template = base.map(|b| b.template.clone());
    let title = match (&entry.title, &base_template) {
        (Some(title), _) => title.clone(),
        (None, Some(template)) => template.title.clone(),
        (None, None) => {
            return Err(AppError::configuration(format!(
                "policies.{key}.title is required for a new policy"
            )));
        }
    };
    let template = ContentTemplate {
        title,
        body: entry
            .body
            .clone()
            .or_else(|| base_template.as_ref().map(|t| t.body.clone()))
            .unwrap_or_default(),
        action_url: entry
            .action_url
            .clone()
            .or_else(|| base_template.as_ref().and_then(|t| t.action_url.clone())),
        required_fields: if entry.required_fields.is_empty() {
            base_template.map(|t| t.required_fields).unwrap_or_default()
        } else {
            entry.required_fields.clone()
        },
    };

    if mandatory.is_empty() && optional.is_empty() {
        return Err(AppError::configuration(format!(
            "policies.{key} targets no channel"
        )));
    }

    Ok(DispatchPolicy {
        key,
        mandatory_channels: mandatory,
        optional_channels: optional,
        audience,
        importance,
        template,
    })
}

#[cfg(test)]
mod tests {
    use herald_core::error::ErrorKind;

    use super::*;

    #[test]
    fn test_every_seed_entry_builds() {
        let seeds = seeded_policies();
        assert_eq!(PolicyResolver::seeded().len(), seeds.len());
        for entry in &seeds {
            build_policy(entry, None).unwrap();
        }
    }

    #[test]
    fn test_out_of_stock_policy() {
        let resolver = PolicyResolver::seeded();
        let policy = resolver
            .resolve(&NotificationKey::new("item", "out_of_stock"))
            .unwrap();
        assert_eq!(
            policy.mandatory_channels,
            BTreeSet::from([Channel::InApp, Channel::Push, Channel::WhatsApp])
        );
        assert_eq!(policy.importance, Importance::High);
        assert_eq!(policy.audience, AudienceRule::Role("stock_manager".into()));
    }

    #[test]
    fn test_unknown_key_is_configuration_error() {
        let err = PolicyResolver::seeded()
            .resolve(&NotificationKey::new("item", "teleported"))
            .unwrap_err();
        assert!(err.is(ErrorKind::Configuration));
        assert!(err.message.contains("item.teleported"));
    }

    #[test]
    fn test_override_keeps_unset_fields() {
        let resolver = PolicyResolver::from_config(&[PolicyConfig {
            key: "task.overdue".into(),
            optional_channels: vec!["sms".into(), "push".into()],
            ..PolicyConfig::default()
        }])
        .unwrap();
        let policy = resolver
            .resolve(&NotificationKey::new("task", "overdue"))
            .unwrap();
        assert_eq!(policy.optional_channels, BTreeSet::from([Channel::Sms]));
        assert_eq!(policy.template.title, "Task overdue: {task}");
        assert_eq!(policy.audience, AudienceRule::Assignees);
    }

    #[test]
    fn test_new_policy_needs_title() {
        let err = PolicyResolver::from_config(&[PolicyConfig {
            key: "supplier.late".into(),
            mandatory_channels: vec!["in_app".into()],
            ..PolicyConfig::default()
        }])
        .unwrap_err();
        assert!(err.is(ErrorKind::Configuration));

        let resolver = PolicyResolver::from_config(&[PolicyConfig {
            key: "supplier.late".into(),
            mandatory_channels: vec!["in_app".into()],
            title: Some("{supplier} is late".into()),
            ..PolicyConfig::default()
        }])
        .unwrap();
        assert!(resolver
            .resolve(&NotificationKey::new("supplier", "late"))
            .is_ok());
    }

    #[test]
    fn test_bad_channel_name() {
        let err = PolicyResolver::from_config(&[PolicyConfig {
            key: "task.overdue".into(),
            mandatory_channels: vec!["fax".into()],
            ..PolicyConfig::default()
        }])
        .unwrap_err();
        assert!(err.message.contains("fax"));
    }
}
