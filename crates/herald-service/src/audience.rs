//! Audience resolution contract and a static in-memory directory.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_core::types::UserId;
use herald_entity::{AudienceRule, EntityRef, Recipient};

/// Answers membership queries and supplies contact data. Backed by the
/// ERP's user, role and assignment tables in production.
#[async_trait]
pub trait AudienceProvider: Send + Sync + std::fmt::Debug {
    /// Users matched by `rule` for the related `entity`.
    async fn resolve_audience(
        &self,
        rule: &AudienceRule,
        entity: Option<&EntityRef>,
    ) -> AppResult<Vec<UserId>>;

    /// Contact data for `user_ids`, in the same order. Users the provider
    /// does not know come back with in-app contact only.
    async fn lookup_recipients(&self, user_ids: &[UserId]) -> AppResult<Vec<Recipient>>;
}

/// Directory file layout for [`StaticAudienceProvider::from_json_file`].
#[derive(Debug, Default, Deserialize)]
struct Directory {
    #[serde(default)]
    users: Vec<Recipient>,
    #[serde(default)]
    roles: HashMap<String, Vec<UserId>>,
    #[serde(default)]
    sectors: HashMap<String, Vec<UserId>>,
    /// Keyed by `"<entity_type>-<entity_id>"`.
    #[serde(default)]
    assignees: HashMap<String, Vec<UserId>>,
}

/// Audience provider over fixed tables.
#[derive(Debug, Clone, Default)]
pub struct StaticAudienceProvider {
    users: HashMap<UserId, Recipient>,
    roles: HashMap<String, Vec<UserId>>,
    sectors: HashMap<String, Vec<UserId>>,
    assignees: HashMap<EntityRef, Vec<UserId>>,
}

impl StaticAudienceProvider {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON directory file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("Cannot read directory {}: {e}", path.display()))
        })?;
        let directory: Directory = serde_json::from_str(&raw)?;

        let mut provider = Self::new();
        for user in directory.users {
            provider = provider.with_user(user);
        }
        provider.roles = directory.roles;
        provider.sectors = directory.sectors;
        for (key, users) in directory.assignees {
            let (entity_type, entity_id) = key.split_once('-').ok_or_else(|| {
                AppError::configuration(format!(
                    "Assignee key '{key}' must look like '<entity_type>-<entity_id>'"
                ))
            })?;
            provider
                .assignees
                .insert(EntityRef::new(entity_type, entity_id), users);
        }
        Ok(provider)
    }

    /// Register a user's contact data.
    pub fn with_user(mut self, recipient: Recipient) -> Self {
        self.users.insert(recipient.user_id, recipient);
        self
    }

    /// Add users to a role.
    pub fn with_role(mut self, role: &str, users: impl IntoIterator<Item = UserId>) -> Self {
        self.roles.entry(role.to_string()).or_default().extend(users);
        self
    }

    /// Add users to a sector.
    pub fn with_sector(mut self, sector: &str, users: impl IntoIterator<Item = UserId>) -> Self {
        self.sectors
            .entry(sector.to_string())
            .or_default()
            .extend(users);
        self
    }

    /// Assign users to an entity.
    pub fn with_assignees(
        mut self,
        entity: EntityRef,
        users: impl IntoIterator<Item = UserId>,
    ) -> Self {
        self.assignees.entry(entity).or_default().extend(users);
        self
    }
}

#[async_trait]
impl AudienceProvider for StaticAudienceProvider {
    async fn resolve_audience(
        &self,
        rule: &AudienceRule,
        entity: Option<&EntityRef>,
    ) -> AppResult<Vec<UserId>> {
        let members = match rule {
            AudienceRule::Explicit => None,
            AudienceRule::Role(role) => self.roles.get(role),
            AudienceRule::Sector(sector) => self.sectors.get(sector),
            AudienceRule::Assignees => {
                let entity = entity.ok_or_else(|| {
                    AppError::validation("Audience 'assignees' needs a related entity")
                })?;
                self.assignees.get(entity)
            }
        };
        Ok(members.cloned().unwrap_or_default())
    }

    async fn lookup_recipients(&self, user_ids: &[UserId]) -> AppResult<Vec<Recipient>> {
        Ok(user_ids
            .iter()
            .map(|id| {
                self.users
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| Recipient::new(*id))
            })
            .collect())
    }
}
