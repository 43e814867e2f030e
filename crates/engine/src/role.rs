//! Role definitions and their durable registry.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dirsecrets_storage::{StorageBackend, StorageEntry, get_json};
use serde::{Deserialize, Serialize};

use crate::{
    context::RequestContext,
    error::{EngineError, Result},
    paths::{ROLE_PREFIX, is_valid_role_name, requires_seal_wrap, role_key},
};

/// A role binds a name to a directory service account and its rotation
/// policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name; a single path segment.
    pub name: String,

    /// Directory account whose password is managed for this role.
    pub service_account_name: String,

    /// Rotation TTL override. When absent the configuration TTL applies.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,

    /// Password change time reported by the directory when the role was
    /// written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_last_set: Option<DateTime<Utc>>,
}

impl Role {
    /// Creates a role without a TTL override.
    pub fn new(name: impl Into<String>, service_account_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_account_name: service_account_name.into(),
            ttl: None,
            password_last_set: None,
        }
    }

    /// Sets the rotation TTL override.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Validates name and account.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an invalid name, an empty
    /// account or a zero TTL.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_role_name(&self.name) {
            return Err(EngineError::validation(
                "name",
                format!("invalid role name {:?}", self.name),
            ));
        }
        if self.service_account_name.trim().is_empty() {
            return Err(EngineError::validation(
                "service_account_name",
                "service_account_name is required",
            ));
        }
        if self.ttl.is_some_and(|ttl| ttl < Duration::from_secs(1)) {
            return Err(EngineError::validation("ttl", "ttl must be positive"));
        }
        Ok(())
    }
}

/// Durable role storage under `roles/`.
///
/// The registry performs no caching; [`SecretsBackend`](crate::SecretsBackend)
/// puts the role cache in front of it.
#[derive(Clone)]
pub struct RoleRegistry {
    storage: Arc<dyn StorageBackend>,
}

impl RoleRegistry {
    /// Creates a registry over `storage`.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Loads role `name`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage or decoding failures.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn read(&self, ctx: &RequestContext, name: &str) -> Result<Option<Role>> {
        ctx.run(get_json::<Role>(self.storage.as_ref(), &role_key(name))).await
    }

    /// Persists `role`, replacing any previous definition.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an invalid role, or
    /// [`EngineError::Storage`] if the write fails.
    #[tracing::instrument(skip(self, ctx, role), fields(role = %role.name))]
    pub async fn write(&self, ctx: &RequestContext, role: &Role) -> Result<()> {
        role.validate()?;
        let key = role_key(&role.name);
        let sealed = requires_seal_wrap(&key);
        let entry = StorageEntry::json(key, role, sealed)?;
        ctx.run(self.storage.put(entry)).await
    }

    /// Deletes role `name`. Deleting an absent role succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the delete fails.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        ctx.run(self.storage.delete(&role_key(name))).await
    }

    /// Lists role names in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the listing fails.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        ctx.run(self.storage.list(ROLE_PREFIX)).await
    }
}
