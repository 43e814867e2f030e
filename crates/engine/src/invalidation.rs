//! Storage-key driven cache invalidation.
//!
//! The host calls [`InvalidationCoordinator::invalidate`] whenever a storage
//! key changes behind the backend's back (replication, another node, manual
//! edits). The coordinator maps the key to the cache it feeds and evicts the
//! entry. It never touches storage and never fails.

use std::sync::Arc;

use crate::{
    cache::ExpiringCache,
    credential::Credential,
    paths::{CREDS_PREFIX, ROLE_PREFIX},
    role::Role,
};

/// Routes storage-key invalidations to the role and credential caches.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    roles: Arc<ExpiringCache<Arc<Role>>>,
    creds: Arc<ExpiringCache<Arc<Credential>>>,
}

impl InvalidationCoordinator {
    /// Creates a coordinator over both caches.
    pub fn new(
        roles: Arc<ExpiringCache<Arc<Role>>>,
        creds: Arc<ExpiringCache<Arc<Credential>>>,
    ) -> Self {
        Self { roles, creds }
    }

    /// Evicts whatever cache entry `key` feeds.
    ///
    /// `creds/<name>` evicts credential `name` and `roles/<name>` evicts role
    /// `name`. Any other key is ignored. Repeating a call has no further
    /// effect.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self, key: &str) {
        let mut matched = false;

        if let Some(name) = key.strip_prefix(CREDS_PREFIX) {
            self.creds.invalidate(name).await;
            matched = true;
        }
        if let Some(name) = key.strip_prefix(ROLE_PREFIX) {
            self.roles.invalidate(name).await;
            matched = true;
        }

        if matched {
            tracing::info!(
                audit.action = "invalidate_cache",
                audit.resource = key,
                audit.result = "success",
                "audit_event"
            );
        } else {
            tracing::debug!(key, "invalidation ignored for unmanaged key");
        }
    }
}
