//! TTL-driven credential rotation.
//!
//! [`RotationEngine::get_or_rotate`] decides whether a role's credential is
//! still usable and, if not, replaces the password in the directory and
//! persists the new credential.
//!
//! # Ordering
//!
//! A rotation is: generate password → directory update → durable write →
//! credential cache insert. Each step only runs when the previous one
//! succeeded, so a failed rotation never leaves a cached credential the
//! directory does not know about.
//!
//! # Serialization
//!
//! All rotations share one async lock. After acquiring it the durable role
//! and credential records are re-read: a task that waited behind another
//! rotation for the same role finds the freshly written credential and
//! returns it without calling the directory again, and a role deleted in the
//! meantime is never rotated.
//!
//! Credential deletes take the same lock, so a delete issued while a rotation
//! is in flight runs after the rotation's write and removes it.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use fail::fail_point;
use tokio::sync::Mutex;

use crate::{
    cache::ExpiringCache,
    context::RequestContext,
    credential::{Credential, CredentialStore, generate_password},
    directory::DirectoryClient,
    error::Result,
    paths::creds_key,
    role::{Role, RoleRegistry},
};

/// Rotates credentials and keeps the credential cache in step with storage.
pub struct RotationEngine {
    store: CredentialStore,
    roles: RoleRegistry,
    directory: Arc<dyn DirectoryClient>,
    cache: Arc<ExpiringCache<Arc<Credential>>>,
    /// Serializes every rotation and credential delete of the backend.
    rotation_lock: Mutex<()>,
}

impl RotationEngine {
    /// Creates an engine writing through `store` and `cache`.
    ///
    /// `roles` is consulted under the rotation lock to confirm the role still
    /// exists before the directory is touched.
    pub fn new(
        store: CredentialStore,
        roles: RoleRegistry,
        directory: Arc<dyn DirectoryClient>,
        cache: Arc<ExpiringCache<Arc<Credential>>>,
    ) -> Self {
        Self { store, roles, directory, cache, rotation_lock: Mutex::new(()) }
    }

    /// Returns `true` if `credential` must be replaced before use by `role`.
    ///
    /// A credential issued for a different account than the role's current
    /// one is always replaced.
    #[must_use]
    pub fn is_stale(role: &Role, credential: &Credential, ttl: Duration) -> bool {
        credential.login != role.service_account_name || credential.is_stale(ttl)
    }

    /// Returns a usable credential for `role`, rotating it if `previous` is
    /// absent or older than `ttl`.
    ///
    /// Returns `Ok(None)` if the role was deleted before the rotation could
    /// start.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Directory`](crate::EngineError::Directory) if the
    ///   directory refused the new password. Nothing is persisted or cached
    ///   and the previous durable credential stays valid.
    /// - [`EngineError::Storage`](crate::EngineError::Storage) if the durable
    ///   re-read or write failed.
    /// - [`EngineError::Cancelled`](crate::EngineError::Cancelled) if the
    ///   request was cancelled.
    #[tracing::instrument(skip(self, ctx, role, previous), fields(role = %role.name))]
    pub async fn get_or_rotate(
        &self,
        ctx: &RequestContext,
        role: &Role,
        previous: Option<Credential>,
        ttl: Duration,
    ) -> Result<Option<Arc<Credential>>> {
        if let Some(credential) = previous
            && !Self::is_stale(role, &credential, ttl)
        {
            let credential = Arc::new(credential);
            self.cache.insert(role.name.clone(), Arc::clone(&credential)).await;
            return Ok(Some(credential));
        }

        let _guard = ctx.guard(self.rotation_lock.lock()).await?;

        let Some(role) = self.roles.read(ctx, &role.name).await? else {
            tracing::debug!(role = %role.name, "role deleted before rotation");
            return Ok(None);
        };

        // Another task may have rotated while we waited for the lock.
        let current = self.store.read(ctx, &role.name).await?;
        if let Some(credential) = current.as_ref()
            && !Self::is_stale(&role, credential, ttl)
        {
            tracing::debug!(role = %role.name, "credential rotated concurrently");
            let credential = Arc::new(credential.clone());
            self.cache.insert(role.name.clone(), Arc::clone(&credential)).await;
            return Ok(Some(credential));
        }

        self.rotate(ctx, &role, current).await.map(Some)
    }

    /// Performs the rotation. Must be called with the rotation lock held.
    async fn rotate(
        &self,
        ctx: &RequestContext,
        role: &Role,
        current: Option<Credential>,
    ) -> Result<Arc<Credential>> {
        let account = role.service_account_name.as_str();
        let password = generate_password();

        fail_point!("rotation-before-directory-call", |_| {
            Err(crate::EngineError::from(crate::DirectoryError::unreachable(
                "injected failure before directory call",
            )))
        });
        if let Err(err) = ctx.run(self.directory.update_password(account, &password)).await {
            if ctx.is_cancelled() {
                // The directory may have applied the password before the
                // cancellation won the race.
                tracing::error!(
                    role = %role.name,
                    account,
                    error = %err,
                    "directory password may have changed but credential was not persisted"
                );
            } else {
                tracing::warn!(role = %role.name, account, error = %err, "password rotation failed");
            }
            tracing::info!(
                audit.action = "rotate_credential",
                audit.resource = %creds_key(&role.name),
                audit.result = "failure",
                "audit_event"
            );
            return Err(err);
        }

        let previous_secret = current
            .filter(|credential| credential.login == account)
            .map(|credential| credential.current_secret);
        let credential = Credential {
            role_name: role.name.clone(),
            login: account.to_owned(),
            current_secret: password,
            previous_secret,
            last_rotated_at: Utc::now(),
        };

        fail_point!("rotation-before-persist", |_| {
            Err(crate::EngineError::from(dirsecrets_storage::StorageError::internal(
                "injected failure before persist",
            )))
        });
        if let Err(err) = self.store.write(ctx, &credential).await {
            // The directory now holds a password nothing records. The stale
            // durable record triggers another rotation on the next read.
            tracing::error!(
                role = %role.name,
                account,
                error = %err,
                "directory password changed but credential could not be persisted"
            );
            return Err(err);
        }

        let credential = Arc::new(credential);
        self.cache.insert(role.name.clone(), Arc::clone(&credential)).await;

        tracing::info!(
            audit.action = "rotate_credential",
            audit.resource = %creds_key(&role.name),
            audit.result = "success",
            account,
            "audit_event"
        );
        Ok(credential)
    }

    /// Deletes the credential of `role_name` from storage and evicts it from
    /// the cache.
    ///
    /// Waits for any in-flight rotation, so a credential written by that
    /// rotation is removed too. The cache entry is evicted even when the
    /// storage delete fails.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`](crate::EngineError::Cancelled) if
    /// the request is cancelled while waiting, otherwise the storage error
    /// after the eviction.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_credential(&self, ctx: &RequestContext, role_name: &str) -> Result<()> {
        let _guard = ctx.guard(self.rotation_lock.lock()).await?;

        let deleted = self.store.delete(ctx, role_name).await;
        self.cache.invalidate(role_name).await;

        match deleted {
            Ok(()) => {
                tracing::info!(
                    audit.action = "delete_credential",
                    audit.resource = %creds_key(role_name),
                    audit.result = "success",
                    "audit_event"
                );
                Ok(())
            },
            Err(err) => {
                tracing::warn!(role = role_name, error = %err, "credential delete failed");
                Err(err)
            },
        }
    }

    /// The credential cache this engine writes to.
    #[must_use]
    pub fn cache(&self) -> &Arc<ExpiringCache<Arc<Credential>>> {
        &self.cache
    }

    /// The durable credential store.
    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}
