//! The backend context object and request dispatcher.

use std::{sync::Arc, time::Duration};

use dirsecrets_storage::StorageBackend;

use crate::{
    cache::ExpiringCache,
    config::{ConfigStore, ConfigUpdate, Configuration},
    context::RequestContext,
    credential::{Credential, CredentialStore},
    directory::DirectoryClient,
    error::{ConfigError, EngineError, Result},
    invalidation::InvalidationCoordinator,
    paths::{CONFIG_KEY, CREDS_PREFIX, ROLE_PREFIX, RSA_PATH, is_valid_role_name, role_key},
    request::{
        ConfigRequest, ConfigResponse, CredsResponse, ListResponse, Operation, Request, Response,
        RoleRequest, RoleResponse, decode,
    },
    role::{Role, RoleRegistry},
    rotation::RotationEngine,
    settings::BackendConfig,
};

/// A mounted instance of the directory secrets backend.
///
/// Owns the caches and their sweepers, the rotation lock and the handles to
/// storage and the directory. Construct one per mount and share it behind an
/// `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use dirsecrets_engine::{BackendConfig, RequestContext, SecretsBackend, MemoryDirectory};
/// # use dirsecrets_engine::request::{Operation, Request};
/// # use dirsecrets_storage::MemoryBackend;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = SecretsBackend::new(
///     Arc::new(MemoryBackend::new()),
///     Arc::new(MemoryDirectory::new()),
///     BackendConfig::default(),
/// )?;
///
/// let ctx = RequestContext::new();
/// let request = Request::new(Operation::Update, "config")
///     .with_data(serde_json::json!({"ttl": 3600}));
/// backend.handle(&ctx, request).await?;
///
/// backend.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SecretsBackend {
    settings: BackendConfig,
    config: ConfigStore,
    roles: RoleRegistry,
    directory: Arc<dyn DirectoryClient>,
    role_cache: Arc<ExpiringCache<Arc<Role>>>,
    rotation: RotationEngine,
    invalidation: InvalidationCoordinator,
}

impl SecretsBackend {
    /// Creates the backend and starts both cache sweepers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `settings` fail validation.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        directory: Arc<dyn DirectoryClient>,
        settings: BackendConfig,
    ) -> std::result::Result<Self, ConfigError> {
        settings.validate()?;

        let role_cache = Arc::new(ExpiringCache::new("roles", &settings.cache));
        let cred_cache = Arc::new(ExpiringCache::new("creds", &settings.cache));

        let rotation = RotationEngine::new(
            CredentialStore::new(Arc::clone(&storage)),
            RoleRegistry::new(Arc::clone(&storage)),
            Arc::clone(&directory),
            Arc::clone(&cred_cache),
        );

        Ok(Self {
            config: ConfigStore::new(Arc::clone(&storage), settings.default_lease_ttl),
            roles: RoleRegistry::new(storage),
            invalidation: InvalidationCoordinator::new(Arc::clone(&role_cache), cred_cache),
            directory,
            role_cache,
            rotation,
            settings,
        })
    }

    /// The settings the backend was created with.
    #[must_use]
    pub fn settings(&self) -> &BackendConfig {
        &self.settings
    }

    /// The role cache.
    #[must_use]
    pub fn role_cache(&self) -> &ExpiringCache<Arc<Role>> {
        &self.role_cache
    }

    /// The credential cache.
    #[must_use]
    pub fn credential_cache(&self) -> &ExpiringCache<Arc<Credential>> {
        self.rotation.cache()
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Reads the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage failures.
    pub async fn read_config(&self, ctx: &RequestContext) -> Result<Option<Configuration>> {
        self.config.read(ctx).await
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a non-positive TTL or
    /// [`EngineError::Storage`] on storage failures.
    pub async fn write_config(
        &self,
        ctx: &RequestContext,
        update: ConfigUpdate,
    ) -> Result<Configuration> {
        self.config.update(ctx, update).await
    }

    /// Deletes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage failures.
    pub async fn delete_config(&self, ctx: &RequestContext) -> Result<()> {
        self.config.delete(ctx).await
    }

    // ── Roles ───────────────────────────────────────────────────────────

    /// Creates or replaces role `name`.
    ///
    /// The service account is looked up in the directory first; a role for
    /// an unknown or unreachable account is not written. When an existing
    /// role is moved to a different account, its credential is deleted.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for an invalid name, account or TTL
    /// - [`EngineError::Directory`] if the account lookup fails
    /// - [`EngineError::Storage`] on storage failures
    #[tracing::instrument(skip(self, ctx, request))]
    pub async fn write_role(
        &self,
        ctx: &RequestContext,
        name: &str,
        request: RoleRequest,
    ) -> Result<Role> {
        let mut role = request.into_role(name)?;
        role.validate()?;

        let last_set =
            ctx.run(self.directory.get_password_last_set(&role.service_account_name)).await?;
        role.password_last_set = Some(last_set);

        let previous = self.roles.read(ctx, name).await?;
        self.roles.write(ctx, &role).await?;
        self.role_cache.invalidate(name).await;

        if let Some(previous) = previous
            && previous.service_account_name != role.service_account_name
        {
            tracing::debug!(
                role = name,
                from = %previous.service_account_name,
                to = %role.service_account_name,
                "service account changed, dropping issued credential"
            );
            self.rotation.delete_credential(ctx, name).await?;
        }

        tracing::info!(
            audit.action = "write_role",
            audit.resource = %role_key(name),
            audit.result = "success",
            account = %role.service_account_name,
            "audit_event"
        );
        Ok(role)
    }

    /// Reads role `name`, serving from the role cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an invalid name or
    /// [`EngineError::Storage`] on storage failures.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn read_role(&self, ctx: &RequestContext, name: &str) -> Result<Option<Arc<Role>>> {
        check_role_name(name)?;

        if let Some(role) = self.role_cache.get(name).await {
            tracing::debug!(cache = "roles", role = name, "cache hit");
            return Ok(Some(role));
        }
        tracing::debug!(cache = "roles", role = name, "cache miss");

        let Some(role) = self.roles.read(ctx, name).await? else {
            return Ok(None);
        };
        let role = Arc::new(role);
        self.role_cache.insert(name, Arc::clone(&role)).await;
        Ok(Some(role))
    }

    /// Deletes role `name` together with its credential.
    ///
    /// Other roles and their credentials are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an invalid name or
    /// [`EngineError::Storage`] on storage failures.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_role(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        check_role_name(name)?;

        let deleted = self.roles.delete(ctx, name).await;
        self.role_cache.invalidate(name).await;
        deleted?;

        self.rotation.delete_credential(ctx, name).await?;

        tracing::info!(
            audit.action = "delete_role",
            audit.resource = %role_key(name),
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Lists role names in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage failures.
    pub async fn list_roles(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.roles.list(ctx).await
    }

    // ── Credentials ─────────────────────────────────────────────────────

    /// Returns a usable credential for `role_name`, rotating it when stale.
    ///
    /// Returns `Ok(None)` if the role does not exist.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotConfigured`] if no TTL can be resolved
    /// - [`EngineError::Directory`] if a required rotation failed
    /// - [`EngineError::Storage`] on storage failures
    #[tracing::instrument(skip(self, ctx))]
    pub async fn read_credential(
        &self,
        ctx: &RequestContext,
        role_name: &str,
    ) -> Result<Option<Arc<Credential>>> {
        let Some(role) = self.read_role(ctx, role_name).await? else {
            return Ok(None);
        };
        let ttl = self.resolve_ttl(ctx, &role).await?;

        if let Some(cached) = self.rotation.cache().get(role_name).await
            && !RotationEngine::is_stale(&role, &cached, ttl)
        {
            tracing::debug!(cache = "creds", role = role_name, "cache hit");
            return Ok(Some(cached));
        }
        tracing::debug!(cache = "creds", role = role_name, "cache miss");

        let durable = self.rotation.store().read(ctx, role_name).await?;
        self.rotation.get_or_rotate(ctx, &role, durable, ttl).await
    }

    /// Role TTL, else configuration TTL, else host default lease TTL.
    async fn resolve_ttl(&self, ctx: &RequestContext, role: &Role) -> Result<Duration> {
        if let Some(ttl) = role.ttl {
            return Ok(ttl);
        }
        if let Some(config) = self.config.read(ctx).await? {
            return Ok(config.ttl);
        }
        self.settings.default_lease_ttl.ok_or(EngineError::NotConfigured)
    }

    // ── Host callbacks ──────────────────────────────────────────────────

    /// Evicts the cache entry fed by storage key `key`. Never fails.
    pub async fn invalidate(&self, key: &str) {
        self.invalidation.invalidate(key).await;
    }

    /// Dispatches a client request to its handler.
    ///
    /// Returns `Ok(None)` for reads of absent records and for deletes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedPath`] for unknown path/operation
    /// pairs, [`EngineError::InvalidRequest`] for undecodable payloads, and
    /// the handler's error otherwise.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(operation = %request.operation, path = %request.path)
    )]
    pub async fn handle(&self, ctx: &RequestContext, request: Request) -> Result<Option<Response>> {
        let Request { operation, path, data } = request;

        if path == CONFIG_KEY || path == RSA_PATH {
            return match operation {
                Operation::Read => Ok(self
                    .read_config(ctx)
                    .await?
                    .map(|config| Response::Config(ConfigResponse::from(&config)))),
                Operation::Create | Operation::Update => {
                    let update = ConfigUpdate::from(decode::<ConfigRequest>(&data)?);
                    let config = self.write_config(ctx, update).await?;
                    Ok(Some(Response::Config(ConfigResponse::from(&config))))
                },
                Operation::Delete => self.delete_config(ctx).await.map(|()| None),
                Operation::List => Err(EngineError::unsupported(operation, path)),
            };
        }

        if path == ROLE_PREFIX || path == ROLE_PREFIX.trim_end_matches('/') {
            return match operation {
                Operation::List => {
                    let keys = self.list_roles(ctx).await?;
                    Ok(Some(Response::List(ListResponse { keys })))
                },
                _ => Err(EngineError::unsupported(operation, path)),
            };
        }

        if let Some(name) = path.strip_prefix(ROLE_PREFIX)
            && is_valid_role_name(name)
        {
            return match operation {
                Operation::Read => Ok(self
                    .read_role(ctx, name)
                    .await?
                    .map(|role| Response::Role(RoleResponse::from(role.as_ref())))),
                Operation::Create | Operation::Update => {
                    let role = self.write_role(ctx, name, decode::<RoleRequest>(&data)?).await?;
                    Ok(Some(Response::Role(RoleResponse::from(&role))))
                },
                Operation::Delete => self.delete_role(ctx, name).await.map(|()| None),
                Operation::List => Err(EngineError::unsupported(operation, &path)),
            };
        }

        if let Some(name) = path.strip_prefix(CREDS_PREFIX)
            && is_valid_role_name(name)
            && operation == Operation::Read
        {
            return Ok(self
                .read_credential(ctx, name)
                .await?
                .map(|credential| Response::Creds(CredsResponse::from(credential.as_ref()))));
        }

        Err(EngineError::unsupported(operation, path))
    }

    /// Stops both cache sweepers and clears the caches.
    pub async fn shutdown(&self) {
        self.role_cache.shutdown().await;
        self.rotation.cache().shutdown().await;
        tracing::debug!("secrets backend shut down");
    }
}

fn check_role_name(name: &str) -> Result<()> {
    if is_valid_role_name(name) {
        Ok(())
    } else {
        Err(EngineError::validation("name", format!("invalid role name {name:?}")))
    }
}
