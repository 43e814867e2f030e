//! Global configuration record.
//!
//! The configuration is a singleton stored (sealed) at [`CONFIG_KEY`]. It is
//! deliberately not cached: every access reads storage so that a change takes
//! effect on the very next request.

use std::{sync::Arc, time::Duration};

use dirsecrets_storage::{StorageBackend, StorageEntry, get_json};
use serde::{Deserialize, Serialize};

use crate::{
    context::RequestContext,
    error::{EngineError, Result},
    paths::{CONFIG_KEY, requires_seal_wrap},
};

/// Default RSA key length recorded when an update omits it.
pub const DEFAULT_RSA_KEY_LENGTH: u32 = 4096;

const MIN_TTL_SECS: i64 = 1;

/// Minimum accepted TTL after resolution.
pub const MIN_TTL: Duration = Duration::from_secs(MIN_TTL_SECS.unsigned_abs());

/// The stored configuration.
///
/// `ttl` is persisted as whole seconds, so the JSON form is
/// `{"ttl":120,"rsa_key_length":4096}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Default credential lifetime before rotation.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,

    /// RSA key length for key-management operations. `0` is stored as-is.
    pub rsa_key_length: u32,
}

/// A validated-at-the-boundary update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// Requested TTL in seconds; `0` selects the host default lease TTL.
    pub ttl_seconds: i64,

    /// Requested RSA key length; defaults to [`DEFAULT_RSA_KEY_LENGTH`].
    pub rsa_key_length: Option<u32>,
}

impl ConfigUpdate {
    /// Resolves the update into a [`Configuration`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if the resolved TTL is below
    /// [`MIN_TTL`].
    pub fn resolve(&self, default_lease_ttl: Option<Duration>) -> Result<Configuration> {
        let ttl_seconds = match self.ttl_seconds {
            0 => default_lease_ttl.map_or(0, |ttl| i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            explicit => explicit,
        };
        if ttl_seconds < MIN_TTL_SECS {
            return Err(EngineError::validation("ttl", "ttl must be positive"));
        }

        Ok(Configuration {
            ttl: Duration::from_secs(ttl_seconds.unsigned_abs()),
            rsa_key_length: self.rsa_key_length.unwrap_or(DEFAULT_RSA_KEY_LENGTH),
        })
    }
}

/// Reads and writes the configuration singleton.
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn StorageBackend>,
    default_lease_ttl: Option<Duration>,
}

impl ConfigStore {
    /// Creates a store over `storage`.
    ///
    /// `default_lease_ttl` is the host's system-wide default used when an
    /// update requests a TTL of 0.
    pub fn new(storage: Arc<dyn StorageBackend>, default_lease_ttl: Option<Duration>) -> Self {
        Self { storage, default_lease_ttl }
    }

    /// Returns the stored configuration, or `None` if none was ever written.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on storage or decoding failures.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn read(&self, ctx: &RequestContext) -> Result<Option<Configuration>> {
        ctx.run(get_json::<Configuration>(self.storage.as_ref(), CONFIG_KEY)).await
    }

    /// Resolves and persists `update`, overwriting any previous record.
    ///
    /// Nothing is written when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a non-positive TTL, or
    /// [`EngineError::Storage`] if the write fails.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn update(&self, ctx: &RequestContext, update: ConfigUpdate) -> Result<Configuration> {
        let config = update.resolve(self.default_lease_ttl)?;
        let entry = StorageEntry::json(CONFIG_KEY, &config, requires_seal_wrap(CONFIG_KEY))?;
        ctx.run(self.storage.put(entry)).await?;

        tracing::info!(
            audit.action = "write_config",
            audit.resource = CONFIG_KEY,
            audit.result = "success",
            ttl_secs = config.ttl.as_secs(),
            rsa_key_length = config.rsa_key_length,
            "audit_event"
        );
        Ok(config)
    }

    /// Deletes the configuration. Deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] if the delete fails.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &RequestContext) -> Result<()> {
        ctx.run(self.storage.delete(CONFIG_KEY)).await?;
        tracing::info!(
            audit.action = "delete_config",
            audit.resource = CONFIG_KEY,
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// The host default lease TTL this store falls back to.
    #[must_use]
    pub fn default_lease_ttl(&self) -> Option<Duration> {
        self.default_lease_ttl
    }
}

/// Serializes a [`Duration`] as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
