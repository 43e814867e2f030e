//! Issued credentials and their durable storage.

use std::{fmt, sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use dirsecrets_storage::{StorageBackend, StorageEntry, get_json};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    context::RequestContext,
    error::Result,
    paths::{creds_key, requires_seal_wrap},
};

/// Fixed prefix guaranteeing upper case, lower case, digit and symbol
/// classes so generated passwords pass directory complexity rules.
pub const PASSWORD_PREFIX: &str = "?@09AZ";

/// Random bytes drawn per generated password.
pub const PASSWORD_ENTROPY_BYTES: usize = 32;

/// The current (and previous) password of a role's service account.
///
/// Secrets are zeroized on drop and never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Role the credential was issued for.
    pub role_name: String,

    /// Directory login (the service account name).
    pub login: String,

    /// Password currently set in the directory.
    pub current_secret: Zeroizing<String>,

    /// Password superseded by the last rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_secret: Option<Zeroizing<String>>,

    /// When `current_secret` was set.
    pub last_rotated_at: DateTime<Utc>,
}

impl Credential {
    /// Returns `true` once the credential is at least `ttl` old at `now`.
    ///
    /// A credential stamped in the future is treated as fresh.
    #[must_use]
    pub fn is_stale_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.last_rotated_at).to_std() {
            Ok(age) => age >= ttl,
            Err(_) => false,
        }
    }

    /// Returns `true` once the credential is at least `ttl` old.
    #[must_use]
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.is_stale_at(ttl, Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("role_name", &self.role_name)
            .field("login", &self.login)
            .field("current_secret", &"[REDACTED]")
            .field("previous_secret", &self.previous_secret.as_ref().map(|_| "[REDACTED]"))
            .field("last_rotated_at", &self.last_rotated_at)
            .finish()
    }
}

/// Generates a fresh directory password.
///
/// 32 bytes from the OS RNG, base64url encoded without padding, behind
/// [`PASSWORD_PREFIX`].
#[must_use]
pub fn generate_password() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; PASSWORD_ENTROPY_BYTES]);
    OsRng.fill_bytes(&mut bytes[..]);

    let mut password = Zeroizing::new(String::with_capacity(
        PASSWORD_PREFIX.len() + PASSWORD_ENTROPY_BYTES.div_ceil(3) * 4,
    ));
    password.push_str(PASSWORD_PREFIX);
    URL_SAFE_NO_PAD.encode_string(&bytes[..], &mut *password);
    password
}

/// Durable credential storage under `creds/`. Every write is seal-wrapped.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn StorageBackend>,
}

impl CredentialStore {
    /// Creates a store over `storage`.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Loads the credential of `role_name`, or `None` if none was issued.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`](crate::EngineError::Storage) on
    /// storage or decoding failures.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn read(&self, ctx: &RequestContext, role_name: &str) -> Result<Option<Credential>> {
        ctx.run(get_json::<Credential>(self.storage.as_ref(), &creds_key(role_name))).await
    }

    /// Persists `credential`, replacing any previous one for the role.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`](crate::EngineError::Storage) if
    /// encoding or the write fails.
    #[tracing::instrument(skip(self, ctx, credential), fields(role = %credential.role_name))]
    pub async fn write(&self, ctx: &RequestContext, credential: &Credential) -> Result<()> {
        let key = creds_key(&credential.role_name);
        let sealed = requires_seal_wrap(&key);
        let entry = StorageEntry::json(key, credential, sealed)?;
        ctx.run(self.storage.put(entry)).await
    }

    /// Deletes the credential of `role_name`. Deleting an absent one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`](crate::EngineError::Storage) if the
    /// delete fails.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &RequestContext, role_name: &str) -> Result<()> {
        ctx.run(self.storage.delete(&creds_key(role_name))).await
    }
}
