//! Common types used across storage operations.

use bytes::Bytes;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

/// A single record written to the sealed store.
///
/// `seal_wrap` tells the host that the record needs the additional at-rest
/// sealing applied to sensitive paths (configuration and credentials). The
/// backend itself does not implement sealing; it only forwards the request.
///
/// # Examples
///
/// ```
/// use dirsecrets_storage::StorageEntry;
///
/// let entry = StorageEntry::new("roles/app", br#"{"service_account_name":"svc-app"}"#.to_vec());
/// assert!(!entry.seal_wrap);
///
/// let sealed = StorageEntry::sealed("config", b"{}".to_vec());
/// assert!(sealed.seal_wrap);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Hierarchical key, e.g. `creds/app`.
    pub key: String,

    /// Encoded record.
    pub value: Bytes,

    /// Whether the host must seal-wrap this record at rest.
    pub seal_wrap: bool,
}

impl StorageEntry {
    /// Creates an entry stored without extra sealing.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self { key: key.into(), value: value.into(), seal_wrap: false }
    }

    /// Creates an entry that must be seal-wrapped by the host.
    pub fn sealed(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self { key: key.into(), value: value.into(), seal_wrap: true }
    }

    /// Serializes `value` as JSON into a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `value` cannot be encoded.
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T, seal_wrap: bool) -> StorageResult<Self> {
        let key = key.into();
        let encoded = serde_json::to_vec(value).map_err(|e| {
            StorageError::serialization_with_source(format!("failed to encode {key}"), e)
        })?;
        Ok(Self { key, value: Bytes::from(encoded), seal_wrap })
    }
}
