//! Storage backend trait definition.
//!
//! [`StorageBackend`] is the Durable Store collaborator: a sealed, hierarchical
//! key-value store owned by the host. The engine treats it as the single
//! source of truth; every in-memory cache is derived from it.
//!
//! # Design Philosophy
//!
//! - **Keys are hierarchical strings** (`config`, `roles/app`, `creds/app`)
//! - **Values are bytes**; encoding is the caller's concern
//! - **Async by default** so slow stores never block a worker thread
//! - **Object safe** so a backend can be shared as `Arc<dyn StorageBackend>`
//!
//! Cancellation is cooperative: dropping a returned future abandons the call.
//! Callers that carry a cancellation token race the future against it.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{
    error::{StorageError, StorageResult},
    types::StorageEntry,
};

/// Abstract storage backend for the sealed key-value store.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and to support
/// concurrent operations from many request handlers.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`put`](StorageBackend::put) | Store an entry, overwriting any prior value |
/// | [`delete`](StorageBackend::delete) | Remove a key (idempotent) |
/// | [`list`](StorageBackend::list) | List the immediate children of a prefix |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use dirsecrets_storage::{MemoryBackend, StorageBackend, StorageEntry};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.put(StorageEntry::new("roles/app", b"{}".to_vec())).await.unwrap();
/// let value = backend.get("roles/app").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("{}")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Stores an entry.
    ///
    /// If the key already exists, its value is overwritten (last writer wins).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put(&self, entry: StorageEntry) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// If the key doesn't exist, this is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lists the keys directly under `prefix`, with the prefix stripped.
    ///
    /// Nested children are reported once as `child/`. Results are sorted.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Decodes a JSON record read from `key`.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the bytes are not a valid
/// encoding of `T`.
pub fn decode_json<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::serialization_with_source(format!("failed to decode {key}"), e))
}

/// Reads and decodes a JSON record, returning `Ok(None)` for absent keys.
///
/// # Errors
///
/// Propagates backend errors and returns [`StorageError::Serialization`] for
/// undecodable records.
pub async fn get_json<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get(key).await? {
        Some(bytes) => decode_json(key, &bytes).map(Some),
        None => Ok(None),
    }
}
