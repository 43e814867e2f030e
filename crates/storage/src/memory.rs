//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`] for prefix listing
//! - **Seal tracking**: Remembers which keys were written with `seal_wrap` so tests can assert the
//!   property without a real sealing layer
//!
//! # Example
//!
//! ```
//! use dirsecrets_storage::{MemoryBackend, StorageBackend, StorageEntry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.put(StorageEntry::sealed("config", b"{}".to_vec())).await.unwrap();
//!     assert!(backend.is_sealed("config"));
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - No replication, so no invalidations are ever produced by other nodes

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{backend::StorageBackend, error::StorageResult, types::StorageEntry};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    seal_wrap: bool,
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, StoredValue>>>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory storage backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` exists and was written with `seal_wrap`.
    #[must_use]
    pub fn is_sealed(&self, key: &str) -> bool {
        self.data.read().get(key).is_some_and(|stored| stored.seal_wrap)
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let data = self.data.read();
        Ok(data.get(key).map(|stored| stored.value.clone()))
    }

    #[tracing::instrument(skip(self, entry), fields(key = %entry.key, seal_wrap = entry.seal_wrap))]
    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        let mut data = self.data.write();
        data.insert(entry.key, StoredValue { value: entry.value, seal_wrap: entry.seal_wrap });
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut data = self.data.write();
        data.remove(key);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let data = self.data.read();

        let mut children: Vec<String> = Vec::new();
        let range = (Bound::Included(prefix), Bound::Unbounded);
        for key in data.range::<str, _>(range).map(|(k, _)| k).take_while(|k| k.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            let child = match rest.find('/') {
                Some(idx) => &rest[..=idx],
                None => rest,
            };
            if child.is_empty() {
                continue;
            }
            // Keys are visited in order, so duplicates of a folder are adjacent.
            if children.last().map(String::as_str) != Some(child) {
                children.push(child.to_owned());
            }
        }

        Ok(children)
    }
}
