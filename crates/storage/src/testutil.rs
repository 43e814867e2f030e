//! Shared test utilities for storage-backed code.
//!
//! This module is feature-gated behind `testutil` to prevent leaking into
//! production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! dirsecrets-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use dirsecrets_storage::testutil::{FailingBackend, StorageOp};
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    StorageBackend,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
    types::StorageEntry,
};

/// Storage operation selector for [`FailingBackend`] failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    /// [`StorageBackend::get`]
    Get,
    /// [`StorageBackend::put`]
    Put,
    /// [`StorageBackend::delete`]
    Delete,
    /// [`StorageBackend::list`]
    List,
}

/// A [`MemoryBackend`] wrapper that can be told to fail selected operations
/// and counts every call it receives.
///
/// Clones share the same data, failure plan and counters.
#[derive(Clone, Default)]
pub struct FailingBackend {
    inner: MemoryBackend,
    failures: Arc<Mutex<Vec<(StorageOp, StorageError)>>>,
    gets: Arc<AtomicUsize>,
    puts: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

impl FailingBackend {
    /// Creates a new backend with no failures configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped in-memory backend for direct inspection.
    #[must_use]
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Makes every subsequent `op` call fail with `error`.
    pub fn fail(&self, op: StorageOp, error: StorageError) {
        let mut failures = self.failures.lock();
        failures.retain(|(existing, _)| *existing != op);
        failures.push((op, error));
    }

    /// Removes all configured failures.
    pub fn heal(&self) {
        self.failures.lock().clear();
    }

    /// Number of `get` calls observed.
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put` calls observed.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls observed.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn injected(&self, op: StorageOp) -> StorageResult<()> {
        let failures = self.failures.lock();
        match failures.iter().find(|(existing, _)| *existing == op) {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.injected(StorageOp::Get)?;
        self.inner.get(key).await
    }

    async fn put(&self, entry: StorageEntry) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.injected(StorageOp::Put)?;
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.injected(StorageOp::Delete)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.injected(StorageOp::List)?;
        self.inner.list(prefix).await
    }
}

/// Assert that a result is a transient storage failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use dirsecrets_storage::assert_transient;
/// use dirsecrets_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::Timeout);
/// assert_transient!(result);
/// ```
#[macro_export]
macro_rules! assert_transient {
    ($result:expr) => {
        assert!(
            matches!(&$result, Err(e) if $crate::error::StorageError::is_transient(e)),
            "expected a transient StorageError, got: {:?}",
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_failure_only_hits_selected_op() {
        let backend = FailingBackend::new();
        backend.put(StorageEntry::new("config", b"{}".to_vec())).await.unwrap();

        backend.fail(StorageOp::Get, StorageError::connection("down"));
        assert_transient!(backend.get("config").await);

        // Other operations still reach the inner store.
        backend.delete("config").await.unwrap();
        assert!(backend.inner().is_empty());

        backend.heal();
        assert_eq!(backend.get("config").await.unwrap(), None);
        assert_eq!(backend.get_count(), 2);
        assert_eq!(backend.put_count(), 1);
        assert_eq!(backend.delete_count(), 1);
    }

    #[tokio::test]
    async fn healthy_backend_passes_conformance_suite() {
        crate::conformance::run_all(FailingBackend::new).await;
    }
}
