//! Conformance test suite for [`StorageBackend`] implementations.
//!
//! Each function checks one part of the trait contract against a fresh
//! backend. A host adapter for the real sealed store runs the same suite as
//! [`MemoryBackend`](crate::MemoryBackend).
//!
//! # Usage
//!
//! ```no_run
//! use dirsecrets_storage::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn get_returns_none_for_missing_key() {
//!     conformance::crud_get_returns_none_for_missing_key(&MemoryBackend::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | get/put/delete semantics, overwrite, idempotent delete |
//! | List | direct children only, folders, ordering, prefix isolation |
//! | Records | JSON helpers and decoding errors |

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{StorageBackend, get_json},
    error::StorageError,
    types::StorageEntry,
};

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<B: StorageBackend>(backend: &B) {
    let result = backend.get("roles/ghost").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None, "missing key should return None");
}

/// `put` then `get` round-trips the value, sealed or not.
pub async fn crud_put_then_get_returns_value<B: StorageBackend>(backend: &B) {
    backend.put(StorageEntry::new("roles/app", b"plain".to_vec())).await.expect("put");
    backend.put(StorageEntry::sealed("creds/app", b"secret".to_vec())).await.expect("put sealed");

    assert_eq!(backend.get("roles/app").await.expect("get"), Some(Bytes::from("plain")));
    assert_eq!(backend.get("creds/app").await.expect("get"), Some(Bytes::from("secret")));
}

/// `put` on an existing key overwrites the value.
pub async fn crud_put_overwrites_existing<B: StorageBackend>(backend: &B) {
    backend.put(StorageEntry::sealed("config", b"original".to_vec())).await.expect("put");
    backend.put(StorageEntry::sealed("config", b"updated".to_vec())).await.expect("overwrite");
    assert_eq!(backend.get("config").await.expect("get"), Some(Bytes::from("updated")));
}

/// `delete` on a nonexistent key is a silent no-op, and repeating a delete
/// is too.
pub async fn crud_delete_is_idempotent<B: StorageBackend>(backend: &B) {
    backend.put(StorageEntry::new("roles/app", b"v".to_vec())).await.expect("put");
    for attempt in 0..3 {
        let result = backend.delete("roles/app").await;
        assert!(result.is_ok(), "delete attempt {attempt} should not error: {result:?}");
    }
    assert_eq!(backend.get("roles/app").await.expect("get after delete"), None);
}

/// Deleting one key leaves its siblings alone.
pub async fn crud_delete_removes_only_that_key<B: StorageBackend>(backend: &B) {
    for key in ["creds/alice", "creds/bob"] {
        backend.put(StorageEntry::sealed(key, b"v".to_vec())).await.expect("put");
    }
    backend.delete("creds/bob").await.expect("delete");

    assert!(backend.get("creds/alice").await.expect("get").is_some());
    assert_eq!(backend.get("creds/bob").await.expect("get"), None);
}

// ============================================================================
// List
// ============================================================================

/// `list` returns direct children with the prefix stripped, in sorted order.
pub async fn list_returns_sorted_children<B: StorageBackend>(backend: &B) {
    for name in ["web", "app", "batch"] {
        backend.put(StorageEntry::new(format!("roles/{name}"), b"{}".to_vec())).await.expect("put");
    }
    let keys = backend.list("roles/").await.expect("list");
    assert_eq!(keys, vec!["app", "batch", "web"], "list results must be sorted");
}

/// Nested keys are reported once as a folder entry.
pub async fn list_reports_folders_once<B: StorageBackend>(backend: &B) {
    for key in ["roles/team/a", "roles/team/b", "roles/solo"] {
        backend.put(StorageEntry::new(key, b"{}".to_vec())).await.expect("put");
    }
    let keys = backend.list("roles/").await.expect("list");
    assert_eq!(keys, vec!["solo", "team/"]);
}

/// Keys outside the prefix never leak into a listing.
pub async fn list_is_prefix_isolated<B: StorageBackend>(backend: &B) {
    backend.put(StorageEntry::new("roles/app", b"{}".to_vec())).await.expect("put");
    backend.put(StorageEntry::sealed("creds/app", b"{}".to_vec())).await.expect("put");
    backend.put(StorageEntry::new("rolesx", b"{}".to_vec())).await.expect("put");

    assert_eq!(backend.list("roles/").await.expect("list"), vec!["app"]);
    assert!(backend.list("sys/").await.expect("list empty prefix").is_empty());
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Probe {
    name: String,
    ttl: u64,
}

/// JSON records written with [`StorageEntry::json`] decode with [`get_json`].
pub async fn records_round_trip_as_json<B: StorageBackend>(backend: &B) {
    let probe = Probe { name: "app".to_owned(), ttl: 120 };
    let entry = StorageEntry::json("roles/app", &probe, false).expect("encode");
    backend.put(entry).await.expect("put");

    let decoded: Option<Probe> = get_json(backend, "roles/app").await.expect("get_json");
    assert_eq!(decoded, Some(probe));
    let missing: Option<Probe> = get_json(backend, "roles/none").await.expect("get_json");
    assert_eq!(missing, None);
}

/// Undecodable bytes surface as a serialization error, not as absence.
pub async fn records_reject_garbage<B: StorageBackend>(backend: &B) {
    backend.put(StorageEntry::new("roles/app", b"not json".to_vec())).await.expect("put");

    let result = get_json::<Probe>(backend, "roles/app").await;
    assert!(
        matches!(result, Err(StorageError::Serialization { .. })),
        "expected a serialization error, got {result:?}"
    );
}

// ============================================================================
// Run all
// ============================================================================

/// Runs the complete suite, creating a fresh backend for every check.
pub async fn run_all<B, F>(make_backend: F)
where
    B: StorageBackend,
    F: Fn() -> B,
{
    crud_get_returns_none_for_missing_key(&make_backend()).await;
    crud_put_then_get_returns_value(&make_backend()).await;
    crud_put_overwrites_existing(&make_backend()).await;
    crud_delete_is_idempotent(&make_backend()).await;
    crud_delete_removes_only_that_key(&make_backend()).await;
    list_returns_sorted_children(&make_backend()).await;
    list_reports_folders_once(&make_backend()).await;
    list_is_prefix_isolated(&make_backend()).await;
    records_round_trip_as_json(&make_backend()).await;
    records_reject_garbage(&make_backend()).await;
}
