//! Sealed key-value storage abstraction for the dirsecrets backend.
//!
//! This crate provides the [`StorageBackend`] trait and related types that
//! stand in for the host's durable, sealed key-value store. The rotation
//! engine only ever talks to storage through this trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    dirsecrets-engine                        │
//! │   config store │ role registry │ rotation engine │ caches   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   dirsecrets-storage                        │
//! │              StorageBackend trait                           │
//! │              (get, put, delete, list)                       │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│        host sealed store adapter             │
//! │   (testing)  │            (production)                      │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use dirsecrets_storage::{MemoryBackend, StorageBackend, StorageEntry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     // Credentials are written with seal wrapping requested
//!     backend.put(StorageEntry::sealed("creds/app", b"{}".to_vec())).await?;
//!
//!     let value = backend.get("creds/app").await?;
//!     assert!(value.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a failure-injecting backend and assertion
//!   macros, and the `conformance` suite for backend implementations. Enable this in
//!   `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::{StorageBackend, decode_json, get_json};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use types::StorageEntry;
