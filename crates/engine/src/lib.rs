//! Directory credential rotation engine.
//!
//! Manages a global configuration, role definitions and dynamically rotated
//! passwords of directory service accounts. Durable state lives behind
//! [`dirsecrets_storage::StorageBackend`]; passwords are changed through a
//! [`DirectoryClient`]. Short-lived caches serve repeated reads without
//! touching either.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────────────────┐
//!   Request ────────► │      SecretsBackend      │ ◄──── invalidate(key)
//!                     │  handle() / read_*()     │           │
//!                     └───┬──────────┬───────────┘           │
//!                         │          │                       ▼
//!              ┌──────────▼──┐   ┌───▼─────────────┐  ┌───────────────┐
//!              │ ConfigStore │   │ RotationEngine  │  │ Invalidation  │
//!              │ RoleRegistry│   │ (rotation lock) │  │  Coordinator  │
//!              └──────┬──────┘   └───┬────────┬────┘  └───────┬───────┘
//!                     │              │        │               │
//!                     │              │   ┌────▼───────────────▼──┐
//!                     │              │   │ role / creds caches   │
//!                     │              │   │ (ExpiringCache)       │
//!                     ▼              ▼   └───────────────────────┘
//!              ┌──────────────────────────┐   ┌─────────────────┐
//!              │      StorageBackend      │   │ DirectoryClient │
//!              └──────────────────────────┘   └─────────────────┘
//! ```
//!
//! # Credential reads
//!
//! 1. Resolve the role (role cache, then storage).
//! 2. Resolve the TTL: role override, else configuration, else host default.
//! 3. Serve a fresh cached credential if there is one.
//! 4. Otherwise load the durable credential and rotate it if it is stale.
//!
//! Rotations are serialized by one lock per backend and re-check the durable
//! record after acquiring it, so concurrent readers of a stale credential
//! cause exactly one password change.
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Enables `fail` fail points in the rotation path for fault-injection tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod credential;
pub mod directory;
pub mod error;
pub mod invalidation;
pub mod paths;
pub mod request;
pub mod role;
pub mod rotation;
pub mod settings;

pub use backend::SecretsBackend;
pub use cache::{CacheSettings, ExpiringCache};
pub use config::{ConfigStore, ConfigUpdate, Configuration};
pub use context::RequestContext;
pub use credential::{Credential, CredentialStore, generate_password};
pub use directory::{DirectoryClient, DirectoryError, MemoryDirectory};
pub use error::{ConfigError, EngineError, Result};
pub use invalidation::InvalidationCoordinator;
pub use role::{Role, RoleRegistry};
pub use rotation::RotationEngine;
pub use settings::BackendConfig;
