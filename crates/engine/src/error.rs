//! Engine error types.
//!
//! Errors fall into three groups:
//!
//! - **User-correctable** input problems ([`EngineError::Validation`], [`EngineError::InvalidRequest`],
//!   [`EngineError::NotConfigured`], [`EngineError::UnsupportedPath`]). Nothing is written when one
//!   of these is returned.
//! - **Dependency failures** from the sealed store or the directory ([`EngineError::Storage`],
//!   [`EngineError::Directory`]). No partial state is committed and the caller is expected to retry.
//! - **Cancellation** of the request ([`EngineError::Cancelled`]).
//!
//! "Not found" is never an error; lookups return `Ok(None)`.

use dirsecrets_storage::StorageError;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Errors returned by backend operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// A field value was rejected.
    #[error("{field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable description of the problem.
        message: String,
    },

    /// The request payload could not be decoded into the expected shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No TTL could be resolved because neither the role, the configuration
    /// nor the host supplies one.
    #[error("Backend is not configured: write the config endpoint first")]
    NotConfigured,

    /// No handler exists for the path/operation pair.
    #[error("Unsupported operation {operation} on path {path:?}")]
    UnsupportedPath {
        /// Requested operation.
        operation: String,
        /// Requested path.
        path: String,
    },

    /// The sealed store failed.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Storage error: {0}")]
    Storage(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),

    /// The directory refused or failed a password operation.
    #[error("Directory error: {0}")]
    Directory(
        /// The underlying directory error.
        #[source]
        DirectoryError,
    ),

    /// The request was cancelled before the operation finished.
    #[error("Request cancelled")]
    Cancelled,
}

impl EngineError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }

    /// Creates a new `UnsupportedPath` error.
    #[must_use]
    pub fn unsupported(operation: impl ToString, path: impl Into<String>) -> Self {
        Self::UnsupportedPath { operation: operation.to_string(), path: path.into() }
    }

    /// Returns `true` for errors the caller can fix by changing the request.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidRequest(_)
                | Self::NotConfigured
                | Self::UnsupportedPath { .. }
        )
    }

    /// Returns `true` when an external dependency failed and a later retry
    /// of the same request is expected to succeed.
    #[must_use]
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            Self::Storage(_) => true,
            Self::Directory(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::Storage(err)
    }
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        EngineError::Directory(err)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised when validating engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the setting.
        field: &'static str,
        /// Rendered value that was supplied.
        value: String,
        /// Rendered minimum.
        min: String,
    },

    /// Two settings contradict each other.
    #[error("{field}: {message}")]
    Inconsistent {
        /// Name of the setting.
        field: &'static str,
        /// Description of the conflict.
        message: String,
    },
}
