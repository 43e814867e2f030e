//! Directory client abstraction.
//!
//! The engine never speaks a directory protocol itself. Password changes and
//! account lookups go through [`DirectoryClient`], which a deployment
//! implements against its LDAP/Active Directory connection. The engine treats
//! the directory as an unreliable remote: it does not retry, it surfaces the
//! failure and lets the next request try again.
//!
//! [`MemoryDirectory`] is an in-process implementation for tests and local
//! development.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors reported by a [`DirectoryClient`].
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DirectoryError {
    /// The directory could not be reached (network failure, bind failure,
    /// timeout).
    #[error("directory unreachable: {0}")]
    Unreachable(String),

    /// The service account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The directory refused the new password (policy, permissions).
    #[error("password change rejected: {0}")]
    Rejected(String),
}

impl DirectoryError {
    /// Creates a new `Unreachable` error.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    /// Creates a new `AccountNotFound` error.
    #[must_use]
    pub fn account_not_found(account: impl Into<String>) -> Self {
        Self::AccountNotFound(account.into())
    }

    /// Creates a new `Rejected` error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Returns `true` if the same call may succeed once the directory recovers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Password operations against the account directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Sets a new password on `account`.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the directory is unreachable, the
    /// account does not exist, or the password is refused.
    async fn update_password(&self, account: &str, new_password: &str)
    -> Result<(), DirectoryError>;

    /// Returns when the password of `account` was last changed.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the directory is unreachable or the
    /// account does not exist.
    async fn get_password_last_set(&self, account: &str) -> Result<DateTime<Utc>, DirectoryError>;
}

struct Account {
    password: Zeroizing<String>,
    last_set: DateTime<Utc>,
}

/// In-memory implementation of [`DirectoryClient`] for testing.
///
/// Accounts must be registered with [`add_account`](Self::add_account)
/// before they can be rotated. Every `update_password` call is counted, and
/// failures or latency can be injected to exercise error and race paths.
///
/// Clones share the same account table and counters.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    failure: Arc<Mutex<Option<DirectoryError>>>,
    delay: Arc<Mutex<Duration>>,
    updates: Arc<AtomicUsize>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `account` with an initial password set at `last_set`.
    pub fn add_account(&self, account: &str, password: &str, last_set: DateTime<Utc>) {
        self.accounts.write().insert(
            account.to_owned(),
            Account { password: Zeroizing::new(password.to_owned()), last_set },
        );
    }

    /// Returns the password currently set on `account`.
    #[must_use]
    pub fn password(&self, account: &str) -> Option<String> {
        self.accounts.read().get(account).map(|a| a.password.to_string())
    }

    /// Makes every subsequent call fail with `failure`, or clears it with `None`.
    pub fn set_failure(&self, failure: Option<DirectoryError>) {
        *self.failure.lock() = failure;
    }

    /// Adds artificial latency to `update_password`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Number of `update_password` calls received, successful or not.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn injected(&self) -> Result<(), DirectoryError> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    #[tracing::instrument(skip(self, new_password))]
    async fn update_password(
        &self,
        account: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.injected()?;

        let mut accounts = self.accounts.write();
        let entry =
            accounts.get_mut(account).ok_or_else(|| DirectoryError::account_not_found(account))?;
        entry.password = Zeroizing::new(new_password.to_owned());
        entry.last_set = Utc::now();
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_password_last_set(&self, account: &str) -> Result<DateTime<Utc>, DirectoryError> {
        self.injected()?;
        self.accounts
            .read()
            .get(account)
            .map(|a| a.last_set)
            .ok_or_else(|| DirectoryError::account_not_found(account))
    }
}
