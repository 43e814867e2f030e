//! Short-lived in-memory caches for roles and credentials.
//!
//! [`ExpiringCache`] wraps a [`moka`] cache with a fixed, sub-second
//! time-to-live and an owned sweeper task that evicts expired entries on a
//! fixed interval.
//!
//! # Design
//!
//! - **Hard expiry**: moka never returns an entry older than the configured expiration, whether or
//!   not the sweeper has run yet.
//! - **Deterministic invalidation**: [`invalidate`](ExpiringCache::invalidate) removes an entry
//!   immediately regardless of its age.
//! - **Owned sweeper**: the cleanup task is started by the constructor and stopped by
//!   [`shutdown`](ExpiringCache::shutdown) or when the cache is dropped. It never outlives its
//!   owner.
//! - **Advisory**: a miss is never an error. Callers fall back to storage.
//!
//! # Usage
//!
//! ```no_run
//! # use std::time::Duration;
//! # use dirsecrets_engine::cache::{CacheSettings, ExpiringCache};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = CacheSettings::builder()
//!     .cleanup_interval(Duration::from_millis(500))
//!     .expiration(Duration::from_millis(750))
//!     .build()?;
//! let cache: ExpiringCache<u32> = ExpiringCache::new("example", &settings);
//!
//! cache.insert("answer", 42).await;
//! assert_eq!(cache.get("answer").await, Some(42));
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use moka::future::Cache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ConfigError;

// ───────────────────────────────────────────────────────────────────────────
// CacheSettings
// ───────────────────────────────────────────────────────────────────────────

/// Default interval between cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(500);

/// Default entry lifetime (1.5× the cleanup interval).
pub const DEFAULT_EXPIRATION: Duration = Duration::from_millis(750);

/// Default maximum number of cache entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Timing and capacity settings shared by the role and credential caches.
///
/// # Validation
///
/// - `cleanup_interval` must be non-zero
/// - `expiration` must be >= `cleanup_interval`
/// - `max_entries` must be >= 1
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use dirsecrets_engine::cache::CacheSettings;
/// let settings = CacheSettings::builder()
///     .cleanup_interval(Duration::from_millis(200))
///     .expiration(Duration::from_millis(300))
///     .build()
///     .expect("valid settings");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Interval between cleanup sweeps.
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    cleanup_interval: Duration,

    /// Lifetime of an entry after insertion.
    #[serde(with = "humantime_serde", default = "default_expiration")]
    expiration: Duration,

    /// Maximum number of entries per cache.
    #[serde(default = "default_max_entries")]
    max_entries: u64,
}

fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

fn default_expiration() -> Duration {
    DEFAULT_EXPIRATION
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            expiration: DEFAULT_EXPIRATION,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheSettings {
    /// Starts building settings from the defaults.
    pub fn builder() -> CacheSettingsBuilder {
        CacheSettingsBuilder { settings: Self::default() }
    }

    /// Returns the interval between cleanup sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Returns the entry lifetime.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Returns the maximum number of entries.
    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Checks the invariants listed on the type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "cleanup_interval",
                value: "0ms".to_owned(),
                min: "1ms".to_owned(),
            });
        }
        if self.expiration < self.cleanup_interval {
            return Err(ConfigError::Inconsistent {
                field: "expiration",
                message: format!(
                    "expiration ({}ms) must not be shorter than cleanup_interval ({}ms)",
                    self.expiration.as_millis(),
                    self.cleanup_interval.as_millis()
                ),
            });
        }
        if self.max_entries == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_entries",
                value: self.max_entries.to_string(),
                min: "1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Builder for [`CacheSettings`].
pub struct CacheSettingsBuilder {
    settings: CacheSettings,
}

impl CacheSettingsBuilder {
    /// Sets the interval between cleanup sweeps.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.settings.cleanup_interval = interval;
        self
    }

    /// Sets the entry lifetime.
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.settings.expiration = expiration;
        self
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.settings.max_entries = max_entries;
        self
    }

    /// Builds the settings, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any invariant is violated.
    pub fn build(self) -> Result<CacheSettings, ConfigError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// ───────────────────────────────────────────────────────────────────────────
// ExpiringCache
// ───────────────────────────────────────────────────────────────────────────

/// A concurrent, time-bounded cache keyed by string.
///
/// All operations are internally synchronized; `get`, `insert` and
/// `invalidate` may be called from any number of tasks.
pub struct ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Name used in log events ("roles", "creds").
    name: &'static str,
    entries: Cache<String, V>,
    /// Stops the sweeper.
    cancel_token: CancellationToken,
    /// Wrapped in `Mutex` so `shutdown()` can take ownership via `&self`.
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates the cache and starts its cleanup sweeper.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn new(name: &'static str, settings: &CacheSettings) -> Self {
        let entries = Cache::builder()
            .max_capacity(settings.max_entries)
            .time_to_live(settings.expiration)
            .build();
        let cancel_token = CancellationToken::new();

        let sweeper = tokio::spawn(Self::sweep(
            name,
            entries.clone(),
            settings.cleanup_interval,
            cancel_token.clone(),
        ));

        Self { name, entries, cancel_token, sweeper: Mutex::new(Some(sweeper)) }
    }

    /// Background loop evicting expired entries every `interval`.
    async fn sweep(
        name: &'static str,
        entries: Cache<String, V>,
        interval: Duration,
        token: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; consume it so we start
        // with a full interval wait.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(cache = name, "cache sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    entries.run_pending_tasks().await;
                    trace!(cache = name, entries = entries.entry_count(), "cache sweep complete");
                }
            }
        }
    }

    /// Returns the cached value for `key`, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let value = self.entries.get(key).await;
        trace!(cache = self.name, key, hit = value.is_some(), "cache lookup");
        value
    }

    /// Inserts or replaces the value for `key`, restarting its lifetime.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value).await;
    }

    /// Removes `key` immediately. Removing an absent key is a no-op.
    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
        trace!(cache = self.name, key, "cache entry invalidated");
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Returns the approximate number of entries.
    ///
    /// Note: This count is eventually consistent. For accurate counts in tests,
    /// call `sync` first.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns `true` while the sweeper task is running.
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the sweeper and clears the cache.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(cache = self.name, error = %err, "cache sweeper panicked");
        }
        self.entries.invalidate_all();
    }

    /// Applies pending inserts, invalidations and evictions.
    ///
    /// Call this before checking entry counts in tests.
    pub async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl<V> Drop for ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
