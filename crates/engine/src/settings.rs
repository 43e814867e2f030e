//! Backend settings supplied by the host at mount time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{cache::CacheSettings, error::ConfigError};

/// Settings for a [`SecretsBackend`](crate::SecretsBackend).
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use dirsecrets_engine::BackendConfig;
/// let config = BackendConfig::builder()
///     .default_lease_ttl(Duration::from_secs(3600))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// System-wide default lease TTL of the host. Used when a configuration
    /// update requests a TTL of 0 and when nothing else supplies one.
    #[serde(default, with = "humantime_serde")]
    pub default_lease_ttl: Option<Duration>,

    /// Role and credential cache settings.
    #[serde(default)]
    #[builder(default)]
    pub cache: CacheSettings,
}

impl BackendConfig {
    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the cache settings are invalid or the
    /// default lease TTL is shorter than one second.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ttl) = self.default_lease_ttl
            && ttl < Duration::from_secs(1)
        {
            return Err(ConfigError::BelowMinimum {
                field: "default_lease_ttl",
                value: format!("{}ms", ttl.as_millis()),
                min: "1s".to_owned(),
            });
        }
        self.cache.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BackendConfig::builder().build();
        assert_eq!(config, BackendConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.default_lease_ttl, None);
    }

    #[test]
    fn deserializes_humantime_durations() {
        let config: BackendConfig = serde_json::from_str(
            r#"{"default_lease_ttl":"1h","cache":{"cleanup_interval":"100ms","expiration":"150ms"}}"#,
        )
        .unwrap();

        assert_eq!(config.default_lease_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(config.cache.expiration(), Duration::from_millis(150));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<BackendConfig>(r#"{"default_ttl":"1h"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn subsecond_default_lease_is_rejected() {
        let config = BackendConfig::builder().default_lease_ttl(Duration::from_millis(500)).build();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::BelowMinimum { field: "default_lease_ttl", .. }));
    }
}
