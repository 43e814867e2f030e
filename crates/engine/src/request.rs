//! Request decoding and response shapes.
//!
//! Requests arrive from the host as an operation, a path and a loosely typed
//! JSON payload. The payload is decoded into a typed request struct at the
//! boundary; nothing past this module sees raw JSON.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::{
    config::{ConfigUpdate, Configuration},
    credential::Credential,
    error::{EngineError, Result},
    role::Role,
};

/// Operation requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Read a record.
    Read,
    /// Create a record. Handled like [`Operation::Update`].
    Create,
    /// Create or replace a record.
    Update,
    /// Delete a record.
    Delete,
    /// List child keys.
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// A client request as handed over by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Requested operation.
    pub operation: Operation,
    /// Path relative to the backend mount, e.g. `roles/app`.
    pub path: String,
    /// Request payload. `Null` is treated as an empty object.
    pub data: Value,
}

impl Request {
    /// Creates a request without payload.
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self { operation, path: path.into(), data: Value::Null }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Decodes a request payload into `T`.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRequest`] if the payload has unknown fields,
/// wrong types or misses required fields.
pub fn decode<T: DeserializeOwned>(data: &Value) -> Result<T> {
    let data = match data {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(data).map_err(|e| EngineError::InvalidRequest(e.to_string()))
}

// ───────────────────────────────────────────────────────────────────────────
// Requests
// ───────────────────────────────────────────────────────────────────────────

/// Payload of a configuration update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigRequest {
    /// Credential TTL in seconds; `0` selects the host default lease TTL.
    #[serde(default)]
    pub ttl: i64,

    /// RSA key length.
    #[serde(default)]
    pub rsa_key_length: Option<u32>,
}

impl From<ConfigRequest> for ConfigUpdate {
    fn from(request: ConfigRequest) -> Self {
        ConfigUpdate { ttl_seconds: request.ttl, rsa_key_length: request.rsa_key_length }
    }
}

/// Payload of a role write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRequest {
    /// Directory account managed by the role.
    pub service_account_name: String,

    /// Rotation TTL override in seconds.
    #[serde(default)]
    pub ttl: Option<i64>,
}

impl RoleRequest {
    /// Builds the role `name` described by this request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a non-positive TTL.
    pub fn into_role(self, name: &str) -> Result<Role> {
        let ttl = match self.ttl {
            None => None,
            Some(secs) if secs >= 1 => Some(Duration::from_secs(secs.unsigned_abs())),
            Some(_) => return Err(EngineError::validation("ttl", "ttl must be positive")),
        };
        Ok(Role {
            name: name.to_owned(),
            service_account_name: self.service_account_name,
            ttl,
            password_last_set: None,
        })
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Responses
// ───────────────────────────────────────────────────────────────────────────

/// Configuration as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigResponse {
    /// TTL in seconds.
    pub ttl: u64,
    /// RSA key length.
    pub rsa_key_length: u32,
}

impl From<&Configuration> for ConfigResponse {
    fn from(config: &Configuration) -> Self {
        Self { ttl: config.ttl.as_secs(), rsa_key_length: config.rsa_key_length }
    }
}

/// Credential as returned to clients.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CredsResponse {
    /// Directory login.
    pub login: String,
    /// Current password.
    pub password: Zeroizing<String>,
    /// Password before the last rotation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_password: Option<Zeroizing<String>>,
}

impl From<&Credential> for CredsResponse {
    fn from(credential: &Credential) -> Self {
        Self {
            login: credential.login.clone(),
            password: credential.current_secret.clone(),
            last_password: credential.previous_secret.clone(),
        }
    }
}

impl fmt::Debug for CredsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredsResponse")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("last_password", &self.last_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Role as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleResponse {
    /// Directory account managed by the role.
    pub service_account_name: String,
    /// Rotation TTL override in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Password change time reported by the directory at role write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_last_set: Option<DateTime<Utc>>,
}

impl From<&Role> for RoleResponse {
    fn from(role: &Role) -> Self {
        Self {
            service_account_name: role.service_account_name.clone(),
            ttl: role.ttl.map(|ttl| ttl.as_secs()),
            password_last_set: role.password_last_set,
        }
    }
}

/// Key listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResponse {
    /// Child keys in sorted order.
    pub keys: Vec<String>,
}

/// Response body of a handled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// Body of a configuration read or write.
    Config(ConfigResponse),
    /// Body of a credential read.
    Creds(CredsResponse),
    /// Body of a role read.
    Role(RoleResponse),
    /// Body of a listing.
    List(ListResponse),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn null_payload_decodes_to_defaults() {
        let request: ConfigRequest = decode(&Value::Null).unwrap();
        assert_eq!(request, ConfigRequest { ttl: 0, rsa_key_length: None });
    }

    #[rstest]
    #[case::unknown_field(json!({"ttl": 60, "ttl_seconds": 60}))]
    #[case::wrong_type(json!({"ttl": "sixty"}))]
    #[case::negative_key_length(json!({"rsa_key_length": -1}))]
    fn malformed_config_is_invalid_request(#[case] data: Value) {
        let err = decode::<ConfigRequest>(&data).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)), "{err}");
    }

    #[test]
    fn role_request_requires_account() {
        let err = decode::<RoleRequest>(&json!({"ttl": 60})).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[rstest]
    #[case::unset(None, Ok(None))]
    #[case::positive(Some(300), Ok(Some(Duration::from_secs(300))))]
    #[case::zero(Some(0), Err(()))]
    #[case::negative(Some(-1), Err(()))]
    fn role_request_ttl(#[case] ttl: Option<i64>, #[case] expected: std::result::Result<Option<Duration>, ()>) {
        let request = RoleRequest { service_account_name: "svc-app".to_owned(), ttl };
        let result = request.into_role("app").map(|role| role.ttl).map_err(|_| ());
        assert_eq!(result, expected);
    }

    #[test]
    fn creds_response_serializes_passwords() {
        let response = CredsResponse {
            login: "svc-app".to_owned(),
            password: Zeroizing::new("new".to_owned()),
            last_password: Some(Zeroizing::new("old".to_owned())),
        };

        assert_eq!(
            serde_json::to_value(Response::Creds(response.clone())).unwrap(),
            json!({"login": "svc-app", "password": "new", "last_password": "old"})
        );
        assert!(!format!("{response:?}").contains("new"));
    }

    #[test]
    fn operation_display_matches_serde() {
        for op in [Operation::Read, Operation::Create, Operation::Update, Operation::Delete, Operation::List] {
            assert_eq!(serde_json::to_value(op).unwrap(), json!(op.to_string()));
        }
    }
}
