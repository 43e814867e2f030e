//! Tests for request decoding and path dispatch through
//! `SecretsBackend::handle`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use dirsecrets_engine::{
    BackendConfig, EngineError, MemoryDirectory, RequestContext, SecretsBackend,
    request::{ConfigResponse, ListResponse, Operation, Request, Response},
};
use dirsecrets_storage::MemoryBackend;
use rstest::rstest;
use serde_json::json;

fn backend(default_lease_ttl: Option<Duration>) -> SecretsBackend {
    let directory = MemoryDirectory::new();
    directory.add_account("svc-app", "initial", Utc::now());
    directory.add_account("svc-web", "initial", Utc::now());
    SecretsBackend::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(directory),
        BackendConfig::builder().maybe_default_lease_ttl(default_lease_ttl).build(),
    )
    .expect("valid settings")
}

async fn send(
    backend: &SecretsBackend,
    operation: Operation,
    path: &str,
    data: serde_json::Value,
) -> Result<Option<Response>, EngineError> {
    backend.handle(&RequestContext::new(), Request::new(operation, path).with_data(data)).await
}

fn config(ttl: u64, rsa_key_length: u32) -> Option<Response> {
    Some(Response::Config(ConfigResponse { ttl, rsa_key_length }))
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_round_trip_and_delete() {
    let b = backend(None);

    assert_eq!(send(&b, Operation::Read, "config", json!(null)).await.unwrap(), None);

    send(&b, Operation::Update, "config", json!({"ttl": 120, "rsa_key_length": 4096}))
        .await
        .unwrap();
    assert_eq!(send(&b, Operation::Read, "config", json!(null)).await.unwrap(), config(120, 4096));

    send(&b, Operation::Delete, "config", json!(null)).await.unwrap();
    assert_eq!(send(&b, Operation::Read, "config", json!(null)).await.unwrap(), None);
}

#[tokio::test]
async fn config_response_serializes_flat() {
    let b = backend(None);
    let written =
        send(&b, Operation::Create, "config", json!({"ttl": 120})).await.unwrap().unwrap();

    assert_eq!(serde_json::to_value(written).unwrap(), json!({"ttl": 120, "rsa_key_length": 4096}));
}

#[tokio::test]
async fn rsa_path_aliases_config() {
    let b = backend(None);

    send(&b, Operation::Update, "rsa", json!({"ttl": 30, "rsa_key_length": 2048})).await.unwrap();

    assert_eq!(send(&b, Operation::Read, "config", json!(null)).await.unwrap(), config(30, 2048));
    assert_eq!(send(&b, Operation::Read, "rsa", json!(null)).await.unwrap(), config(30, 2048));
}

#[tokio::test]
async fn zero_ttl_resolves_to_default_lease() {
    let b = backend(Some(Duration::from_secs(3600)));

    let written = send(&b, Operation::Update, "config", json!({"ttl": 0})).await.unwrap();

    assert_eq!(written, config(3600, 4096));
}

#[rstest]
#[case::zero_without_default(json!({"ttl": 0}))]
#[case::omitted_without_default(json!({}))]
#[case::negative(json!({"ttl": -10}))]
#[tokio::test]
async fn rejected_ttl_keeps_prior_config(#[case] data: serde_json::Value) {
    let b = backend(None);
    send(&b, Operation::Update, "config", json!({"ttl": 120})).await.unwrap();

    let err = send(&b, Operation::Update, "config", data).await.unwrap_err();

    assert!(matches!(err, EngineError::Validation { field: "ttl", .. }), "{err}");
    assert!(err.is_user_error());
    assert_eq!(send(&b, Operation::Read, "config", json!(null)).await.unwrap(), config(120, 4096));
}

#[tokio::test]
async fn unknown_config_field_is_invalid_request() {
    let b = backend(None);

    let err = send(&b, Operation::Update, "config", json!({"ttl": 60, "max_ttl": 90}))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidRequest(_)), "{err}");
    assert_eq!(send(&b, Operation::Read, "config", json!(null)).await.unwrap(), None);
}

// ---------------------------------------------------------------------------
// Roles and credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn role_crud_and_listing() {
    let b = backend(Some(Duration::from_secs(3600)));

    for (name, account) in [("web", "svc-web"), ("app", "svc-app")] {
        send(&b, Operation::Create, &format!("roles/{name}"), json!({"service_account_name": account}))
            .await
            .unwrap();
    }

    let listed = send(&b, Operation::List, "roles/", json!(null)).await.unwrap();
    assert_eq!(listed, Some(Response::List(ListResponse { keys: vec!["app".into(), "web".into()] })));
    assert_eq!(send(&b, Operation::List, "roles", json!(null)).await.unwrap(), listed);

    let Some(Response::Role(role)) = send(&b, Operation::Read, "roles/app", json!(null)).await.unwrap()
    else {
        panic!("expected a role response");
    };
    assert_eq!(role.service_account_name, "svc-app");
    assert_eq!(role.ttl, None);
    assert!(role.password_last_set.is_some());

    send(&b, Operation::Delete, "roles/app", json!(null)).await.unwrap();
    assert_eq!(send(&b, Operation::Read, "roles/app", json!(null)).await.unwrap(), None);
}

#[tokio::test]
async fn creds_read_returns_login_and_passwords() {
    let b = backend(Some(Duration::from_secs(3600)));
    send(&b, Operation::Update, "roles/app", json!({"service_account_name": "svc-app", "ttl": 600}))
        .await
        .unwrap();

    let Some(Response::Creds(creds)) = send(&b, Operation::Read, "creds/app", json!(null)).await.unwrap()
    else {
        panic!("expected a creds response");
    };

    assert_eq!(creds.login, "svc-app");
    assert!(creds.password.starts_with("?@09AZ"));
    assert_eq!(creds.last_password, None);
    assert_eq!(send(&b, Operation::Read, "creds/missing", json!(null)).await.unwrap(), None);
}

#[tokio::test]
async fn role_payload_is_validated() {
    let b = backend(None);

    let err = send(&b, Operation::Update, "roles/app", json!({"service_account": "svc-app"}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)), "{err}");

    let err = send(&b, Operation::Update, "roles/app", json!({"service_account_name": "svc-app", "ttl": -1}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { field: "ttl", .. }), "{err}");
}

#[rstest]
#[case::unknown_path(Operation::Read, "sys/health")]
#[case::nested_role(Operation::Read, "roles/team/app")]
#[case::dot_role(Operation::Read, "roles/..")]
#[case::creds_delete(Operation::Delete, "creds/app")]
#[case::creds_write(Operation::Update, "creds/app")]
#[case::config_list(Operation::List, "config")]
#[case::roles_read(Operation::Read, "roles/")]
#[case::creds_root(Operation::Read, "creds/")]
#[tokio::test]
async fn unsupported_paths_are_rejected(#[case] operation: Operation, #[case] path: &str) {
    let b = backend(None);

    let err = send(&b, operation, path, json!(null)).await.unwrap_err();

    assert!(
        matches!(&err, EngineError::UnsupportedPath { path: p, .. } if p == path),
        "{err}"
    );
}
