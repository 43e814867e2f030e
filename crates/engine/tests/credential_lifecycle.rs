//! End-to-end credential lifecycle tests against in-memory storage and
//! directory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use dirsecrets_engine::{
    BackendConfig, CacheSettings, ConfigUpdate, Credential, CredentialStore, DirectoryError,
    EngineError, MemoryDirectory, RequestContext, SecretsBackend, request::RoleRequest,
};
use dirsecrets_storage::{MemoryBackend, StorageBackend};
use tokio::task::JoinSet;
use zeroize::Zeroizing;

/// Number of concurrent readers in the single-rotation test.
const CONCURRENCY: usize = 16;

const TTL_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    storage: MemoryBackend,
    directory: MemoryDirectory,
    backend: Arc<SecretsBackend>,
}

fn fixture_with(settings: BackendConfig) -> Fixture {
    let storage = MemoryBackend::new();
    let directory = MemoryDirectory::new();
    for account in ["svc-alice", "svc-bob", "svc-carol"] {
        directory.add_account(account, "initial", Utc::now());
    }
    let backend = SecretsBackend::new(
        Arc::new(storage.clone()),
        Arc::new(directory.clone()),
        settings,
    )
    .expect("valid settings");
    Fixture { storage, directory, backend: Arc::new(backend) }
}

async fn configured() -> Fixture {
    let f = fixture_with(BackendConfig::default());
    let ctx = RequestContext::new();
    f.backend
        .write_config(&ctx, ConfigUpdate { ttl_seconds: TTL_SECS, rsa_key_length: None })
        .await
        .expect("write config");
    for name in ["alice", "bob"] {
        write_role(&f, name, &format!("svc-{name}")).await;
    }
    f
}

async fn write_role(f: &Fixture, name: &str, account: &str) {
    f.backend
        .write_role(
            &RequestContext::new(),
            name,
            RoleRequest { service_account_name: account.to_owned(), ttl: None },
        )
        .await
        .expect("write role");
}

async fn seed_credential(f: &Fixture, role: &str, age: chrono::Duration) -> Credential {
    let credential = Credential {
        role_name: role.to_owned(),
        login: format!("svc-{role}"),
        current_secret: Zeroizing::new("initial".to_owned()),
        previous_secret: None,
        last_rotated_at: Utc::now() - age,
    };
    CredentialStore::new(Arc::new(f.storage.clone()))
        .write(&RequestContext::new(), &credential)
        .await
        .expect("seed credential");
    credential
}

// ---------------------------------------------------------------------------
// Rotation policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_credential_is_served_without_directory_call() {
    let f = configured().await;
    let seeded = seed_credential(&f, "alice", chrono::Duration::seconds(5)).await;

    let got = f
        .backend
        .read_credential(&RequestContext::new(), "alice")
        .await
        .expect("read")
        .expect("credential present");

    assert_eq!(*got, seeded);
    assert_eq!(f.directory.update_count(), 0);
}

#[tokio::test]
async fn first_read_issues_credential() {
    let f = configured().await;

    let got = f
        .backend
        .read_credential(&RequestContext::new(), "alice")
        .await
        .expect("read")
        .expect("credential present");

    assert_eq!(got.login, "svc-alice");
    assert_eq!(f.directory.password("svc-alice").as_deref(), Some(got.current_secret.as_str()));
    assert_eq!(f.directory.update_count(), 1);
    assert!(f.storage.is_sealed("creds/alice"));
}

#[tokio::test]
async fn repeated_reads_hit_the_cache() {
    let f = configured().await;
    let ctx = RequestContext::new();

    let first = f.backend.read_credential(&ctx, "alice").await.expect("read").expect("present");
    let second = f.backend.read_credential(&ctx, "alice").await.expect("read").expect("present");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(f.directory.update_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_of_stale_credential_rotate_once() {
    let f = configured().await;
    seed_credential(&f, "alice", chrono::Duration::hours(2)).await;
    f.directory.set_delay(Duration::from_millis(50));

    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let backend = Arc::clone(&f.backend);
        set.spawn(async move {
            backend
                .read_credential(&RequestContext::new(), "alice")
                .await
                .expect("read")
                .expect("credential present")
        });
    }

    let mut passwords = Vec::with_capacity(CONCURRENCY);
    while let Some(result) = set.join_next().await {
        let credential = result.expect("task should not panic");
        passwords.push(credential.current_secret.to_string());
    }

    assert_eq!(f.directory.update_count(), 1, "exactly one rotation expected");
    assert!(passwords.iter().all(|p| p == &passwords[0]), "all readers see the same password");
    assert_ne!(passwords[0], "initial");
}

#[tokio::test]
async fn role_ttl_overrides_configuration() {
    let f = configured().await;
    f.backend
        .write_role(
            &RequestContext::new(),
            "carol",
            RoleRequest { service_account_name: "svc-carol".to_owned(), ttl: Some(3600) },
        )
        .await
        .expect("write role");
    // Stale under the 60s config TTL, fresh under the role's 1h.
    let seeded = seed_credential(&f, "carol", chrono::Duration::minutes(10)).await;

    let got = f
        .backend
        .read_credential(&RequestContext::new(), "carol")
        .await
        .expect("read")
        .expect("present");

    assert_eq!(*got, seeded);
    assert_eq!(f.directory.update_count(), 0);
}

#[tokio::test]
async fn default_lease_ttl_applies_without_configuration() {
    let f = fixture_with(BackendConfig::builder().default_lease_ttl(Duration::from_secs(60)).build());
    write_role(&f, "alice", "svc-alice").await;

    let got = f.backend.read_credential(&RequestContext::new(), "alice").await.expect("read");

    assert!(got.is_some());
    assert_eq!(f.directory.update_count(), 1);
}

#[tokio::test]
async fn missing_ttl_source_is_not_configured() {
    let f = fixture_with(BackendConfig::default());
    write_role(&f, "alice", "svc-alice").await;

    let err = f.backend.read_credential(&RequestContext::new(), "alice").await.unwrap_err();

    assert!(matches!(err, EngineError::NotConfigured), "{err}");
    assert_eq!(f.directory.update_count(), 0);
}

#[tokio::test]
async fn unknown_role_has_no_credential() {
    let f = configured().await;
    let got = f.backend.read_credential(&RequestContext::new(), "nobody").await.expect("read");
    assert!(got.is_none());
}

#[tokio::test]
async fn directory_outage_keeps_previous_credential() {
    let f = configured().await;
    let seeded = seed_credential(&f, "alice", chrono::Duration::hours(2)).await;
    f.directory.set_failure(Some(DirectoryError::unreachable("ldap down")));
    let ctx = RequestContext::new();

    let err = f.backend.read_credential(&ctx, "alice").await.unwrap_err();
    assert!(err.is_dependency_failure());
    assert!(f.backend.credential_cache().get("alice").await.is_none());

    let stored = CredentialStore::new(Arc::new(f.storage.clone()))
        .read(&ctx, "alice")
        .await
        .expect("read")
        .expect("previous credential kept");
    assert_eq!(stored, seeded);

    f.directory.set_failure(None);
    let got = f.backend.read_credential(&ctx, "alice").await.expect("read").expect("present");
    assert_eq!(got.previous_secret.as_deref().map(String::as_str), Some("initial"));
}

#[tokio::test]
async fn cancelled_request_returns_promptly() {
    let f = configured().await;
    let ctx = RequestContext::new();
    ctx.cancel();

    let err = f.backend.read_credential(&ctx, "alice").await.unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(f.directory.update_count(), 0);
}

// ---------------------------------------------------------------------------
// Roles and cascades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_role_cascades_to_its_credential_only() {
    let f = configured().await;
    let ctx = RequestContext::new();
    f.backend.read_credential(&ctx, "alice").await.expect("read alice");
    f.backend.read_credential(&ctx, "bob").await.expect("read bob");

    f.backend.delete_role(&ctx, "bob").await.expect("delete bob");

    assert!(f.backend.credential_cache().get("bob").await.is_none());
    assert_eq!(f.storage.get("creds/bob").await.expect("get"), None);
    assert_eq!(f.storage.get("roles/bob").await.expect("get"), None);
    assert!(f.backend.credential_cache().get("alice").await.is_some());
    assert!(f.storage.get("creds/alice").await.expect("get").is_some());
    assert!(f.backend.read_credential(&ctx, "bob").await.expect("read").is_none());
    assert_eq!(f.backend.list_roles(&ctx).await.expect("list"), vec!["alice"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deleting_role_during_rotation_removes_rotated_credential() {
    let f = configured().await;
    f.directory.set_delay(Duration::from_millis(200));

    let reader = {
        let backend = Arc::clone(&f.backend);
        tokio::spawn(async move { backend.read_credential(&RequestContext::new(), "bob").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ctx = RequestContext::new();
    f.backend.delete_role(&ctx, "bob").await.expect("delete bob");
    reader.await.expect("task should not panic").expect("read");

    assert_eq!(f.directory.update_count(), 1);
    assert_eq!(f.storage.get("roles/bob").await.expect("get"), None);
    assert_eq!(f.storage.get("creds/bob").await.expect("get"), None);
    assert!(f.backend.credential_cache().get("bob").await.is_none());
    assert!(f.backend.read_credential(&ctx, "bob").await.expect("read").is_none());
}

#[tokio::test]
async fn changing_service_account_drops_credential() {
    let f = configured().await;
    let ctx = RequestContext::new();
    f.backend.read_credential(&ctx, "alice").await.expect("read");

    write_role(&f, "alice", "svc-carol").await;

    assert_eq!(f.storage.get("creds/alice").await.expect("get"), None);
    let got = f.backend.read_credential(&ctx, "alice").await.expect("read").expect("present");
    assert_eq!(got.login, "svc-carol");
    assert_eq!(got.previous_secret, None);
    assert_eq!(f.directory.update_count(), 2);
}

#[tokio::test]
async fn role_for_unknown_account_is_rejected() {
    let f = configured().await;
    let ctx = RequestContext::new();

    let err = f
        .backend
        .write_role(
            &ctx,
            "ghost",
            RoleRequest { service_account_name: "svc-ghost".to_owned(), ttl: None },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Directory(DirectoryError::AccountNotFound(_))), "{err}");
    assert!(f.backend.read_role(&ctx, "ghost").await.expect("read").is_none());
}

#[tokio::test]
async fn role_read_records_password_last_set() {
    let f = configured().await;
    let role = f
        .backend
        .read_role(&RequestContext::new(), "alice")
        .await
        .expect("read")
        .expect("present");

    assert_eq!(role.service_account_name, "svc-alice");
    assert!(role.password_last_set.is_some());
}

// ---------------------------------------------------------------------------
// Caches and invalidation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalidation_is_idempotent() {
    let f = configured().await;
    let ctx = RequestContext::new();
    let first = f.backend.read_credential(&ctx, "alice").await.expect("read").expect("present");
    f.backend.read_credential(&ctx, "bob").await.expect("read");

    f.backend.invalidate("creds/alice").await;
    f.backend.invalidate("creds/alice").await;

    assert!(f.backend.credential_cache().get("alice").await.is_none());
    assert!(f.backend.credential_cache().get("bob").await.is_some());

    // The durable credential is still fresh: reloaded, not rotated.
    let reloaded = f.backend.read_credential(&ctx, "alice").await.expect("read").expect("present");
    assert_eq!(*reloaded, *first);
    assert_eq!(f.directory.update_count(), 2);
}

#[tokio::test]
async fn role_invalidation_rereads_storage() {
    let f = configured().await;
    let ctx = RequestContext::new();
    f.backend.read_role(&ctx, "alice").await.expect("read");
    assert!(f.backend.role_cache().get("alice").await.is_some());

    f.backend.invalidate("roles/alice").await;

    assert!(f.backend.role_cache().get("alice").await.is_none());
    assert!(f.backend.read_role(&ctx, "alice").await.expect("read").is_some());
}

#[tokio::test]
async fn cached_entries_expire_without_invalidation() {
    let cache = CacheSettings::builder()
        .cleanup_interval(Duration::from_millis(20))
        .expiration(Duration::from_millis(30))
        .build()
        .expect("valid cache settings");
    let f = fixture_with(
        BackendConfig::builder()
            .default_lease_ttl(Duration::from_secs(3600))
            .cache(cache)
            .build(),
    );
    write_role(&f, "alice", "svc-alice").await;
    let ctx = RequestContext::new();
    f.backend.read_credential(&ctx, "alice").await.expect("read");
    assert!(f.backend.credential_cache().get("alice").await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(f.backend.credential_cache().get("alice").await.is_none());
    assert!(f.backend.role_cache().get("alice").await.is_none());
    f.backend.credential_cache().sync().await;
    assert_eq!(f.backend.credential_cache().entry_count(), 0);
}

#[tokio::test]
async fn shutdown_clears_caches() {
    let f = configured().await;
    let ctx = RequestContext::new();
    f.backend.read_credential(&ctx, "alice").await.expect("read");

    f.backend.shutdown().await;

    assert!(!f.backend.credential_cache().is_sweeping());
    assert!(!f.backend.role_cache().is_sweeping());
    assert!(f.backend.credential_cache().get("alice").await.is_none());
}
