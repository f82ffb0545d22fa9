#![allow(clippy::unwrap_used)]
// Integration tests for `SessionManager` using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tankless_api::{Error, MemoryTokenStore, SessionManager, TokenPair, TokenStore, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn jwt(expires_in_secs: i64) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({ "sub": "owner@example.com", "exp": Utc::now().timestamp() + expires_in_secs }),
        &jsonwebtoken::EncodingKey::from_secret(b"cloud-signing-key"),
    )
    .unwrap()
}

fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair {
        access_token: SecretString::from(access.to_owned()),
        refresh_token: SecretString::from(refresh.to_owned()),
    }
}

async fn setup(seed: Option<TokenPair>) -> (MockServer, Arc<MemoryTokenStore>, SessionManager) {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    if let Some(seed) = seed {
        store.save(&seed).unwrap();
    }
    let manager = SessionManager::new(
        Url::parse(&server.uri()).unwrap(),
        &TransportConfig::default(),
        store.clone(),
    )
    .unwrap();
    manager.restore().await.unwrap();
    (server, store, manager)
}

async fn mount_refresh(server: &MockServer, access: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": access, "refresh_token": "rotated" })),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_authenticate_reads_expiry_and_persists() {
    let (server, store, manager) = setup(None).await;
    let access = jwt(3600);

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "username": "owner", "password": "hunter2" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": access, "refresh_token": "r1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = manager
        .authenticate("owner", &SecretString::from("hunter2".to_owned()))
        .await
        .unwrap();

    let remaining = session.expires_at - Utc::now();
    assert!(remaining.num_seconds() > 3500);
    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.access_token.expose_secret(), access);
    assert_eq!(saved.refresh_token.expose_secret(), "r1");
}

#[tokio::test]
async fn test_authenticate_rejected() {
    let (server, _store, manager) = setup(None).await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let result = manager
        .authenticate("owner", &SecretString::from("wrong".to_owned()))
        .await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_no_session_and_no_credentials_is_auth_expired() {
    let (_server, _store, manager) = setup(None).await;
    let result = manager.get_valid_token().await;
    assert!(matches!(result, Err(Error::AuthExpired)), "got: {result:?}");
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_token_is_returned_without_refresh() {
    let access = jwt(3600);
    let (server, _store, manager) = setup(Some(pair(&access, "r1"))).await;
    mount_refresh(&server, &jwt(3600), 0).await;

    let token = manager.get_valid_token().await.unwrap();
    assert_eq!(token.expose_secret(), access);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let (server, store, manager) = setup(Some(pair(&jwt(120), "r1"))).await;
    let renewed = jwt(3600);
    mount_refresh(&server, &renewed, 1).await;

    let manager = Arc::new(manager);
    let calls = (0..8).map(|_| {
        let manager = manager.clone();
        async move { manager.get_valid_token().await }
    });
    let tokens = futures_util::future::join_all(calls).await;

    for token in tokens {
        assert_eq!(token.unwrap().expose_secret(), renewed);
    }
    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.refresh_token.expose_secret(), "rotated");
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let (server, store, manager) = setup(Some(pair(&jwt(60), "keep-me"))).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refresh_token": "keep-me" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": jwt(3600) })))
        .expect(1)
        .mount(&server)
        .await;

    manager.refresh().await.unwrap();
    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.refresh_token.expose_secret(), "keep-me");
}

#[tokio::test]
async fn test_transient_refresh_failure_uses_unexpired_token() {
    let access = jwt(120);
    let (server, _store, manager) = setup(Some(pair(&access, "r1"))).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let token = manager.get_valid_token().await.unwrap();
    assert_eq!(token.expose_secret(), access);
}

#[tokio::test]
async fn test_rejected_refresh_without_password_expires_session() {
    let (server, _store, manager) = setup(Some(pair(&jwt(60), "dead"))).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let first = manager.get_valid_token().await;
    assert!(matches!(first, Err(Error::AuthExpired)), "got: {first:?}");
    // The session is gone; later callers fail without another round-trip.
    let second = manager.get_valid_token().await;
    assert!(matches!(second, Err(Error::AuthExpired)), "got: {second:?}");
}

#[tokio::test]
async fn test_rejected_refresh_relogs_with_stored_password() {
    let (server, _store, manager) = setup(Some(pair(&jwt(60), "dead"))).await;
    manager
        .remember_credentials("owner", SecretString::from("hunter2".to_owned()))
        .await;
    let relogged = jwt(3600);

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": relogged, "refresh_token": "r2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = manager.get_valid_token().await.unwrap();
    assert_eq!(token.expose_secret(), relogged);
}

#[tokio::test]
async fn test_force_refresh_skips_when_already_rotated() {
    let current = jwt(3600);
    let (server, _store, manager) = setup(Some(pair(&current, "r1"))).await;
    mount_refresh(&server, &jwt(3600), 0).await;

    let stale = SecretString::from(jwt(10));
    let token = manager.force_refresh(&stale).await.unwrap();
    assert_eq!(token.expose_secret(), current);
}

#[tokio::test]
async fn test_force_refresh_rotates_rejected_token() {
    let current = jwt(3600);
    let (server, _store, manager) = setup(Some(pair(&current, "r1"))).await;
    let renewed = jwt(7200);
    mount_refresh(&server, &renewed, 1).await;

    let token = manager
        .force_refresh(&SecretString::from(current))
        .await
        .unwrap();
    assert_eq!(token.expose_secret(), renewed);
}

// ── Persistence ─────────────────────────────────────────────────────

/// A store whose writes take as long as a slow disk.
struct SlowStore {
    inner: MemoryTokenStore,
    delay: Duration,
}

impl TokenStore for SlowStore {
    fn load(&self) -> Result<Option<TokenPair>, Error> {
        self.inner.load()
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), Error> {
        std::thread::sleep(self.delay);
        self.inner.save(tokens)
    }
}

#[tokio::test]
async fn test_slow_token_store_does_not_stall_runtime() {
    let server = MockServer::start().await;
    let store = Arc::new(SlowStore {
        inner: MemoryTokenStore::new(),
        delay: Duration::from_millis(300),
    });
    let manager = SessionManager::new(
        Url::parse(&server.uri()).unwrap(),
        &TransportConfig::default(),
        store.clone(),
    )
    .unwrap();
    let access = jwt(3600);
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": access, "refresh_token": "r1" })),
        )
        .mount(&server)
        .await;

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = tokio::spawn({
        let ticks = Arc::clone(&ticks);
        async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    manager
        .authenticate("owner", &SecretString::from("hunter2".to_owned()))
        .await
        .unwrap();
    ticker.abort();

    // The save ran off the runtime thread, so the ticker kept going.
    let ticks = ticks.load(Ordering::Relaxed);
    assert!(ticks >= 10, "runtime stalled during save: {ticks} ticks");
    let saved = store.inner.load().unwrap().unwrap();
    assert_eq!(saved.access_token.expose_secret(), access);
}
