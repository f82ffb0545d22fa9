// Cloud session management
//
// Owns the single live token pair for an account. Expiry comes from the
// access token's JWT `exp` claim and refresh is proactive once less than
// `REFRESH_MARGIN` remains. The whole session sits behind one async mutex
// that is held across the refresh round-trip, so concurrent callers queue
// behind an in-flight refresh and then see its result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::transport::{TransportConfig, request_error};

/// Refresh when less than this much lifetime remains on the access token.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

// ── Token persistence ───────────────────────────────────────────────

/// The access/refresh pair as handed to durable storage.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

/// Durable storage for the token pair, so a restart can skip the password login.
///
/// The session manager calls both methods on tokio's blocking pool, so
/// implementations may do plain synchronous file I/O.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, Error>;
    fn save(&self, tokens: &TokenPair) -> Result<(), Error>;
}

/// In-process store. Useful for tests and for callers that never persist.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: std::sync::Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, Error> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| Error::TokenStore("memory store poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), Error> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| Error::TokenStore("memory store poisoned".into()))?;
        *guard = Some(tokens.clone());
        Ok(())
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// One authenticated cloud session.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the `exp` claim without verifying the signature; the client is not
/// the token's audience and has no key to check it with.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, Error> {
    let mut validation = jsonwebtoken::Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(&[]),
        &validation,
    )
    .map_err(|e| Error::Authentication {
        message: format!("access token is not a readable JWT: {e}"),
    })?;

    DateTime::from_timestamp(data.claims.exp, 0).ok_or_else(|| Error::Authentication {
        message: format!("access token exp out of range: {}", data.claims.exp),
    })
}

impl Session {
    pub fn from_pair(pair: TokenPair) -> Result<Self, Error> {
        let expires_at = token_expiry(pair.access_token.expose_secret())?;
        Ok(Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_at,
        })
    }

    /// Remaining lifetime is under the refresh margin (or already gone).
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < REFRESH_MARGIN
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

// ── Manager ─────────────────────────────────────────────────────────

struct Credentials {
    username: String,
    password: SecretString,
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    credentials: Option<Credentials>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Owns the account's session and serialises every refresh.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    store: Arc<dyn TokenStore>,
    state: Mutex<State>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url: crate::cloud::normalize_base_url(base_url),
            timeout: transport.timeout,
            store,
            state: Mutex::new(State::default()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Bound applied to every cloud round-trip made with [`Self::http`].
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Remember a password for automatic re-login when the refresh token dies.
    pub async fn remember_credentials(&self, username: &str, password: SecretString) {
        self.state.lock().await.credentials = Some(Credentials {
            username: username.to_owned(),
            password,
        });
    }

    /// Restore a previously persisted token pair. Returns `false` when the
    /// store is empty or its contents are unusable.
    pub async fn restore(&self) -> Result<bool, Error> {
        let store = Arc::clone(&self.store);
        let loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| Error::TokenStore(format!("load task failed: {e}")))?;
        let Some(pair) = loaded? else {
            return Ok(false);
        };
        match Session::from_pair(pair) {
            Ok(session) => {
                debug!(expires_at = %session.expires_at, "restored persisted session");
                self.state.lock().await.session = Some(session);
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "ignoring persisted tokens");
                Ok(false)
            }
        }
    }

    /// Password login. Replaces any existing session.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Session, Error> {
        let mut state = self.state.lock().await;
        let session = self.login(username, password).await?;
        state.credentials = Some(Credentials {
            username: username.to_owned(),
            password: password.clone(),
        });
        self.persist(&session).await;
        state.session = Some(session.clone());
        info!(expires_at = %session.expires_at, "authenticated");
        Ok(session)
    }

    /// A usable access token, refreshing first when inside the margin.
    ///
    /// If the refresh fails transiently while the current token has not yet
    /// expired, the current token is returned and the refresh is retried on
    /// the next call.
    pub async fn get_valid_token(&self) -> Result<SecretString, Error> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(session) = state.session.as_ref() {
            if !session.needs_refresh(now) {
                return Ok(session.access_token.clone());
            }
        }

        match self.refresh_locked(&mut state).await {
            Ok(session) => Ok(session.access_token),
            Err(e) if !e.is_auth_expired() => match state.session.as_ref() {
                Some(current) if !current.is_expired(now) => {
                    warn!(error = %e, "token refresh failed, using current token");
                    Ok(current.access_token.clone())
                }
                _ => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Refresh unconditionally.
    pub async fn refresh(&self) -> Result<Session, Error> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Refresh after the cloud rejected `rejected`. If another caller has
    /// already rotated the token, the rotated one is returned without I/O.
    pub async fn force_refresh(&self, rejected: &SecretString) -> Result<SecretString, Error> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.session.as_ref() {
            if current.access_token.expose_secret() != rejected.expose_secret() {
                debug!("token already rotated by a concurrent refresh");
                return Ok(current.access_token.clone());
            }
        }
        self.refresh_locked(&mut state)
            .await
            .map(|session| session.access_token)
    }

    /// Expiry of the live session, if any.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.session.as_ref().map(|s| s.expires_at)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn refresh_locked(&self, state: &mut State) -> Result<Session, Error> {
        let Some(current) = state.session.as_ref() else {
            return self.relogin_locked(state).await;
        };

        let url = self.base_url.join("auth/refresh")?;
        debug!("refreshing session at {url}");
        let resp = self
            .http
            .post(url)
            .json(&json!({ "refresh_token": current.refresh_token.expose_secret() }))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = resp.status();
        if matches!(status.as_u16(), 400 | 401 | 403) {
            warn!(status = status.as_u16(), "refresh token rejected");
            state.session = None;
            return self.relogin_locked(state).await;
        }
        let tokens: TokenResponse = parse_token_response(resp, self.timeout).await?;

        let refresh_token = tokens
            .refresh_token
            .map_or_else(|| current.refresh_token.clone(), SecretString::from);
        let session = Session::from_pair(TokenPair {
            access_token: SecretString::from(tokens.access_token),
            refresh_token,
        })?;

        self.persist(&session).await;
        debug!(expires_at = %session.expires_at, "session refreshed");
        state.session = Some(session.clone());
        Ok(session)
    }

    /// Fall back to a password login when one is remembered; otherwise the
    /// session is gone for good.
    async fn relogin_locked(&self, state: &mut State) -> Result<Session, Error> {
        let Some(creds) = state.credentials.as_ref() else {
            return Err(Error::AuthExpired);
        };
        info!(username = %creds.username, "re-authenticating with stored credentials");
        match self.login(&creds.username, &creds.password).await {
            Ok(session) => {
                self.persist(&session).await;
                state.session = Some(session.clone());
                Ok(session)
            }
            Err(Error::Authentication { message }) => {
                warn!(%message, "stored credentials rejected");
                state.credentials = None;
                Err(Error::AuthExpired)
            }
            Err(e) => Err(e),
        }
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<Session, Error> {
        let url = self.base_url.join("auth/login")?;
        debug!("logging in at {url}");
        let resp = self
            .http
            .post(url)
            .json(&json!({
                "username": username,
                "password": password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = resp.status();
        if matches!(status.as_u16(), 400 | 401 | 403) {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {}", excerpt(&body)),
            });
        }
        let tokens = parse_token_response(resp, self.timeout).await?;
        let refresh_token = tokens.refresh_token.ok_or_else(|| Error::Authentication {
            message: "login response carried no refresh token".into(),
        })?;
        Session::from_pair(TokenPair {
            access_token: SecretString::from(tokens.access_token),
            refresh_token: SecretString::from(refresh_token),
        })
    }

    async fn persist(&self, session: &Session) {
        let store = Arc::clone(&self.store);
        let pair = session.pair();
        match tokio::task::spawn_blocking(move || store.save(&pair)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist refreshed tokens"),
            Err(e) => warn!(error = %e, "token persistence task failed"),
        }
    }
}

async fn parse_token_response(
    resp: reqwest::Response,
    timeout: Duration,
) -> Result<TokenResponse, Error> {
    let status = resp.status();
    if status.as_u16() == 429 {
        return Err(Error::RateLimited {
            retry_after_secs: crate::cloud::retry_after(resp.headers()),
        });
    }
    let body = resp.text().await.map_err(|e| request_error(e, timeout))?;
    if !status.is_success() {
        return Err(Error::Remote {
            status: status.as_u16(),
            message: excerpt(&body).to_owned(),
        });
    }
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: excerpt(&body).to_owned(),
    })
}

/// At most 200 bytes of a response body, cut on a char boundary.
pub(crate) fn excerpt(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
