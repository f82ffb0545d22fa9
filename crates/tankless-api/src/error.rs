use thiserror::Error;

/// Top-level error type for the `tankless-api` crate.
///
/// Covers every failure mode of both transports: session auth, cloud
/// HTTP, and the local TCP control port. `tankless-core` classifies
/// these into circuit-breaker input and user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login was rejected (wrong credentials, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The session can no longer be renewed -- re-authentication required.
    #[error("Session expired -- re-authentication required")]
    AuthExpired,

    /// The durable token store refused the refreshed token pair.
    #[error("Token store error: {0}")]
    TokenStore(String),

    // ── Cloud transport ─────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Rate limited by the cloud API. Includes retry-after in seconds.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Any other non-2xx cloud response.
    #[error("Cloud API error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Local transport ─────────────────────────────────────────────
    /// Socket-level failure talking to the local control port.
    #[error("Network error talking to {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A local control-port exchange or a cloud round-trip ran past its bound.
    #[error("Timed out after {timeout_ms}ms talking to {endpoint}")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// The heater answered, but not with a well-formed status or ack.
    #[error("Protocol error from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },
}

impl Error {
    /// Returns `true` if this error means the session must be re-established
    /// by the user (refresh token rejected, or cloud still says 401 after
    /// a forced refresh).
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Returns `true` if this is a transient error worth retrying next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Protocol { .. }
            | Self::RateLimited { .. } => true,
            Self::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
