// ── Core error types ──
//
// User-facing errors from tankless-core. Consumers never see reqwest or
// socket errors directly; the `From<tankless_api::Error>` impl translates
// transport failures into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Authentication ───────────────────────────────────────────────
    /// The cloud session is gone; the user has to log in again.
    #[error("Cloud session expired -- re-authentication required")]
    AuthExpired,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Timed out after {timeout_ms}ms talking to {endpoint}")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Unexpected reply from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    #[error("Rate limited by the cloud -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Cloud API error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }

    /// Failures a later cycle may not see again. A 4xx from the cloud is a
    /// rejection, not a hiccup.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Protocol { .. }
            | Self::RateLimited { .. } => true,
            Self::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tankless_api::Error> for CoreError {
    fn from(err: tankless_api::Error) -> Self {
        use tankless_api::Error as Api;

        match err {
            Api::AuthExpired => CoreError::AuthExpired,
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::TokenStore(message) => CoreError::Internal(format!("token store: {message}")),
            // Cloud timeouts arrive as `Api::Timeout` with their bound.
            Api::Transport(ref e) => CoreError::Network {
                endpoint: e
                    .url()
                    .map_or_else(|| "cloud".into(), |u| u.origin().ascii_serialization()),
                reason: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(reason) => CoreError::Network {
                endpoint: "cloud".into(),
                reason: format!("TLS error: {reason}"),
            },
            Api::RateLimited { retry_after_secs } => CoreError::RateLimited { retry_after_secs },
            Api::Remote { status, message } => CoreError::Remote { status, message },
            Api::Deserialization { message, .. } => CoreError::Protocol {
                endpoint: "cloud".into(),
                message,
            },
            Api::Network { endpoint, source } => CoreError::Network {
                endpoint,
                reason: source.to_string(),
            },
            Api::Timeout {
                endpoint,
                timeout_ms,
            } => CoreError::Timeout {
                endpoint,
                timeout_ms,
            },
            Api::Protocol { endpoint, message } => CoreError::Protocol { endpoint, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_expired_survives_translation() {
        let err = CoreError::from(tankless_api::Error::AuthExpired);
        assert!(err.is_auth_expired());
        assert!(!err.is_transient());
    }

    #[test]
    fn local_socket_errors_keep_endpoint() {
        let err = CoreError::from(tankless_api::Error::Network {
            endpoint: "10.0.0.7:9798".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        });
        match err {
            CoreError::Network { endpoint, .. } => assert_eq!(endpoint, "10.0.0.7:9798"),
            other => panic!("expected Network, got {other:?}"),
        }
    }

    #[test]
    fn cloud_timeout_keeps_its_bound() {
        let err = CoreError::from(tankless_api::Error::Timeout {
            endpoint: "https://cloud.example".into(),
            timeout_ms: 10_000,
        });
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Timed out after 10000ms talking to https://cloud.example"
        );
    }

    #[test]
    fn only_server_side_remote_errors_are_transient() {
        let rejected = CoreError::Remote {
            status: 400,
            message: "invalid value".into(),
        };
        let busy = CoreError::Remote {
            status: 503,
            message: "busy".into(),
        };
        assert!(!rejected.is_transient());
        assert!(busy.is_transient());
    }
}
