//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use tankless_config::ConfigError;
use tankless_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach {endpoint}")]
    #[diagnostic(
        code(tankless::connection_failed),
        help(
            "Check that the heater (or the cloud API) is reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Timed out after {timeout_ms}ms talking to {endpoint}")]
    #[diagnostic(
        code(tankless::timeout),
        help("The heater answers slowly when busy; retry, or use --mode cloud.")
    )]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Unexpected reply from {endpoint}: {message}")]
    #[diagnostic(code(tankless::protocol))]
    Protocol { endpoint: String, message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Cloud session expired")]
    #[diagnostic(
        code(tankless::auth_expired),
        help("Run: tankless login")
    )]
    AuthExpired,

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(tankless::auth_failed),
        help("Check the account e-mail and password, then run: tankless login")
    )]
    AuthFailed { message: String },

    #[error("No cloud username configured for profile '{profile}'")]
    #[diagnostic(
        code(tankless::no_credentials),
        help("Pass --username, set TANKLESS_USERNAME, or add `username` to the profile.")
    )]
    NoCredentials { profile: String },

    // ── Cloud API ────────────────────────────────────────────────────

    #[error("Rate limited by the cloud")]
    #[diagnostic(code(tankless::rate_limited), help("Retry in {retry_after_secs}s."))]
    RateLimited { retry_after_secs: u64 },

    #[error("Cloud API error (HTTP {status}): {message}")]
    #[diagnostic(code(tankless::api_error))]
    ApiError { status: u16, message: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("Heater '{identifier}' not found")]
    #[diagnostic(
        code(tankless::not_found),
        help("Run: tankless devices to see available heaters")
    )]
    NotFound { identifier: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tankless::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(tankless::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(code(tankless::config))]
    Config(ConfigError),

    #[error("Internal error: {0}")]
    #[diagnostic(code(tankless::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(tankless::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Protocol { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthExpired | Self::AuthFailed { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthExpired => CliError::AuthExpired,
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Network { endpoint, reason } => {
                CliError::ConnectionFailed { endpoint, reason }
            }
            CoreError::Timeout {
                endpoint,
                timeout_ms,
            } => CliError::Timeout {
                endpoint,
                timeout_ms,
            },
            CoreError::Protocol { endpoint, message } => CliError::Protocol { endpoint, message },
            CoreError::RateLimited { retry_after_secs } => {
                CliError::RateLimited { retry_after_secs }
            }
            CoreError::Remote { status, message } => CliError::ApiError { status, message },
            CoreError::InvalidArgument { message } => CliError::Validation {
                field: "argument".into(),
                reason: message,
            },
            CoreError::DeviceNotFound { identifier } => CliError::NotFound { identifier },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<tankless_api::Error> for CliError {
    fn from(err: tankless_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownProfile { profile } => {
                let available = tankless_config::load_config_or_default()
                    .profiles
                    .into_keys()
                    .collect::<Vec<_>>()
                    .join(", ");
                CliError::ProfileNotFound {
                    name: profile,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available
                    },
                    path: tankless_config::config_path().display().to_string(),
                }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
