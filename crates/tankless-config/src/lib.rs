//! Shared configuration for the tankless CLI.
//!
//! TOML profiles, password resolution (env + keyring + plaintext), token
//! persistence, and translation to `tankless_core::HubConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tankless_api::{LocalEndpoint, TokenPair, TokenStore, TransportConfig};
use tankless_core::{CloudConfig, CommandPreference, ConnectionMode, HubConfig, PollingConfig};

const KEYRING_SERVICE: &str = "tankless";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found in config")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named heater profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Resolve a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name.to_owned(), p))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.to_owned(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Cloud request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    60
}

/// One heater installation.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// "cloud" (default), "local" or "hybrid".
    pub mode: Option<String>,

    /// Cloud API base URL.
    pub api_url: Option<String>,

    /// Cloud account e-mail.
    pub username: Option<String>,

    /// Cloud password (plaintext; prefer the keyring or an env var).
    pub password: Option<String>,

    /// Environment variable holding the cloud password.
    pub password_env: Option<String>,

    /// Local control port, `host` or `host:port`.
    pub host: Option<String>,

    /// "local_first" (default) or "cloud_first".
    pub command_preference: Option<String>,

    pub poll_interval: Option<u64>,
    pub failure_threshold: Option<u32>,
    /// Upper bound for the local-probe backoff, seconds.
    pub max_cooldown: Option<u64>,

    #[serde(default)]
    pub maintenance: bool,
    pub maintenance_interval: Option<u64>,
    pub discovery_interval: Option<u64>,

    /// Default recirculation run time, minutes.
    pub recirculation_minutes: Option<u16>,

    /// Extra CA certificate for the cloud API.
    pub ca_cert: Option<PathBuf>,

    /// Cloud request timeout override, seconds.
    pub timeout: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    ProjectDirs::from("dev", "tankless", "tankless").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("tankless");
            p
        },
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Where `FileTokenStore` keeps session tokens, next to the config file.
pub fn tokens_path() -> PathBuf {
    config_dir().join("tokens.toml")
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing is fine) and `TANKLESS_*` variables, where `__`
/// separates nesting levels (`TANKLESS_PROFILES__HOME__HOST`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TANKLESS_").split("__"))
        .extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Cloud password from, in order: the profile's `password_env`,
/// `TANKLESS_PASSWORD`, the system keyring, plaintext config.
///
/// `None` is not an error; stored tokens may still carry the session.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Some(SecretString::from(pw));
        }
    }

    if let Ok(pw) = std::env::var("TANKLESS_PASSWORD") {
        return Some(SecretString::from(pw));
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return Some(SecretString::from(pw));
        }
    }

    profile.password.clone().map(SecretString::from)
}

/// Save a password to the system keyring for later `resolve_password` calls.
pub fn store_password(profile_name: &str, password: &SecretString) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))
        .and_then(|entry| entry.set_password(password.expose_secret()))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `HubConfig` from a profile, resolving the password chain.
pub fn profile_to_hub_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<HubConfig, ConfigError> {
    let password = resolve_password(profile, profile_name);
    build_hub_config(profile, defaults, password)
}

/// Build a `HubConfig` from a profile with an already-resolved password.
pub fn build_hub_config(
    profile: &Profile,
    defaults: &Defaults,
    password: Option<SecretString>,
) -> Result<HubConfig, ConfigError> {
    let mode = match profile.mode.as_deref() {
        None => ConnectionMode::default(),
        Some(raw) => ConnectionMode::from_str(raw)
            .map_err(|_| invalid("mode", format!("expected 'cloud', 'local' or 'hybrid', got '{raw}'")))?,
    };
    let command_preference = match profile.command_preference.as_deref() {
        None => CommandPreference::default(),
        Some(raw) => CommandPreference::from_str(raw).map_err(|_| {
            invalid(
                "command_preference",
                format!("expected 'local_first' or 'cloud_first', got '{raw}'"),
            )
        })?,
    };

    let cloud = if mode.uses_cloud() {
        let raw = profile
            .api_url
            .as_deref()
            .ok_or_else(|| invalid("api_url", format!("required in {mode} mode")))?;
        let base_url: url::Url = raw
            .parse()
            .map_err(|_| invalid("api_url", format!("invalid URL: {raw}")))?;
        Some(CloudConfig {
            base_url,
            username: profile
                .username
                .clone()
                .or_else(|| std::env::var("TANKLESS_USERNAME").ok()),
            password,
            transport: TransportConfig {
                timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
                ca_cert: profile.ca_cert.clone(),
            },
        })
    } else {
        None
    };

    let local_endpoint = profile
        .host
        .as_deref()
        .map(LocalEndpoint::from_str)
        .transpose()
        .map_err(|reason| invalid("host", reason))?;

    let base = PollingConfig::default();
    let polling = PollingConfig {
        poll_interval: Duration::from_secs(profile.poll_interval.unwrap_or(defaults.poll_interval)),
        failure_threshold: profile.failure_threshold.unwrap_or(base.failure_threshold),
        max_cooldown: profile
            .max_cooldown
            .map_or(base.max_cooldown, Duration::from_secs),
        maintenance_enabled: profile.maintenance,
        maintenance_interval: profile
            .maintenance_interval
            .map_or(base.maintenance_interval, Duration::from_secs),
        discovery_interval: profile
            .discovery_interval
            .map_or(base.discovery_interval, Duration::from_secs),
        absence_threshold: base.absence_threshold,
    };

    let hub = HubConfig {
        mode,
        cloud,
        local_endpoint,
        command_preference,
        polling,
        recirculation_default_minutes: profile
            .recirculation_minutes
            .unwrap_or(HubConfig::default().recirculation_default_minutes),
        ..HubConfig::default()
    };
    hub.validate().map_err(|e| invalid("profile", e.to_string()))?;
    Ok(hub)
}

// ── Token persistence ───────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default)]
    profiles: HashMap<String, StoredTokens>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    refresh_token: String,
}

/// `TokenStore` backed by one TOML file shared by every profile.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    profile: String,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            profile: profile.into(),
        }
    }

    /// Store at the canonical `tokens_path()`.
    pub fn for_profile(profile: impl Into<String>) -> Self {
        Self::new(tokens_path(), profile)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<TokenFile, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TokenFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &TokenFile) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(file)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

fn store_error(err: &ConfigError) -> tankless_api::Error {
    tankless_api::Error::TokenStore(err.to_string())
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, tankless_api::Error> {
        let file = self.read().map_err(|e| store_error(&e))?;
        Ok(file.profiles.get(&self.profile).map(|t| TokenPair {
            access_token: SecretString::from(t.access_token.clone()),
            refresh_token: SecretString::from(t.refresh_token.clone()),
        }))
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), tankless_api::Error> {
        let mut file = self.read().map_err(|e| store_error(&e))?;
        file.profiles.insert(
            self.profile.clone(),
            StoredTokens {
                access_token: tokens.access_token.expose_secret().to_owned(),
                refresh_token: tokens.refresh_token.expose_secret().to_owned(),
            },
        );
        self.write(&file).map_err(|e| store_error(&e))?;
        debug!(profile = %self.profile, path = %self.path.display(), "tokens saved");
        Ok(())
    }
}
