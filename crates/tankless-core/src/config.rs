// ── Runtime hub configuration ──
//
// These types describe how to reach the heater and how hard to poll it.
// They carry credential data and tuning, but never touch disk. The CLI
// builds a `HubConfig` (usually through `tankless-config`) and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tankless_api::{LocalEndpoint, LocalTimeouts, TransportConfig};
use url::Url;

use crate::error::CoreError;

/// Which transports a hub may use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionMode {
    #[default]
    Cloud,
    Local,
    Hybrid,
}

impl ConnectionMode {
    pub fn uses_cloud(self) -> bool {
        matches!(self, Self::Cloud | Self::Hybrid)
    }

    pub fn uses_local(self) -> bool {
        matches!(self, Self::Local | Self::Hybrid)
    }
}

/// Which transport a hybrid hub tries first for control commands.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandPreference {
    /// Same path as polling: local unless the circuit is open.
    #[default]
    LocalFirst,
    CloudFirst,
}

/// Cloud account settings.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub base_url: Url,
    pub username: Option<String>,
    /// Enables automatic re-login when the refresh token is rejected.
    pub password: Option<SecretString>,
    pub transport: TransportConfig,
}

/// Polling cadence and failure tolerance.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub poll_interval: Duration,
    /// Consecutive failures before a device turns unavailable and before the
    /// local circuit degrades.
    pub failure_threshold: u32,
    /// Upper bound for the local-probe backoff.
    pub max_cooldown: Duration,
    pub maintenance_enabled: bool,
    pub maintenance_interval: Duration,
    pub discovery_interval: Duration,
    /// Missed discovery cycles before a device is dropped.
    pub absence_threshold: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            failure_threshold: 3,
            max_cooldown: Duration::from_secs(15 * 60),
            maintenance_enabled: false,
            maintenance_interval: Duration::from_secs(300),
            discovery_interval: Duration::from_secs(600),
            absence_threshold: 3,
        }
    }
}

/// Everything a `Hub` needs to run.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub mode: ConnectionMode,
    pub cloud: Option<CloudConfig>,
    /// Shared by every device in hybrid mode.
    pub local_endpoint: Option<LocalEndpoint>,
    pub local_timeouts: LocalTimeouts,
    pub command_preference: CommandPreference,
    pub polling: PollingConfig,
    pub recirculation_default_minutes: u16,
    /// Bound on waiting for background tasks during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::default(),
            cloud: None,
            local_endpoint: None,
            local_timeouts: LocalTimeouts::default(),
            command_preference: CommandPreference::default(),
            polling: PollingConfig::default(),
            recirculation_default_minutes: 15,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.mode.uses_cloud() && self.cloud.is_none() {
            return Err(config_error(format!(
                "{} mode needs cloud account settings",
                self.mode
            )));
        }
        if self.mode.uses_local() && self.local_endpoint.is_none() {
            return Err(config_error(format!(
                "{} mode needs a local endpoint",
                self.mode
            )));
        }
        if self.polling.poll_interval.is_zero() {
            return Err(config_error("poll interval must be positive"));
        }
        if self.polling.failure_threshold == 0 || self.polling.absence_threshold == 0 {
            return Err(config_error("thresholds must be at least 1"));
        }
        if self.polling.max_cooldown < self.polling.poll_interval {
            return Err(config_error("max cooldown must not be shorter than the poll interval"));
        }
        crate::command::validate_recirculation_minutes(self.recirculation_default_minutes)
            .map_err(|e| config_error(e.to_string()))?;
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cloud() -> CloudConfig {
        CloudConfig {
            base_url: Url::parse("https://cloud.example/api").unwrap(),
            username: Some("owner".into()),
            password: None,
            transport: TransportConfig::default(),
        }
    }

    #[test]
    fn hybrid_needs_both_transports() {
        let mut config = HubConfig {
            mode: ConnectionMode::Hybrid,
            cloud: Some(cloud()),
            ..HubConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
        config.local_endpoint = Some(LocalEndpoint::new("10.0.0.7"));
        config.validate().unwrap();
    }

    #[test]
    fn default_recirculation_duration_must_be_valid() {
        let config = HubConfig {
            cloud: Some(cloud()),
            recirculation_default_minutes: 400,
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mode_round_trips_through_strum() {
        assert_eq!("hybrid".parse::<ConnectionMode>().unwrap(), ConnectionMode::Hybrid);
        assert_eq!(CommandPreference::CloudFirst.to_string(), "cloud_first");
    }
}
