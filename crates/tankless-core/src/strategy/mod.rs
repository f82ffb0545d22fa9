// ── Connection strategy ──
//
// Decides, per call, whether the local port or the cloud serves a device.
// Owned by exactly one coordinator and only ever used under its cycle lock,
// so every method takes `&mut self`.

mod breaker;

pub use breaker::CircuitBreaker;

use std::sync::Arc;
use std::time::Duration;

use tankless_api::{CloudClient, DeviceCommand, LocalClient, PropertyMap};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CommandPreference, ConnectionMode};
use crate::error::CoreError;
use crate::model::{CircuitState, ConnectionState, Source};

/// Tuning shared by every strategy of a hub.
#[derive(Debug, Clone, Copy)]
pub struct StrategySettings {
    pub failure_threshold: u32,
    /// First local cooldown; normally the poll interval.
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
    pub command_preference: CommandPreference,
}

pub struct ConnectionStrategy {
    mode: ConnectionMode,
    device_id: String,
    cloud: Option<CloudClient>,
    local: Option<Arc<LocalClient>>,
    command_preference: CommandPreference,
    breaker: CircuitBreaker,
    consecutive_cloud_failures: u32,
    reauth_required: bool,
    rate_limited_until: Option<Instant>,
}

impl std::fmt::Debug for ConnectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStrategy")
            .field("mode", &self.mode)
            .field("device_id", &self.device_id)
            .field("circuit", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionStrategy {
    pub fn new(
        mode: ConnectionMode,
        device_id: impl Into<String>,
        cloud: Option<CloudClient>,
        local: Option<Arc<LocalClient>>,
        settings: StrategySettings,
    ) -> Result<Self, CoreError> {
        if mode.uses_cloud() && cloud.is_none() {
            return Err(CoreError::Config {
                message: format!("{mode} mode without a cloud client"),
            });
        }
        if mode.uses_local() && local.is_none() {
            return Err(CoreError::Config {
                message: format!("{mode} mode without a local client"),
            });
        }
        Ok(Self {
            mode,
            device_id: device_id.into(),
            cloud,
            local,
            command_preference: settings.command_preference,
            breaker: CircuitBreaker::new(
                settings.failure_threshold,
                settings.base_cooldown,
                settings.max_cooldown,
            ),
            consecutive_cloud_failures: 0,
            reauth_required: false,
            rate_limited_until: None,
        })
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Whether a local path exists at all, so an expired cloud session is
    /// not the end of the road.
    pub fn has_local_path(&self) -> bool {
        self.mode.uses_local()
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            mode: self.mode,
            local_endpoint: self.local.as_ref().map(|l| l.endpoint().to_string()),
            consecutive_local_failures: self.breaker.consecutive_failures(),
            consecutive_cloud_failures: self.consecutive_cloud_failures,
            circuit: self.breaker.state(),
            reauth_required: self.reauth_required,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// One status read, local first when allowed, cloud as fallback.
    pub async fn fetch_status(&mut self) -> Result<(PropertyMap, Source), CoreError> {
        match self.mode {
            ConnectionMode::Cloud => self.cloud_status().await,
            ConnectionMode::Local => self.local_status().await,
            ConnectionMode::Hybrid => {
                if self.breaker.allow_local(Instant::now()) {
                    match self.local_status().await {
                        Ok(found) => return Ok(found),
                        Err(e) => debug!(
                            device_id = %self.device_id,
                            error = %e,
                            "local read failed, falling back to cloud"
                        ),
                    }
                } else {
                    debug!(device_id = %self.device_id, circuit = %self.breaker.state(), "skipping local read");
                }
                self.cloud_status().await
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Deliver a command over the preferred transport, falling back to the
    /// other one on a transient failure. Returns the transport that took it.
    pub async fn send_command(&mut self, command: &DeviceCommand) -> Result<Source, CoreError> {
        match (self.mode, self.command_preference) {
            (ConnectionMode::Cloud, _) => self.cloud_command(command).await,
            (ConnectionMode::Local, _) => self.local_command(command).await,
            (ConnectionMode::Hybrid, CommandPreference::LocalFirst) => {
                if self.breaker.allow_local(Instant::now()) {
                    match self.local_command(command).await {
                        Ok(source) => return Ok(source),
                        Err(e) => debug!(
                            device_id = %self.device_id,
                            command = command.name(),
                            error = %e,
                            "local command failed, falling back to cloud"
                        ),
                    }
                }
                self.cloud_command(command).await
            }
            (ConnectionMode::Hybrid, CommandPreference::CloudFirst) => {
                match self.cloud_command(command).await {
                    Ok(source) => Ok(source),
                    Err(e) if e.is_transient() && self.breaker.allow_local(Instant::now()) => {
                        debug!(
                            device_id = %self.device_id,
                            command = command.name(),
                            error = %e,
                            "cloud command failed, falling back to local"
                        );
                        self.local_command(command).await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    // ── Local leg ────────────────────────────────────────────────────

    async fn local_status(&mut self) -> Result<(PropertyMap, Source), CoreError> {
        let local = self.local_client()?;
        let result = local.get_status().await;
        self.record_local(result.is_ok());
        result.map(|props| (props, Source::Local)).map_err(CoreError::from)
    }

    async fn local_command(&mut self, command: &DeviceCommand) -> Result<Source, CoreError> {
        let local = self.local_client()?;
        let result = local.send_command(command).await;
        self.record_local(result.is_ok());
        result.map(|()| Source::Local).map_err(CoreError::from)
    }

    fn local_client(&self) -> Result<Arc<LocalClient>, CoreError> {
        self.local
            .clone()
            .ok_or_else(|| CoreError::Internal("local transport not configured".into()))
    }

    fn record_local(&mut self, succeeded: bool) {
        let before = self.breaker.state();
        if succeeded {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure(Instant::now());
        }
        let after = self.breaker.state();
        if before != after {
            match after {
                CircuitState::LocalPreferred => {
                    info!(device_id = %self.device_id, "local path recovered");
                }
                CircuitState::LocalDegraded | CircuitState::CloudOnly => warn!(
                    device_id = %self.device_id,
                    circuit = %after,
                    cooldown_secs = self.breaker.cooldown().as_secs(),
                    "local path degraded"
                ),
            }
        }
    }

    // ── Cloud leg ────────────────────────────────────────────────────

    async fn cloud_status(&mut self) -> Result<(PropertyMap, Source), CoreError> {
        let cloud = self.cloud_client()?;
        let result = cloud.get_status(&self.device_id).await;
        self.record_cloud(result.as_ref().err());
        result.map(|props| (props, Source::Cloud)).map_err(CoreError::from)
    }

    async fn cloud_command(&mut self, command: &DeviceCommand) -> Result<Source, CoreError> {
        let cloud = self.cloud_client()?;
        let result = cloud.send_command(&self.device_id, command).await;
        self.record_cloud(result.as_ref().err());
        result.map(|()| Source::Cloud).map_err(CoreError::from)
    }

    /// The cloud client, unless a rate limit is still in force.
    fn cloud_client(&self) -> Result<CloudClient, CoreError> {
        if let Some(until) = self.rate_limited_until {
            let now = Instant::now();
            if now < until {
                return Err(CoreError::RateLimited {
                    retry_after_secs: until.duration_since(now).as_secs().max(1),
                });
            }
        }
        self.cloud
            .clone()
            .ok_or_else(|| CoreError::Internal("cloud transport not configured".into()))
    }

    fn record_cloud(&mut self, error: Option<&tankless_api::Error>) {
        match error {
            None => {
                self.consecutive_cloud_failures = 0;
                self.rate_limited_until = None;
                if self.reauth_required {
                    info!(device_id = %self.device_id, "cloud session restored");
                }
                self.reauth_required = false;
            }
            Some(e) => {
                self.consecutive_cloud_failures = self.consecutive_cloud_failures.saturating_add(1);
                match e {
                    tankless_api::Error::AuthExpired => {
                        self.reauth_required = true;
                    }
                    tankless_api::Error::RateLimited { retry_after_secs } => {
                        warn!(device_id = %self.device_id, retry_after_secs, "cloud rate limited");
                        self.rate_limited_until =
                            Some(Instant::now() + Duration::from_secs(*retry_after_secs));
                    }
                    _ => {}
                }
            }
        }
    }
}
