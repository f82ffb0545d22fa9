// ── Hub facade ──
//
// Entry point for consumers. `connect()` opens the cloud session (when the
// mode needs one), runs the first discovery, then leaves the registry's
// discovery task and one poll task per device running in the background.
// `oneshot()` does the same without any background tasks, for single CLI
// invocations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use tankless_api::{CloudClient, LocalClient, SessionManager, TokenStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CloudConfig, ConnectionMode, HubConfig};
use crate::coordinator::{CoordinatorSettings, DeviceCoordinator};
use crate::error::CoreError;
use crate::event::HubEvent;
use crate::model::{Availability, CircuitState, Source};
use crate::registry::{CoordinatorFactory, DiscoveryReport, Registry};
use crate::strategy::StrategySettings;

const EVENT_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    session: Option<Arc<SessionManager>>,
    registry: Registry,
    events: broadcast::Sender<HubEvent>,
    cancel: CancellationToken,
}

/// Serialisable health summary. Never contains tokens or passwords.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub mode: ConnectionMode,
    pub local_endpoint: Option<String>,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub devices: Vec<DeviceDiagnostics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDiagnostics {
    pub device_id: String,
    pub name: String,
    pub firmware_version: Option<String>,
    pub circuit: CircuitState,
    pub consecutive_local_failures: u32,
    pub consecutive_cloud_failures: u32,
    pub failure_streak: u32,
    pub availability: Availability,
    pub source: Option<Source>,
    pub last_updated: Option<DateTime<Utc>>,
    pub reauth_required: bool,
    pub last_error: Option<String>,
}

impl Hub {
    /// Connect and keep polling in the background until `shutdown()`.
    pub async fn connect(config: HubConfig, store: Arc<dyn TokenStore>) -> Result<Self, CoreError> {
        Self::open(config, store, true).await
    }

    /// Connect, discover and read every device once. No background tasks.
    pub async fn oneshot(config: HubConfig, store: Arc<dyn TokenStore>) -> Result<Self, CoreError> {
        Self::open(config, store, false).await
    }

    async fn open(
        config: HubConfig,
        store: Arc<dyn TokenStore>,
        background: bool,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let mode = config.mode;

        let session = match (&config.cloud, mode.uses_cloud()) {
            (Some(cloud), true) => Some(Arc::new(open_session(cloud, store).await?)),
            _ => None,
        };
        let local = config
            .local_endpoint
            .clone()
            .filter(|_| mode.uses_local())
            .map(|endpoint| Arc::new(LocalClient::new(endpoint, config.local_timeouts)));

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let polling = &config.polling;
        let factory = CoordinatorFactory {
            mode,
            cloud: session.clone().map(CloudClient::new),
            local,
            strategy: StrategySettings {
                failure_threshold: polling.failure_threshold,
                base_cooldown: polling.poll_interval,
                max_cooldown: polling.max_cooldown,
                command_preference: config.command_preference,
            },
            coordinator: CoordinatorSettings {
                poll_interval: polling.poll_interval,
                failure_threshold: polling.failure_threshold,
                maintenance_interval: polling
                    .maintenance_enabled
                    .then_some(polling.maintenance_interval),
                recirculation_default_minutes: config.recirculation_default_minutes,
                shutdown_timeout: config.shutdown_timeout,
            },
            events: events.clone(),
        };

        let cancel = CancellationToken::new();
        let registry = Registry::new(
            factory,
            polling.absence_threshold,
            background,
            cancel.child_token(),
        );
        let report = registry.discover().await?;
        info!(%mode, devices = report.known, "hub connected");

        if background {
            registry
                .spawn_discovery(config.polling.discovery_interval)
                .await;
        }

        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                session,
                registry,
                events,
                cancel,
            }),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Every known device, ordered by id.
    pub fn devices(&self) -> Vec<DeviceCoordinator> {
        self.inner.registry.coordinators()
    }

    /// Look a device up by id, serial or (case-insensitive) name. With no
    /// selector the hub must know exactly one device.
    pub fn device(&self, selector: Option<&str>) -> Result<DeviceCoordinator, CoreError> {
        let Some(selector) = selector else {
            let mut all = self.devices();
            return match all.len() {
                1 => Ok(all.remove(0)),
                0 => Err(CoreError::DeviceNotFound {
                    identifier: "<none discovered>".into(),
                }),
                n => Err(CoreError::InvalidArgument {
                    message: format!("{n} devices found; choose one by id, serial or name"),
                }),
            };
        };

        if let Some(found) = self.inner.registry.get(selector) {
            return Ok(found);
        }
        self.devices()
            .into_iter()
            .find(|c| {
                let device = c.device();
                device.serial.as_deref() == Some(selector)
                    || device
                        .name
                        .as_deref()
                        .is_some_and(|n| n.eq_ignore_ascii_case(selector))
            })
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: selector.to_owned(),
            })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    /// Run a discovery pass now.
    pub async fn discover(&self) -> Result<DiscoveryReport, CoreError> {
        self.inner.registry.discover().await
    }

    /// Log in again after `ReauthRequired`, then refresh every device.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), CoreError> {
        let session = self.inner.session.as_ref().ok_or_else(|| CoreError::Config {
            message: "this hub has no cloud account".into(),
        })?;
        session.authenticate(username, password).await?;
        for coordinator in self.devices() {
            if let Err(e) = coordinator.refresh().await {
                warn!(device_id = %coordinator.device_id(), error = %e, "refresh after login failed");
            }
        }
        Ok(())
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        let session_expires_at = match &self.inner.session {
            Some(session) => session.expires_at().await,
            None => None,
        };
        let devices = self
            .devices()
            .iter()
            .map(|c| {
                let snap = c.snapshot();
                DeviceDiagnostics {
                    device_id: snap.device.id.clone(),
                    name: snap.device.display_name().to_owned(),
                    firmware_version: snap.device.firmware_version.clone(),
                    circuit: snap.connection.circuit,
                    consecutive_local_failures: snap.connection.consecutive_local_failures,
                    consecutive_cloud_failures: snap.connection.consecutive_cloud_failures,
                    failure_streak: snap.failure_streak,
                    availability: snap.availability,
                    source: snap.state.as_ref().map(|s| s.source),
                    last_updated: snap.state.as_ref().map(|s| s.last_updated),
                    reauth_required: snap.connection.reauth_required,
                    last_error: snap.last_error.clone(),
                }
            })
            .collect();

        Diagnostics {
            mode: self.inner.config.mode,
            local_endpoint: self
                .inner
                .config
                .local_endpoint
                .as_ref()
                .filter(|_| self.inner.config.mode.uses_local())
                .map(ToString::to_string),
            session_expires_at,
            devices,
        }
    }

    /// Stop every background task. Waits are bounded by `shutdown_timeout`.
    pub async fn shutdown(&self) {
        self.inner.registry.shutdown().await;
        self.inner.cancel.cancel();
        info!("hub shut down");
    }
}

async fn open_session(
    cloud: &CloudConfig,
    store: Arc<dyn TokenStore>,
) -> Result<SessionManager, CoreError> {
    let session = SessionManager::new(cloud.base_url.clone(), &cloud.transport, store)?;
    if let (Some(username), Some(password)) = (&cloud.username, &cloud.password) {
        session
            .remember_credentials(username, password.clone())
            .await;
    }
    if session.restore().await? {
        return Ok(session);
    }
    match (&cloud.username, &cloud.password) {
        (Some(username), Some(password)) => {
            session.authenticate(username, password).await?;
            Ok(session)
        }
        _ => Err(CoreError::AuthExpired),
    }
}
