// ── Registry sync ──
//
// Keeps one coordinator per live device id. Discovery compares what the
// account (or, in local mode, the heater itself) reports against what is
// known: new ids get a coordinator, ids missing for `absence_threshold`
// consecutive cycles are torn down.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tankless_api::{CloudClient, LocalClient};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionMode;
use crate::convert;
use crate::coordinator::{CoordinatorSettings, DeviceCoordinator};
use crate::error::CoreError;
use crate::event::HubEvent;
use crate::model::Device;
use crate::strategy::{ConnectionStrategy, StrategySettings};

/// Everything needed to build a coordinator for a newly discovered device.
#[derive(Debug, Clone)]
pub struct CoordinatorFactory {
    pub mode: ConnectionMode,
    pub cloud: Option<CloudClient>,
    /// One local client, shared by every coordinator of the hub.
    pub local: Option<Arc<LocalClient>>,
    pub strategy: StrategySettings,
    pub coordinator: CoordinatorSettings,
    pub events: broadcast::Sender<HubEvent>,
}

impl CoordinatorFactory {
    pub fn build(
        &self,
        device: Device,
        cancel: CancellationToken,
    ) -> Result<DeviceCoordinator, CoreError> {
        let strategy = ConnectionStrategy::new(
            self.mode,
            device.id.clone(),
            self.cloud.clone(),
            self.local.clone(),
            self.strategy,
        )?;
        Ok(DeviceCoordinator::new(
            device,
            strategy,
            self.coordinator,
            self.events.clone(),
            cancel,
        ))
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Devices known after the pass.
    pub known: usize,
}

struct Entry {
    coordinator: DeviceCoordinator,
    absences: u32,
}

#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    factory: CoordinatorFactory,
    absence_threshold: u32,
    /// Start polling tasks for new devices. Off for one-shot use.
    autostart: bool,
    entries: DashMap<String, Entry>,
    cancel: CancellationToken,
    discovery_lock: Mutex<()>,
    discovery_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl Registry {
    pub fn new(
        factory: CoordinatorFactory,
        absence_threshold: u32,
        autostart: bool,
        cancel: CancellationToken,
    ) -> Self {
        let shutdown_timeout = factory.coordinator.shutdown_timeout;
        Self {
            inner: Arc::new(RegistryInner {
                factory,
                absence_threshold: absence_threshold.max(1),
                autostart,
                entries: DashMap::new(),
                cancel,
                discovery_lock: Mutex::new(()),
                discovery_handle: Mutex::new(None),
                shutdown_timeout,
            }),
        }
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceCoordinator> {
        self.inner
            .entries
            .get(device_id)
            .map(|e| e.coordinator.clone())
    }

    /// Every known coordinator, ordered by device id.
    pub fn coordinators(&self) -> Vec<DeviceCoordinator> {
        let mut all: Vec<_> = self
            .inner
            .entries
            .iter()
            .map(|e| e.coordinator.clone())
            .collect();
        all.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        all
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// One discovery pass. A failed listing changes nothing and does not
    /// count as an absence.
    pub async fn discover(&self) -> Result<DiscoveryReport, CoreError> {
        let _guard = self.inner.discovery_lock.lock().await;
        let live = self.list_live().await.inspect_err(|e| {
            warn!(error = %e, "device discovery failed");
        })?;
        let live_ids: HashSet<&str> = live.iter().map(|d| d.id.as_str()).collect();
        let mut report = DiscoveryReport::default();

        // Absence bookkeeping.
        let mut expired = Vec::new();
        for mut entry in self.inner.entries.iter_mut() {
            if live_ids.contains(entry.key().as_str()) {
                entry.absences = 0;
                continue;
            }
            entry.absences += 1;
            debug!(device_id = %entry.key(), absences = entry.absences, "device missing from discovery");
            if entry.absences >= self.inner.absence_threshold {
                expired.push(entry.key().clone());
            }
        }

        for device in &live {
            if let Some(entry) = self.inner.entries.get(&device.id) {
                entry.coordinator.update_firmware(device.firmware_version.clone());
            }
        }

        for device_id in expired {
            if let Some((_, entry)) = self.inner.entries.remove(&device_id) {
                entry.coordinator.stop().await;
                info!(%device_id, "device removed");
                let _ = self.inner.factory.events.send(HubEvent::DeviceRemoved {
                    device_id: device_id.clone(),
                });
                report.removed.push(device_id);
            }
        }

        for device in live {
            if self.inner.entries.contains_key(&device.id) {
                continue;
            }
            let device_id = device.id.clone();
            let coordinator = self
                .inner
                .factory
                .build(device, self.inner.cancel.child_token())?;
            if let Err(e) = coordinator.refresh().await {
                warn!(%device_id, error = %e, "initial refresh failed");
            }
            if self.inner.autostart {
                coordinator.start().await;
            }
            let device = coordinator.device();
            self.inner.entries.insert(
                device_id.clone(),
                Entry {
                    coordinator,
                    absences: 0,
                },
            );
            info!(%device_id, name = device.display_name(), "device added");
            let _ = self.inner.factory.events.send(HubEvent::DeviceAdded { device });
            report.added.push(device_id);
        }

        report.known = self.inner.entries.len();
        Ok(report)
    }

    /// Run `discover` every `period` until the registry shuts down.
    pub async fn spawn_discovery(&self, period: Duration) {
        let mut slot = self.inner.discovery_handle.lock().await;
        if slot.is_some() {
            return;
        }
        *slot = Some(tokio::spawn(discovery_task(
            self.clone(),
            period,
            self.inner.cancel.clone(),
        )));
    }

    /// Stop discovery and every coordinator, each wait bounded.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.discovery_handle.lock().await.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.inner.shutdown_timeout, handle)
                .await
                .is_err()
            {
                warn!("discovery task did not stop in time, aborting");
                abort.abort();
            }
        }

        let ids: Vec<String> = self
            .inner
            .entries
            .iter()
            .map(|e| e.key().clone())
            .collect();
        let stopping: Vec<DeviceCoordinator> = ids
            .iter()
            .filter_map(|id| self.inner.entries.remove(id))
            .map(|(_, entry)| entry.coordinator)
            .collect();
        futures_util::future::join_all(stopping.iter().map(DeviceCoordinator::stop)).await;
        debug!(stopped = stopping.len(), "registry shut down");
    }

    async fn list_live(&self) -> Result<Vec<Device>, CoreError> {
        let factory = &self.inner.factory;
        if factory.mode == ConnectionMode::Local {
            let local = factory
                .local
                .as_ref()
                .ok_or_else(|| CoreError::Internal("local transport not configured".into()))?;
            let info = local.get_sysinfo().await?;
            return Ok(vec![convert::device_from_sysinfo(info)]);
        }

        let cloud = factory
            .cloud
            .as_ref()
            .ok_or_else(|| CoreError::Internal("cloud transport not configured".into()))?;
        Ok(cloud
            .list_devices()
            .await?
            .into_iter()
            .map(Device::from)
            .collect())
    }
}

async fn discovery_task(registry: Registry, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = registry.discover() => {
                        if let Ok(report) = result {
                            if !report.added.is_empty() || !report.removed.is_empty() {
                                info!(added = report.added.len(), removed = report.removed.len(), "discovery changed devices");
                            }
                        }
                    }
                }
            }
        }
    }
    debug!("discovery task exiting");
}
