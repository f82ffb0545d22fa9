// ── Device coordinator ──
//
// One per device. Owns the device's connection strategy (behind the cycle
// lock) and its snapshot (behind a watch channel). Polls on an interval,
// runs maintenance retrievals, and sequences commands with their
// confirmation reads. Nobody else writes the snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::convert;
use crate::error::CoreError;
use crate::event::HubEvent;
use crate::model::{Availability, Device, DeviceSnapshot};
use crate::strategy::ConnectionStrategy;
use crate::stream::DeviceStream;

/// Per-device timing, derived from `HubConfig`.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    /// `None` disables periodic maintenance retrievals.
    pub maintenance_interval: Option<Duration>,
    pub recirculation_default_minutes: u16,
    pub shutdown_timeout: Duration,
}

/// Cheaply cloneable handle to a device's coordinator.
#[derive(Clone)]
pub struct DeviceCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    device_id: String,
    settings: CoordinatorSettings,
    /// Cycle lock: polls, maintenance and commands run one at a time.
    strategy: Mutex<ConnectionStrategy>,
    snapshot: watch::Sender<Arc<DeviceSnapshot>>,
    events: broadcast::Sender<HubEvent>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeviceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCoordinator")
            .field("device_id", &self.inner.device_id)
            .finish_non_exhaustive()
    }
}

impl DeviceCoordinator {
    pub fn new(
        device: Device,
        strategy: ConnectionStrategy,
        settings: CoordinatorSettings,
        events: broadcast::Sender<HubEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let device_id = device.id.clone();
        let initial = DeviceSnapshot::new(Arc::new(device), strategy.connection_state());
        let (snapshot, _) = watch::channel(Arc::new(initial));
        Self {
            inner: Arc::new(CoordinatorInner {
                device_id,
                settings,
                strategy: Mutex::new(strategy),
                snapshot,
                events,
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn device(&self) -> Arc<Device> {
        self.inner.snapshot.borrow().device.clone()
    }

    /// The current snapshot. Cheap; never blocks on I/O.
    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> DeviceStream {
        DeviceStream::new(self.inner.snapshot.subscribe())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the poll task and, when enabled, the maintenance task.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return;
        }
        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(poll_task(
            self.clone(),
            self.inner.settings.poll_interval,
            cancel.clone(),
        )));
        if let Some(period) = self.inner.settings.maintenance_interval {
            handles.push(tokio::spawn(maintenance_task(self.clone(), period, cancel)));
        }
        debug!(device_id = %self.inner.device_id, tasks = handles.len(), "coordinator started");
    }

    /// Cancel background work and wait (bounded) for it to finish.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.inner.settings.shutdown_timeout, handle)
                .await
                .is_err()
            {
                warn!(device_id = %self.inner.device_id, "coordinator task did not stop in time, aborting");
                abort.abort();
            }
        }
        debug!(device_id = %self.inner.device_id, "coordinator stopped");
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Run one poll cycle now. The error is the cycle's outcome; the
    /// snapshot has already absorbed it.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let mut strategy = self.inner.strategy.lock().await;
        self.run_cycle(&mut strategy).await
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn set_temperature(&self, fahrenheit: u16) -> Result<(), CoreError> {
        self.execute(Command::SetTemperature { fahrenheit }).await
    }

    pub async fn set_power(&self, on: bool) -> Result<(), CoreError> {
        self.execute(Command::SetPower { on }).await
    }

    /// Start (with `minutes`, or the configured default) or stop recirculation.
    pub async fn set_recirculation(&self, on: bool, minutes: Option<u16>) -> Result<(), CoreError> {
        let minutes = minutes.unwrap_or(self.inner.settings.recirculation_default_minutes);
        self.execute(Command::SetRecirculation { on, minutes }).await
    }

    pub async fn set_vacation_mode(&self, on: bool) -> Result<(), CoreError> {
        self.execute(Command::SetVacationMode { on }).await
    }

    pub async fn request_maintenance(&self) -> Result<(), CoreError> {
        self.execute(Command::RequestMaintenance).await
    }

    /// Validate, deliver, then read back before returning.
    ///
    /// Nothing is sent when validation fails. A failed confirmation read does
    /// not fail the command; it is recorded like any other failed poll.
    pub async fn execute(&self, command: Command) -> Result<(), CoreError> {
        let wire = command.validate()?;
        let mut strategy = self.inner.strategy.lock().await;

        match strategy.send_command(&wire).await {
            Ok(source) => {
                info!(device_id = %self.inner.device_id, command = wire.name(), %source, "command accepted");
            }
            Err(e) => {
                warn!(device_id = %self.inner.device_id, command = wire.name(), error = %e, "command failed");
                let connection = strategy.connection_state();
                let fatal_auth = e.is_auth_expired() && !strategy.has_local_path();
                let threshold = self.inner.settings.failure_threshold;
                let now = Instant::now();

                let mut before = (Availability::Stale, false);
                let mut after = before;
                self.inner.snapshot.send_modify(|arc| {
                    let snap = Arc::make_mut(arc);
                    before = (snap.availability, snap.connection.reauth_required);
                    // Other command failures leave availability to the poll cycle.
                    if fatal_auth {
                        snap.record_failure(&e, threshold, true, now);
                    }
                    snap.connection = connection.clone();
                    after = (snap.availability, snap.connection.reauth_required);
                });
                self.announce(before, after);
                return Err(e);
            }
        }

        if let Some(requested) = command.requested_recirculation() {
            let now = Instant::now();
            self.inner.snapshot.send_modify(|snap| {
                Arc::make_mut(snap).request_recirculation(requested, now);
            });
        }

        if let Err(e) = self.run_cycle(&mut strategy).await {
            debug!(device_id = %self.inner.device_id, error = %e, "confirmation read failed");
        }
        Ok(())
    }

    pub(crate) fn update_firmware(&self, firmware: Option<String>) {
        self.inner.snapshot.send_if_modified(|snap| {
            if firmware.is_none() || snap.device.firmware_version == firmware {
                return false;
            }
            let snap = Arc::make_mut(snap);
            let mut device = (*snap.device).clone();
            info!(device_id = %device.id, from = ?device.firmware_version, to = ?firmware, "firmware changed");
            device.firmware_version = firmware;
            snap.device = Arc::new(device);
            true
        });
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn run_maintenance(&self) {
        let mut strategy = self.inner.strategy.lock().await;
        let command = tankless_api::DeviceCommand::MaintenanceRetrieval;
        if let Err(e) = strategy.send_command(&command).await {
            debug!(device_id = %self.inner.device_id, error = %e, "maintenance retrieval failed");
        }
        if let Err(e) = self.run_cycle(&mut strategy).await {
            debug!(device_id = %self.inner.device_id, error = %e, "post-maintenance read failed");
        }
    }

    async fn run_cycle(&self, strategy: &mut ConnectionStrategy) -> Result<(), CoreError> {
        let result = strategy.fetch_status().await;
        let connection = strategy.connection_state();
        let fatal_auth = !strategy.has_local_path();
        let threshold = self.inner.settings.failure_threshold;
        let now = Instant::now();

        let mut before = (Availability::Stale, false);
        let mut after = before;
        self.inner.snapshot.send_modify(|arc| {
            let snap = Arc::make_mut(arc);
            before = (snap.availability, snap.connection.reauth_required);
            match &result {
                Ok((props, source)) => {
                    snap.record_success(convert::device_state(props, *source, Utc::now()), now);
                }
                Err(e) => {
                    snap.record_failure(e, threshold, e.is_auth_expired() && fatal_auth, now);
                }
            }
            snap.connection = connection.clone();
            after = (snap.availability, snap.connection.reauth_required);
        });

        match &result {
            Ok((_, source)) => {
                debug!(device_id = %self.inner.device_id, %source, "poll succeeded");
            }
            Err(e) => {
                let streak = self.inner.snapshot.borrow().failure_streak;
                warn!(device_id = %self.inner.device_id, error = %e, streak, "poll failed");
            }
        }

        self.announce(before, after);
        result.map(|_| ())
    }

    /// Emit events for an `(availability, reauth_required)` transition.
    fn announce(&self, before: (Availability, bool), after: (Availability, bool)) {
        if before.0 != after.0 {
            info!(device_id = %self.inner.device_id, from = %before.0, to = %after.0, "availability changed");
            self.emit(HubEvent::AvailabilityChanged {
                device_id: self.inner.device_id.clone(),
                availability: after.0,
            });
        }
        if !before.1 && after.1 {
            self.raise_reauth();
        }
    }

    fn raise_reauth(&self) {
        error!(device_id = %self.inner.device_id, "cloud session expired, re-authentication required");
        self.emit(HubEvent::ReauthRequired {
            device_id: self.inner.device_id.clone(),
        });
    }

    fn emit(&self, event: HubEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn poll_task(coordinator: DeviceCoordinator, period: Duration, cancel: CancellationToken) {
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
                    _ = coordinator.refresh() => {}
                }
            }
        }
    }
    debug!(device_id = %coordinator.device_id(), "poll task exiting");
}

async fn maintenance_task(coordinator: DeviceCoordinator, period: Duration, cancel: CancellationToken) {
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
                    () = coordinator.run_maintenance() => {}
                }
            }
        }
    }
    debug!(device_id = %coordinator.device_id(), "maintenance task exiting");
}
