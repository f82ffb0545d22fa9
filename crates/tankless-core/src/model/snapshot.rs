use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::{Availability, ConnectionState, Device, DeviceState};
use crate::error::CoreError;

/// How long a requested recirculation value is displayed before the poll
/// result wins regardless.
pub const OPTIMISTIC_TIMEOUT: Duration = Duration::from_secs(30);

/// A recirculation change the heater has accepted but not yet reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRecirculation {
    pub requested: bool,
    pub since: Instant,
}

/// Immutable view of one device, replaced wholesale by its coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device: Arc<Device>,
    /// Last known good readings. `None` until the first successful poll.
    pub state: Option<DeviceState>,
    pub availability: Availability,
    /// Consecutive failed polls across both transports.
    pub failure_streak: u32,
    pub connection: ConnectionState,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub pending_recirculation: Option<PendingRecirculation>,
}

impl DeviceSnapshot {
    pub fn new(device: Arc<Device>, connection: ConnectionState) -> Self {
        Self {
            device,
            state: None,
            availability: Availability::Stale,
            failure_streak: 0,
            connection,
            last_error: None,
            pending_recirculation: None,
        }
    }

    /// Recirculation as a switch should show it: the pending request while
    /// it is fresh, otherwise the confirmed reading.
    pub fn recirculation_display(&self) -> Option<bool> {
        self.recirculation_display_at(Instant::now())
    }

    pub fn recirculation_display_at(&self, now: Instant) -> Option<bool> {
        match self.pending_recirculation {
            Some(p) if now.duration_since(p.since) < OPTIMISTIC_TIMEOUT => Some(p.requested),
            _ => self.state.as_ref().and_then(|s| s.recirculating),
        }
    }

    pub(crate) fn record_success(&mut self, mut state: DeviceState, now: Instant) {
        if let Some(prev) = &self.state {
            state.last_updated = state.last_updated.max(prev.last_updated);
        }
        state.availability = Availability::Available;

        if let Some(p) = self.pending_recirculation {
            let confirmed = state.recirculating == Some(p.requested);
            if confirmed || now.duration_since(p.since) >= OPTIMISTIC_TIMEOUT {
                self.pending_recirculation = None;
            }
        }

        self.state = Some(state);
        self.availability = Availability::Available;
        self.failure_streak = 0;
        self.last_error = None;
    }

    /// `fatal` skips the streak threshold (cloud session gone, no local path).
    pub(crate) fn record_failure(
        &mut self,
        error: &CoreError,
        threshold: u32,
        fatal: bool,
        now: Instant,
    ) {
        self.failure_streak = self.failure_streak.saturating_add(1);
        self.availability = if fatal || self.failure_streak >= threshold {
            Availability::Unavailable
        } else {
            Availability::Stale
        };
        if let Some(state) = self.state.as_mut() {
            state.availability = self.availability;
        }
        if self
            .pending_recirculation
            .is_some_and(|p| now.duration_since(p.since) >= OPTIMISTIC_TIMEOUT)
        {
            self.pending_recirculation = None;
        }
        self.last_error = Some(error.to_string());
    }

    pub(crate) fn request_recirculation(&mut self, requested: bool, now: Instant) {
        self.pending_recirculation = Some(PendingRecirculation {
            requested,
            since: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::config::ConnectionMode;
    use crate::model::{CircuitState, RecirculationCapability, Source};

    fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot::new(
            Arc::new(Device {
                id: "dev-1".into(),
                serial: None,
                firmware_version: None,
                model: None,
                name: None,
                recirculation: RecirculationCapability::BuiltIn,
            }),
            ConnectionState {
                mode: ConnectionMode::Cloud,
                local_endpoint: None,
                consecutive_local_failures: 0,
                consecutive_cloud_failures: 0,
                circuit: CircuitState::LocalPreferred,
                reauth_required: false,
            },
        )
    }

    fn state(recirculating: bool, last_updated: chrono::DateTime<Utc>) -> DeviceState {
        DeviceState {
            outlet_temp: Some(118.0),
            inlet_temp: None,
            domestic_temp: None,
            target_temp: Some(120.0),
            flow_rate: None,
            combustion_cycles: None,
            operation_hours: None,
            pump_hours: None,
            pump_cycles: None,
            fan_current: None,
            fan_frequency: None,
            power_on: Some(true),
            heating: None,
            recirculating: Some(recirculating),
            vacation_mode: None,
            last_updated,
            source: Source::Cloud,
            availability: Availability::Stale,
        }
    }

    fn timeout_err() -> CoreError {
        CoreError::Timeout {
            endpoint: "heater".into(),
            timeout_ms: 5000,
        }
    }

    #[test]
    fn last_updated_never_moves_backwards() {
        let mut snap = snapshot();
        let now = Instant::now();
        let t1 = Utc::now();
        snap.record_success(state(false, t1), now);
        snap.record_success(state(false, t1 - TimeDelta::seconds(30)), now);
        assert_eq!(snap.state.as_ref().map(|s| s.last_updated), Some(t1));
    }

    #[test]
    fn failures_go_stale_then_unavailable() {
        let mut snap = snapshot();
        let now = Instant::now();
        snap.record_success(state(false, Utc::now()), now);

        snap.record_failure(&timeout_err(), 3, false, now);
        assert_eq!(snap.availability, Availability::Stale);
        snap.record_failure(&timeout_err(), 3, false, now);
        assert_eq!(snap.availability, Availability::Stale);
        snap.record_failure(&timeout_err(), 3, false, now);
        assert_eq!(snap.availability, Availability::Unavailable);
        // Last known good readings survive.
        assert_eq!(snap.state.as_ref().and_then(|s| s.outlet_temp), Some(118.0));

        snap.record_success(state(false, Utc::now()), now);
        assert_eq!(snap.availability, Availability::Available);
        assert_eq!(snap.failure_streak, 0);
    }

    #[test]
    fn fatal_failure_is_unavailable_immediately() {
        let mut snap = snapshot();
        snap.record_failure(&CoreError::AuthExpired, 3, true, Instant::now());
        assert_eq!(snap.availability, Availability::Unavailable);
    }

    #[test]
    fn optimistic_recirculation_until_confirmed() {
        let mut snap = snapshot();
        let start = Instant::now();
        snap.record_success(state(false, Utc::now()), start);

        snap.request_recirculation(true, start);
        assert_eq!(snap.recirculation_display_at(start), Some(true));
        // Sensor-side value stays confirmed-only.
        assert_eq!(snap.state.as_ref().and_then(|s| s.recirculating), Some(false));

        // Heater has not caught up yet: keep showing the request.
        snap.record_success(state(false, Utc::now()), start + Duration::from_secs(5));
        assert_eq!(
            snap.recirculation_display_at(start + Duration::from_secs(5)),
            Some(true)
        );

        snap.record_success(state(true, Utc::now()), start + Duration::from_secs(10));
        assert!(snap.pending_recirculation.is_none());
        assert_eq!(
            snap.recirculation_display_at(start + Duration::from_secs(10)),
            Some(true)
        );
    }

    #[test]
    fn optimistic_recirculation_expires() {
        let mut snap = snapshot();
        let start = Instant::now();
        snap.record_success(state(false, Utc::now()), start);
        snap.request_recirculation(true, start);

        let later = start + OPTIMISTIC_TIMEOUT;
        assert_eq!(snap.recirculation_display_at(later), Some(false));
        snap.record_success(state(false, Utc::now()), later);
        assert!(snap.pending_recirculation.is_none());
    }
}
