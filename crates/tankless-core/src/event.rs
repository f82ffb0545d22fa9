use std::sync::Arc;

use serde::Serialize;

use crate::model::{Availability, Device};

/// Notifications for the outer system, fanned out on a broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    DeviceAdded { device: Arc<Device> },
    DeviceRemoved { device_id: String },
    /// The cloud session is gone and needs a fresh login.
    ReauthRequired { device_id: String },
    AvailabilityChanged {
        device_id: String,
        availability: Availability,
    },
}
