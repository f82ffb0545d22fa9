use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

/// Which transport produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    Local,
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Availability {
    /// The last poll succeeded.
    Available,
    /// Recent polls failed; the last known good readings are still shown.
    Stale,
    /// Too many consecutive failures, or the cloud session expired with no local path.
    Unavailable,
}

/// One poll's worth of readings. Sensor values are always what the
/// heater reported; nothing here is optimistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub outlet_temp: Option<f64>,
    pub inlet_temp: Option<f64>,
    pub domestic_temp: Option<f64>,
    pub target_temp: Option<f64>,
    pub flow_rate: Option<f64>,
    pub combustion_cycles: Option<u64>,
    pub operation_hours: Option<u64>,
    pub pump_hours: Option<u64>,
    pub pump_cycles: Option<u64>,
    pub fan_current: Option<f64>,
    pub fan_frequency: Option<f64>,
    pub power_on: Option<bool>,
    pub heating: Option<bool>,
    pub recirculating: Option<bool>,
    pub vacation_mode: Option<bool>,
    pub last_updated: DateTime<Utc>,
    pub source: Source,
    pub availability: Availability,
}
