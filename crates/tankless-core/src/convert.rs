// ── Wire → domain conversion ──
//
// Both transports deliver a flat `PropertyMap`; this is the single place
// that knows the heater's property names.

use chrono::{DateTime, Utc};
use tankless_api::{CloudDevice, PropertyMap, PropertyValue, SysInfo};

use crate::model::{Availability, Device, DeviceState, RecirculationCapability, Source};

impl From<CloudDevice> for Device {
    fn from(d: CloudDevice) -> Self {
        Self {
            id: d.id,
            serial: d.serial,
            firmware_version: d.firmware,
            model: d.model,
            name: d.name,
            recirculation: d.recirculation.unwrap_or_default(),
        }
    }
}

/// Local mode has no account to list devices from; the heater is its own
/// registry and the serial is its id.
pub fn device_from_sysinfo(info: SysInfo) -> Device {
    Device {
        id: info.serial.clone(),
        serial: Some(info.serial),
        firmware_version: info.firmware,
        model: None,
        name: None,
        recirculation: RecirculationCapability::default(),
    }
}

pub fn device_state(props: &PropertyMap, source: Source, at: DateTime<Utc>) -> DeviceState {
    DeviceState {
        outlet_temp: number(props, "m02_outlet_temperature"),
        inlet_temp: number(props, "m08_inlet_temperature"),
        domestic_temp: number(props, "domestic_temperature"),
        target_temp: number(props, "set_domestic_temperature")
            .or_else(|| number(props, "domestic_temperature")),
        flow_rate: number(props, "m01_water_flow_rate_raw"),
        combustion_cycles: count(props, "m04_combustion_cycles"),
        operation_hours: count(props, "operation_hours")
            .or_else(|| count(props, "m03_combustion_hours_raw")),
        pump_hours: count(props, "m19_pump_hours"),
        pump_cycles: count(props, "m20_pump_cycles"),
        fan_current: number(props, "m09_fan_current"),
        fan_frequency: number(props, "m05_fan_frequency"),
        power_on: flag(props, "operation_enabled"),
        heating: flag(props, "domestic_combustion"),
        recirculating: flag(props, "recirculation_enabled"),
        vacation_mode: flag(props, "schedule_holiday"),
        last_updated: at,
        source,
        availability: Availability::Available,
    }
}

fn number(props: &PropertyMap, key: &str) -> Option<f64> {
    props.get(key).and_then(PropertyValue::as_f64)
}

fn flag(props: &PropertyMap, key: &str) -> Option<bool> {
    props.get(key).and_then(PropertyValue::as_bool)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
fn count(props: &PropertyMap, key: &str) -> Option<u64> {
    match props.get(key)? {
        PropertyValue::Int(n) => u64::try_from(*n).ok(),
        other => other
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f < 9.0e15)
            .map(|f| f as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn readings_map_from_property_names() {
        let p = props(&[
            ("m02_outlet_temperature", PropertyValue::Int(118)),
            ("m08_inlet_temperature", PropertyValue::Text("60".into())),
            ("set_domestic_temperature", PropertyValue::Int(120)),
            ("operation_enabled", PropertyValue::Bool(true)),
            ("recirculation_enabled", PropertyValue::Text("off".into())),
            ("m04_combustion_cycles", PropertyValue::Float(1234.0)),
            ("m03_combustion_hours_raw", PropertyValue::Int(88)),
        ]);
        let at = Utc::now();
        let state = device_state(&p, Source::Local, at);

        assert_eq!(state.outlet_temp, Some(118.0));
        assert_eq!(state.inlet_temp, Some(60.0));
        assert_eq!(state.target_temp, Some(120.0));
        assert_eq!(state.power_on, Some(true));
        assert_eq!(state.recirculating, Some(false));
        assert_eq!(state.combustion_cycles, Some(1234));
        assert_eq!(state.operation_hours, Some(88));
        assert_eq!(state.source, Source::Local);
        assert_eq!(state.last_updated, at);
    }

    #[test]
    fn missing_and_negative_values_are_absent() {
        let p = props(&[("m19_pump_hours", PropertyValue::Int(-1))]);
        let state = device_state(&p, Source::Cloud, Utc::now());
        assert_eq!(state.pump_hours, None);
        assert_eq!(state.outlet_temp, None);
    }

    #[test]
    fn sysinfo_serial_becomes_id() {
        let device = device_from_sysinfo(SysInfo {
            serial: "SN-42".into(),
            firmware: Some("3.1".into()),
        });
        assert_eq!(device.id, "SN-42");
        assert_eq!(device.display_name(), "SN-42");
    }
}
