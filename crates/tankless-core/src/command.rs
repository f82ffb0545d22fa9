// ── Control commands ──
//
// User-level commands, validated before anything touches a transport.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tankless_api::DeviceCommand;

use crate::error::CoreError;

/// Accepted domestic hot water setpoints, °F.
pub const TEMPERATURE_RANGE_F: RangeInclusive<u16> = 110..=140;

/// Accepted recirculation run times, minutes.
pub const RECIRCULATION_MINUTES: RangeInclusive<u16> = 5..=300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetTemperature { fahrenheit: u16 },
    SetPower { on: bool },
    /// `minutes` is ignored when turning recirculation off.
    SetRecirculation { on: bool, minutes: u16 },
    SetVacationMode { on: bool },
    RequestMaintenance,
}

impl Command {
    /// Check ranges and translate to the wire command.
    pub fn validate(&self) -> Result<DeviceCommand, CoreError> {
        Ok(match *self {
            Self::SetTemperature { fahrenheit } => {
                if !TEMPERATURE_RANGE_F.contains(&fahrenheit) {
                    return Err(CoreError::InvalidArgument {
                        message: format!(
                            "temperature {fahrenheit}°F outside {}-{}°F",
                            TEMPERATURE_RANGE_F.start(),
                            TEMPERATURE_RANGE_F.end()
                        ),
                    });
                }
                DeviceCommand::SetTemperature { fahrenheit }
            }
            Self::SetPower { on } => DeviceCommand::SetPower { on },
            Self::SetRecirculation { on: true, minutes } => {
                validate_recirculation_minutes(minutes)?;
                DeviceCommand::StartRecirculation { minutes }
            }
            Self::SetRecirculation { on: false, .. } => DeviceCommand::StopRecirculation,
            Self::SetVacationMode { on } => DeviceCommand::SetVacationMode { on },
            Self::RequestMaintenance => DeviceCommand::MaintenanceRetrieval,
        })
    }

    /// The recirculation value this command asks for, if any.
    pub fn requested_recirculation(&self) -> Option<bool> {
        match self {
            Self::SetRecirculation { on, .. } => Some(*on),
            _ => None,
        }
    }
}

pub fn validate_recirculation_minutes(minutes: u16) -> Result<(), CoreError> {
    if RECIRCULATION_MINUTES.contains(&minutes) {
        Ok(())
    } else {
        Err(CoreError::InvalidArgument {
            message: format!(
                "recirculation duration {minutes} min outside {}-{} min",
                RECIRCULATION_MINUTES.start(),
                RECIRCULATION_MINUTES.end()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_bounds_are_inclusive() {
        assert_eq!(
            Command::SetTemperature { fahrenheit: 110 }.validate().ok(),
            Some(DeviceCommand::SetTemperature { fahrenheit: 110 })
        );
        assert!(Command::SetTemperature { fahrenheit: 140 }.validate().is_ok());
        assert!(matches!(
            Command::SetTemperature { fahrenheit: 141 }.validate(),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::SetTemperature { fahrenheit: 109 }.validate(),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(Command::SetTemperature { fahrenheit: 100 }.validate().is_err());
    }

    #[test]
    fn recirculation_duration_is_checked_only_when_starting() {
        assert!(matches!(
            Command::SetRecirculation { on: true, minutes: 400 }.validate(),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(
            Command::SetRecirculation { on: true, minutes: 15 }.validate().ok(),
            Some(DeviceCommand::StartRecirculation { minutes: 15 })
        );
        assert_eq!(
            Command::SetRecirculation { on: false, minutes: 0 }.validate().ok(),
            Some(DeviceCommand::StopRecirculation)
        );
    }
}
