// Control commands in their wire shapes.
//
// Validation of ranges lives in `tankless-core`; here a command is assumed
// well-formed and is only translated into local `set` frames or a cloud
// command body.

use serde::Serialize;
use serde_json::{Value, json};

/// A control operation understood by both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Domestic hot water setpoint in °F.
    SetTemperature { fahrenheit: u16 },
    SetPower { on: bool },
    StartRecirculation { minutes: u16 },
    StopRecirculation,
    SetVacationMode { on: bool },
    /// Ask the heater to refresh its maintenance counters (`m*` fields).
    MaintenanceRetrieval,
}

/// One `set <property> <value>` line on the local control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFrame {
    pub property: &'static str,
    pub value: String,
}

impl SetFrame {
    fn new(property: &'static str, value: impl ToString) -> Self {
        Self {
            property,
            value: value.to_string(),
        }
    }

    /// The line written to the socket, without the trailing newline.
    pub fn line(&self) -> String {
        format!("set {} {}", self.property, self.value)
    }
}

impl DeviceCommand {
    /// Local frames, in the order they must be sent.
    pub fn local_frames(&self) -> Vec<SetFrame> {
        match *self {
            Self::SetTemperature { fahrenheit } => {
                vec![SetFrame::new("set_domestic_temperature", fahrenheit)]
            }
            Self::SetPower { on } => vec![SetFrame::new("set_operation_enabled", on)],
            Self::StartRecirculation { minutes } => vec![
                SetFrame::new("recirculation_duration", minutes),
                SetFrame::new("set_recirculation_enabled", true),
            ],
            Self::StopRecirculation => vec![SetFrame::new("set_recirculation_enabled", false)],
            Self::SetVacationMode { on } => vec![SetFrame::new("schedule_holiday", on)],
            Self::MaintenanceRetrieval => vec![SetFrame::new("do_maintenance_retrieval", true)],
        }
    }

    /// JSON body for `POST /devices/{id}/commands`.
    pub fn cloud_body(&self) -> Value {
        match *self {
            Self::SetTemperature { fahrenheit } => {
                json!({ "command": "set_domestic_temperature", "value": fahrenheit })
            }
            Self::SetPower { on } => json!({ "command": "set_operation_enabled", "value": on }),
            Self::StartRecirculation { minutes } => {
                json!({ "command": "start_recirculation", "value": minutes })
            }
            Self::StopRecirculation => json!({ "command": "stop_recirculation", "value": null }),
            Self::SetVacationMode { on } => json!({ "command": "schedule_holiday", "value": on }),
            Self::MaintenanceRetrieval => {
                json!({ "command": "do_maintenance_retrieval", "value": true })
            }
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTemperature { .. } => "set_temperature",
            Self::SetPower { .. } => "set_power",
            Self::StartRecirculation { .. } => "start_recirculation",
            Self::StopRecirculation => "stop_recirculation",
            Self::SetVacationMode { .. } => "set_vacation_mode",
            Self::MaintenanceRetrieval => "maintenance_retrieval",
        }
    }
}
