use serde::Serialize;
use tankless_api::RecirculationCapability;

/// A discovered heater. Identity fields never change after discovery;
/// only `firmware_version` is refreshed by later discovery cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    pub serial: Option<String>,
    pub firmware_version: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub recirculation: RecirculationCapability,
}

impl Device {
    /// Name for display: the user-assigned name, falling back to the serial and then the id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.serial.as_deref())
            .unwrap_or(&self.id)
    }
}
