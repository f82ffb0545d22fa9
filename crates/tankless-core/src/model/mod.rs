// ── Domain model ──
//
// Canonical device types, independent of which transport produced them.

mod connection;
mod device;
mod snapshot;
mod state;

pub use connection::{CircuitState, ConnectionState};
pub use device::Device;
pub use snapshot::{DeviceSnapshot, OPTIMISTIC_TIMEOUT, PendingRecirculation};
pub use state::{Availability, DeviceState, Source};
pub use tankless_api::RecirculationCapability;
