use serde::Serialize;
use strum::{Display, EnumString};

use crate::config::ConnectionMode;

/// Local-path circuit of a hybrid coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Local is tried first every cycle.
    #[default]
    LocalPreferred,
    /// Local is skipped until the cooldown elapses, then probed once.
    LocalDegraded,
    /// The cooldown is pinned at its cap; cloud serves until a probe succeeds.
    CloudOnly,
}

/// Point-in-time view of a coordinator's transport health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub mode: ConnectionMode,
    pub local_endpoint: Option<String>,
    pub consecutive_local_failures: u32,
    pub consecutive_cloud_failures: u32,
    pub circuit: CircuitState,
    pub reauth_required: bool,
}
