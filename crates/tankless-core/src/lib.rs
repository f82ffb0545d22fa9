//! Hybrid cloud/local coordination layer between `tankless-api` and consumers.
//!
//! - **[`Hub`]**: Facade that opens the cloud session, runs discovery, and owns
//!   the [`Registry`]. [`Hub::oneshot()`] skips the background tasks for
//!   single CLI invocations.
//!
//! - **[`DeviceCoordinator`]**: One per device. Polls through its
//!   [`ConnectionStrategy`], keeps the last known good [`DeviceSnapshot`] in a
//!   `watch` channel, and sequences commands with their confirmation reads.
//!
//! - **[`ConnectionStrategy`]**: Local first when allowed, cloud as
//!   fallback, with a [`CircuitBreaker`] guarding the local path.
//!
//! - **[`DeviceStream`]**: Subscription handle exposing `current()` /
//!   `latest()` / `changed()`.

pub mod command;
pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod hub;
pub mod model;
pub mod registry;
pub mod strategy;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, RECIRCULATION_MINUTES, TEMPERATURE_RANGE_F};
pub use config::{CloudConfig, CommandPreference, ConnectionMode, HubConfig, PollingConfig};
pub use coordinator::{CoordinatorSettings, DeviceCoordinator};
pub use error::CoreError;
pub use event::HubEvent;
pub use hub::{DeviceDiagnostics, Diagnostics, Hub};
pub use registry::{CoordinatorFactory, DiscoveryReport, Registry};
pub use strategy::{CircuitBreaker, ConnectionStrategy, StrategySettings};
pub use stream::DeviceStream;

pub use model::{
    Availability, CircuitState, ConnectionState, Device, DeviceSnapshot, DeviceState,
    OPTIMISTIC_TIMEOUT, PendingRecirculation, RecirculationCapability, Source,
};
