// tankless-api: Async clients for the water heater's cloud API and local control port

pub mod cloud;
pub mod command;
pub mod error;
pub mod local;
pub mod model;
pub mod session;
pub mod transport;

pub use cloud::CloudClient;
pub use command::DeviceCommand;
pub use error::Error;
pub use local::{LOCAL_PORT, LocalClient, LocalEndpoint, LocalTimeouts};
pub use model::{CloudDevice, PropertyMap, PropertyValue, RecirculationCapability, SysInfo};
pub use session::{MemoryTokenStore, Session, SessionManager, TokenPair, TokenStore};
pub use transport::TransportConfig;
