//! SEM6000 session layer.
//!
//! Drives a Voltcraft SEM6000 plug over an abstract [`Transport`]: login
//! handshake, measurement refresh cycles with a deadline, switch commands
//! reconciled against acknowledgements, and recovery by forced reconnect.
//!
//! # Modules
//!
//! - [`coordinator`]: the per-device session state machine
//! - [`transport`]: the link trait a BLE stack implements
//! - [`sim`]: an in-process plug emulator
//! - [`registry`]: address-keyed ownership of sessions
//! - [`poller`]: interval scheduling of refreshes
//! - [`config`]: YAML configuration

pub mod config;
pub mod coordinator;
pub mod poller;
pub mod registry;
pub mod sim;
pub mod state;
pub mod transport;

pub use config::{AppConfig, ConfigError, DeviceConfig, SessionConfig, SimulatorConfig};
pub use coordinator::{CommandError, RefreshError, SessionCoordinator, SessionPhase};
pub use poller::{PollSummary, Poller};
pub use registry::{normalize_address, RegistryError, SessionRegistry};
pub use sim::{FaultInjection, SimulatedPlug};
pub use state::DeviceState;
pub use transport::{NotificationHandler, Transport, TransportError};
