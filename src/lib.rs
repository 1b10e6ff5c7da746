//! BLE session core: scan for peripherals, hold one GATT connection,
//! enumerate its services and read characteristics, with every step
//! recorded in an Event Log.
//!
//! Presentation code talks to a [`SessionHandle`] and observes state through
//! [`StateView`] and [`LogView`]. Platform Bluetooth stacks plug in through
//! the traits in [`radio`]; [`platform`] provides one on `btleplug`.

pub mod config;
pub mod connection;
pub mod device_scanner;
pub mod error;
pub mod event_log;
pub mod gatt;
pub mod manager;
pub mod permission;
pub mod platform;
pub mod radio;
pub mod state;

#[cfg(test)]
mod mock;

pub use config::Config;
pub use connection::ConnectionState;
pub use error::{ConfigError, RadioError, ScanError, SessionError};
pub use event_log::{LogEntry, LogView};
pub use gatt::{CharProperties, CharacteristicNode, CharacteristicRef, PeripheralRef, ServiceNode};
pub use manager::{Command, SessionHandle, SessionManager};
pub use permission::{CapabilitySwitch, PermissionGate};
pub use state::{SessionSnapshot, StateView};
