//! # Error Types Module
//!
//! Centralized error handling for the BLE inspector.
//!
//! ## Error Types
//! - `SessionError`: Failures of scan/connect/read intents handled by the core
//! - `RadioError`: Refusals reported by the platform radio or an open link
//! - `ScanError`: Bluetooth backend bring-up failures
//! - `ConfigError`: Configuration file I/O and parsing errors
//!
//! None of these reach presentation code directly. The core turns each
//! failure into an Event Log entry and keeps its state consistent; the
//! `Result` values exist so callers and tests can see what happened.

use std::fmt;

/// Errors produced by the session core when an intent cannot proceed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Capability check failed before a privileged operation
    PermissionDenied,
    /// No usable radio handle
    AdapterUnavailable,
    /// A connection attempt is already outstanding
    AlreadyConnecting,
    /// A link is already established
    AlreadyConnected,
    /// The link dropped without being asked to
    LinkLost,
    /// Service enumeration failed; no automatic retry
    DiscoveryFailed,
    /// The platform refused the request
    Radio(RadioError),
    /// The session manager is no longer draining its queue
    ManagerStopped,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied => {
                write!(f, "Missing required permissions")
            }
            SessionError::AdapterUnavailable => {
                write!(f, "Scanner not available")
            }
            SessionError::AlreadyConnecting => {
                write!(f, "A connection attempt is already in progress")
            }
            SessionError::AlreadyConnected => {
                write!(f, "Already connected to a device")
            }
            SessionError::LinkLost => {
                write!(f, "Link to device was lost")
            }
            SessionError::DiscoveryFailed => {
                write!(f, "Service discovery failed")
            }
            SessionError::Radio(e) => {
                write!(f, "Radio error: {}", e)
            }
            SessionError::ManagerStopped => {
                write!(f, "Session manager has stopped")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Radio(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RadioError> for SessionError {
    fn from(e: RadioError) -> Self {
        SessionError::Radio(e)
    }
}

/// Errors reported by a radio adapter or link handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Bluetooth adapter not found or not available
    NoAdapter,
    /// No known peripheral with this address
    PeripheralNotFound(String),
    /// The connected peripheral does not expose this characteristic
    CharacteristicNotFound(String),
    /// The link task is gone
    LinkClosed,
    /// Any other platform failure
    Platform(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::NoAdapter => {
                write!(f, "No Bluetooth adapter found. Please ensure Bluetooth is enabled.")
            }
            RadioError::PeripheralNotFound(address) => {
                write!(f, "Device {} not found", address)
            }
            RadioError::CharacteristicNotFound(uuid) => {
                write!(f, "Characteristic {} not found", uuid)
            }
            RadioError::LinkClosed => {
                write!(f, "Link is closed")
            }
            RadioError::Platform(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for RadioError {}

impl From<btleplug::Error> for RadioError {
    fn from(e: btleplug::Error) -> Self {
        RadioError::Platform(e.to_string())
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Errors that can occur while bringing up the Bluetooth backend
#[derive(Debug, Clone)]
pub enum ScanError {
    /// Bluetooth manager initialization failed
    ManagerInit(String),
    /// Listing adapters failed
    AdapterQuery(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::ManagerInit(msg) => {
                write!(f, "Failed to initialize Bluetooth manager: {}", msg)
            }
            ScanError::AdapterQuery(msg) => {
                write!(f, "Failed to query Bluetooth adapters: {}", msg)
            }
        }
    }
}

impl std::error::Error for ScanError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_permission_denied_display() {
        let err = SessionError::PermissionDenied;
        assert_eq!(err.to_string(), "Missing required permissions");
    }

    #[test]
    fn test_radio_error_chain() {
        let err = SessionError::from(RadioError::NoAdapter);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("Bluetooth"));
    }

    #[test]
    fn test_config_error_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
    }
}
