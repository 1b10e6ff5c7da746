//! # Configuration Management Module
//!
//! Persistent settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `log_capacity`: Maximum number of Event Log entries kept in memory
//! - `scan_duration_secs`: How long the command-line front end scans
//! - `connect_timeout_secs`: How long it waits for a connection to become ready
//! - `log_level`: Default `env_logger` filter when `RUST_LOG` is unset
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/ble-inspector/config.toml
//! - Linux: ~/.config/ble-inspector/config.toml
//! - Windows: %APPDATA%\ble-inspector\config.toml

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_capacity: usize,
    pub scan_duration_secs: u64,
    pub connect_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_capacity: 1000,
            scan_duration_secs: 5,
            connect_timeout_secs: 15,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ble-inspector")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Load config from `path`, writing defaults there if the file is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents)
                    .map_err(ConfigError::ParseFailed)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string)
            .map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    /// Event Log capacity, never below one entry
    pub fn effective_log_capacity(&self) -> usize {
        self.log_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_capacity, 1000);
        assert_eq!(config.scan_duration_secs, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            log_capacity: 50,
            scan_duration_secs: 10,
            connect_timeout_secs: 3,
            log_level: "debug".to_string(),
        };

        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        assert!(toml_str.contains("log_capacity = 50"));
        assert!(toml_str.contains("log_level = \"debug\""));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            scan_duration_secs = 12
        "#;

        let config: Config = toml::from_str(toml_str).expect("Failed to deserialize");
        assert_eq!(config.scan_duration_secs, 12);
        assert_eq!(config.log_capacity, 1000);
        assert_eq!(config.connect_timeout_secs, 15);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            log_capacity: 7,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "log_capacity = \"lots\"").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let config = Config {
            log_capacity: 0,
            ..Config::default()
        };
        assert_eq!(config.effective_log_capacity(), 1);
    }
}
