//! Configuration management for Heatshed
//!
//! This module handles loading, validation, and management of the controller
//! configuration from YAML files.

use crate::error::{HeatshedError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Teleinfo serial input
    pub serial: SerialConfig,

    /// GPIO-expander bus
    pub bus: BusConfig,

    /// Command and statistics stores
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Teleinfo serial input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Character device the meter stream is read from
    pub device: String,

    /// Line speed; historic teleinfo meters send at 1200 baud
    pub baud_rate: u32,

    /// Data bits per character (5 to 8)
    pub data_bits: u8,

    /// Parity bit
    pub parity: SerialParity,

    /// Stop bits (1 or 2)
    pub stop_bits: u8,
}

/// Parity setting of the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    None,
    Even,
    Odd,
}

/// Which bus implementation drives the expander modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Linux I2C character device `/dev/i2c-{bus_number}`
    I2c,
    /// In-memory register file, for bench runs without hardware
    Simulated,
}

/// GPIO-expander bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus implementation
    pub kind: BusKind,

    /// Bus number (e.g. 1 for /dev/i2c-1)
    pub bus_number: u8,
}

/// Store file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Heater command rows (JSON)
    pub commands_file: String,

    /// Flushed statistics windows (JSON)
    pub statistics_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyAMA0".to_string(),
            baud_rate: 1200,
            data_bits: 7,
            parity: SerialParity::Even,
            stop_bits: 1,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::I2c,
            bus_number: 1,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            commands_file: "/data/heatshed_commands.json".to_string(),
            statistics_file: "/data/heatshed_statistics.json".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/heatshed.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "heatshed.yaml",
            "/data/heatshed.yaml",
            "/etc/heatshed/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial.device.trim().is_empty() {
            return Err(HeatshedError::validation(
                "serial.device",
                "Device path cannot be empty",
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(HeatshedError::validation(
                "serial.baud_rate",
                "Baud rate must be greater than 0",
            ));
        }

        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(HeatshedError::validation(
                "serial.data_bits",
                "Data bits must be between 5 and 8",
            ));
        }

        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(HeatshedError::validation(
                "serial.stop_bits",
                "Stop bits must be 1 or 2",
            ));
        }

        if self.storage.commands_file.trim().is_empty() {
            return Err(HeatshedError::validation(
                "storage.commands_file",
                "Path cannot be empty",
            ));
        }

        if self.storage.statistics_file.trim().is_empty() {
            return Err(HeatshedError::validation(
                "storage.statistics_file",
                "Path cannot be empty",
            ));
        }

        if self.web.port == 0 {
            return Err(HeatshedError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.device, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 1200);
        assert_eq!(config.serial.data_bits, 7);
        assert_eq!(config.serial.parity, SerialParity::Even);
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.bus.kind, BusKind::I2c);
        assert_eq!(config.bus.bus_number, 1);
        assert_eq!(config.web.port, 3000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.serial.device = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.web.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.storage.statistics_file = " ".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.serial.data_bits = 9;
        assert!(config.validate().is_err());

        config = Config::default();
        config.serial.stop_bits = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.web.port, deserialized.web.port);
        assert_eq!(config.serial.device, deserialized.serial.device);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("serial:\n  device: /dev/ttyUSB0\n").unwrap();
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.logging.level, "INFO");
        assert_eq!(config.serial.baud_rate, 1200);
        assert_eq!(config.bus.kind, BusKind::I2c);
    }
}
