//! Error types and handling for Heatshed
//!
//! This module defines the error types used throughout the controller,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Heatshed operations
pub type Result<T> = std::result::Result<T, HeatshedError>;

/// Main error type for Heatshed
#[derive(Debug, Error)]
pub enum HeatshedError {
    /// Malformed field in a teleinfo line; the line is skipped
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Pilot-wire command outside the four known values
    #[error("Invalid command: {value}")]
    InvalidCommand { value: i64 },

    /// Expander module index outside 0..=2
    #[error("Invalid module: {index}")]
    InvalidModule { index: usize },

    /// Wire number outside 1..=8, or an unknown heater id
    #[error("Invalid wire: {message}")]
    InvalidWire { message: String },

    /// Phase number outside 1..=3
    #[error("Invalid phase: {phase}")]
    InvalidPhase { phase: i64 },

    /// Bus transaction failed
    #[error("Hardware I/O error: {message}")]
    Hardware { message: String },

    /// Command or statistics store failure
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// The controller task is no longer running
    #[error("Controller stopped")]
    Stopped,
}

impl HeatshedError {
    /// Create a new protocol (decode) error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        HeatshedError::Protocol {
            message: message.into(),
        }
    }

    /// Create a new invalid command error
    pub fn invalid_command(value: i64) -> Self {
        HeatshedError::InvalidCommand { value }
    }

    /// Create a new invalid module error
    pub fn invalid_module(index: usize) -> Self {
        HeatshedError::InvalidModule { index }
    }

    /// Create a new invalid wire error
    pub fn invalid_wire<S: Into<String>>(message: S) -> Self {
        HeatshedError::InvalidWire {
            message: message.into(),
        }
    }

    /// Create a new invalid phase error
    pub fn invalid_phase(phase: i64) -> Self {
        HeatshedError::InvalidPhase { phase }
    }

    /// Create a new hardware I/O error
    pub fn hardware<S: Into<String>>(message: S) -> Self {
        HeatshedError::Hardware {
            message: message.into(),
        }
    }

    /// Create a new persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        HeatshedError::Persistence {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        HeatshedError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HeatshedError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        HeatshedError::Io {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        HeatshedError::Web {
            message: message.into(),
        }
    }

    /// Caller contract violations: the operation is rejected and nothing changed
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            HeatshedError::InvalidCommand { .. }
                | HeatshedError::InvalidModule { .. }
                | HeatshedError::InvalidWire { .. }
                | HeatshedError::InvalidPhase { .. }
        )
    }
}

impl From<std::io::Error> for HeatshedError {
    fn from(err: std::io::Error) -> Self {
        HeatshedError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeatshedError {
    fn from(err: serde_yaml::Error) -> Self {
        HeatshedError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeatshedError {
    fn from(err: serde_json::Error) -> Self {
        HeatshedError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for HeatshedError {
    fn from(err: std::num::ParseIntError) -> Self {
        HeatshedError::protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = HeatshedError::config("test config error");
        assert!(matches!(err, HeatshedError::Config { .. }));

        let err = HeatshedError::hardware("bus stuck");
        assert!(matches!(err, HeatshedError::Hardware { .. }));

        let err = HeatshedError::validation("field", "test validation error");
        assert!(matches!(err, HeatshedError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = HeatshedError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = HeatshedError::invalid_module(5);
        assert_eq!(format!("{}", err), "Invalid module: 5");

        let err = HeatshedError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );
    }

    #[test]
    fn test_contract_violations() {
        assert!(HeatshedError::invalid_command(7).is_contract_violation());
        assert!(HeatshedError::invalid_phase(4).is_contract_violation());
        assert!(!HeatshedError::hardware("x").is_contract_violation());
        assert!(!HeatshedError::persistence("x").is_contract_violation());
    }
}
