//! Error types and handling for Ladewerk
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Ladewerk operations
pub type Result<T> = std::result::Result<T, LadewerkError>;

/// Main error type for Ladewerk
#[derive(Debug, Error)]
pub enum LadewerkError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Telemetry gateway read/write errors
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    /// Geocoding lookups for trip destinations
    #[error("Geocoding error: {message}")]
    Geocoding { message: String },

    /// Calendar source errors
    #[error("Calendar error: {message}")]
    Calendar { message: String },

    /// Charge planning errors
    #[error("Planning error: {message}")]
    Planning { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl LadewerkError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        Self::Telemetry {
            message: message.into(),
        }
    }

    /// Create a new geocoding error
    pub fn geocoding<S: Into<String>>(message: S) -> Self {
        Self::Geocoding {
            message: message.into(),
        }
    }

    /// Create a new calendar error
    pub fn calendar<S: Into<String>>(message: S) -> Self {
        Self::Calendar {
            message: message.into(),
        }
    }

    /// Create a new planning error
    pub fn planning<S: Into<String>>(message: S) -> Self {
        Self::Planning {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for LadewerkError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LadewerkError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LadewerkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(any(feature = "homeassistant", feature = "geocoding"))]
impl From<reqwest::Error> for LadewerkError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<chrono::ParseError> for LadewerkError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Validation {
            field: "datetime".to_string(),
            message: err.to_string(),
        }
    }
}
