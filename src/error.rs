//! # Error Types
//!
//! Custom error types for the flight telemetry loop using `thiserror`.

use thiserror::Error;

/// Main error type for the flight telemetry loop
#[derive(Debug, Error)]
pub enum FlightError {
    /// Telemetry frame could not be produced
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Telemetry frame could not be parsed
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Sensor read failed or sensor is unavailable
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Storage append failed or storage is unavailable
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the flight telemetry loop
pub type Result<T> = std::result::Result<T, FlightError>;
