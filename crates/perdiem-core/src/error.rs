//! Core error types for the per-diem rate extractor.
//!
//! [`PerDiemError`] covers rejected domain values (location codes and
//! timestamps). Configuration problems get their own [`ConfigError`]; the
//! cache and scraper crates define errors next to their subsystem.

use thiserror::Error;

/// A domain value that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PerDiemError {
    /// Location code is not exactly five ASCII digits
    #[error("invalid location code: must be exactly 5 digits, got '{code}'")]
    InvalidLocationCode {
        /// The rejected input, trimmed
        code: String,
    },

    /// Timestamp could not be parsed or is out of range
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Config file not found at an explicitly requested path
    #[error("config file not found at {path}")]
    NotFound {
        /// Path where config was expected
        path: String,
    },

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// I/O error reading config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
