//! Perdiem Core - Foundation crate for the per-diem rate extractor.
//!
//! This crate provides the shared types, error handling and configuration
//! management that the cache and scraper crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes and records (`LocationCode`, `RateRecord`, `RateBounds`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use perdiem_core::{AppConfig, LocationCode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.retry.max_attempts, 3);
//!
//! let code = LocationCode::new("11410")?;
//! assert_eq!(code.as_str(), "11410");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BatchConfig, CacheBackend, CacheConfig, RetryConfig, UpstreamConfig,
};
pub use error::{ConfigError, ConfigResult, PerDiemError};
pub use types::{
    BoundsViolation, ExtractionStrategy, LocationCode, RateBounds, RateRecord, Timestamp,
    UNKNOWN,
};
