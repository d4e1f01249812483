//! Cache error types.
//!
//! Provides error handling for cache backends using `thiserror`.

use thiserror::Error;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to open or create the backing store.
    #[error("failed to open cache: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Stored data could not be interpreted.
    #[error("corrupt cache data: {0}")]
    Corrupt(String),

    /// A lock guarding in-memory entries was poisoned by a panicking writer.
    #[error("cache lock poisoned")]
    Poisoned,

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
