//! Error types for TierKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TierError
pub type Result<T> = std::result::Result<T, TierError>;

/// Unified error type for TierKV operations
#[derive(Debug, Error)]
pub enum TierError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    /// A frame failed its length or checksum test. Recovery consumes this
    /// locally by cutting the log at the last good frame.
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key not found")]
    KeyNotFound,

    /// Only ever reported through the background worker's status.
    #[error("Compaction failed: {0}")]
    Compaction(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Database is closed")]
    Closed,
}

impl From<bincode::Error> for TierError {
    fn from(err: bincode::Error) -> Self {
        TierError::Serialization(err.to_string())
    }
}
