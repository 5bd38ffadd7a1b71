//! Error types for stormkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StormError
pub type Result<T> = std::result::Result<T, StormError>;

/// Unified error type for stormkv operations
#[derive(Debug, Error)]
pub enum StormError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Value size {size} exceeds the supported maximum of {max} bytes")]
    ValueSizeTooLarge { size: usize, max: usize },

    #[error(
        "Database was created with a value size of {stored} bytes, \
         but {requested} bytes was requested"
    )]
    ValueSizeMismatch { stored: usize, requested: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Key {0:#x} is reserved for internal use")]
    ReservedKey(u32),

    #[error("Value must provide {expected} bytes, got {actual}")]
    InvalidValueLength { expected: usize, actual: usize },

    #[error("Key must be exactly 4 bytes, got {0}")]
    InvalidKeyLength(usize),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Inconsistent data: expected key {expected}, found {found}")]
    InconsistentData { expected: u32, found: u32 },

    #[error("Possible data corruption detected: {0}")]
    Corruption(String),

    #[error("Write buffer is full")]
    BufferFull,

    #[error("Compaction error: {0}")]
    Compaction(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}
