//! Error types and result handling for packscan.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for packscan operations.
#[derive(Error, Debug)]
pub enum Error {
    // ===== I/O Errors =====
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===== Parsing Errors =====
    /// The input is not a PE file at all. This is the only fatal per-file
    /// condition; a recognized-but-malformed PE never produces an error,
    /// it accumulates suspicion flags instead.
    #[error("Not a PE file")]
    NotPe,

    // ===== Database Errors =====
    #[error("Failed to load signature database: {0}")]
    SignatureLoad(String),

    // ===== Configuration Errors =====
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to save configuration: {0}")]
    ConfigSave(String),

    #[error("Invalid configuration value: {field} - {message}")]
    ConfigInvalid { field: String, message: String },

    // ===== Serialization Errors =====
    #[error("JSON serialization error")]
    JsonSerialize(#[from] serde_json::Error),
}

impl Error {
    /// Create a file read error.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is recoverable (the run can continue with the
    /// next file). Database and configuration failures are not: without a
    /// usable database there is nothing to scan with.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NotPe | Error::FileRead { .. })
    }
}
