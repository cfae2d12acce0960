//! Error types for crashnote.
//!
//! Report construction itself never fails; these errors cover the
//! surrounding machinery: configuration, the file-backed store and sinks.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StoreError;

/// The main error type for crashnote operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Store Errors ===
    /// A key-value store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    // === Sink Errors ===
    /// A report sink could not accept an incident.
    #[error("report sink '{name}' failed: {message}")]
    Sink {
        /// Name of the sink.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for crashnote operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a sink error.
    #[must_use]
    pub fn sink(name: &'static str, message: impl Into<String>) -> Self {
        Self::Sink {
            name,
            message: message.into(),
        }
    }

    /// Check if this error came from a key-value store.
    #[must_use]
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
