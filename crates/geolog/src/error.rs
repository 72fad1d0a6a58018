//! Error types for geolog.
//!
//! This module defines all error types used throughout the geolog crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for geolog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to read the collection file.
    #[error("failed to read collection at {path}: {source}")]
    CollectionRead {
        /// Path to the collection file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The collection file does not hold a JSON array of objects.
    #[error("collection at {path} is corrupt: {source}")]
    CollectionCorrupt {
        /// Path to the collection file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write the collection file.
    #[error("failed to write collection at {path}: {source}")]
    CollectionWrite {
        /// Path to the collection file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The write queue is closed and no longer accepts records.
    #[error("append store writer is closed")]
    WriterClosed,

    // === Input Errors ===
    /// A submitted report could not be turned into a record.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of what was wrong.
        message: String,
    },

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

    // === Server Errors ===
    /// Failed to bind the HTTP listener.
    #[error("failed to bind HTTP server on {addr}: {message}")]
    ServerBind {
        /// Address that couldn't be bound.
        addr: String,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// An OS-level operation outside the collection file failed, such as
    /// starting the writer thread.
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

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for geolog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new invalid record error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create a server bind error.
    #[must_use]
    pub fn server_bind(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServerBind {
            addr: addr.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from the collection file (read, parse or write).
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::CollectionRead { .. } | Self::CollectionCorrupt { .. } | Self::CollectionWrite { .. }
        )
    }

    /// Check if this error means the store is no longer accepting writes.
    #[must_use]
    pub fn is_writer_closed(&self) -> bool {
        matches!(self, Self::WriterClosed)
    }
}
