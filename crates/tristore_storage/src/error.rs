//! Error types for storage operations.

use std::io;
use thiserror::Error;
use tristore_codec::CodecError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stored data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The adapter was never opened or has been closed.
    #[error("storage is closed")]
    Closed,

    /// The namespace or medium does not exist and cannot be created.
    #[error("storage not available: {0}")]
    NotAvailable(String),

    /// An event already exists at this timestamp for this key.
    #[error("event sequence '{key}' already has events at timestamp {timestamp}")]
    TimestampTaken {
        /// Namespaced sequence key.
        key: String,
        /// Colliding timestamp.
        timestamp: i64,
    },

    /// No adapter is registered for the connection string.
    #[error("unsupported backend: {0}")]
    UnsupportedScheme(String),

    /// A write was attempted through a read-only adapter.
    #[error("storage opened read-only")]
    ReadOnly,

    /// A journal record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] CodecError),

    /// SQLite engine error.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    /// Creates a corrupted storage error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a not available error.
    pub fn not_available(message: impl Into<String>) -> Self {
        Self::NotAvailable(message.into())
    }
}
