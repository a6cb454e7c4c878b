//! Error types for tristore core.

use thiserror::Error;
use tristore_codec::CodecError;
use tristore_storage::StorageError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in tristore core operations.
///
/// [`FrozenStore`](Self::FrozenStore) and [`StoreIntegrity`](Self::StoreIntegrity)
/// are expected conditions the caller may handle. [`CorruptData`](Self::CorruptData)
/// and [`Configuration`](Self::Configuration) mean the stored log or the setup
/// is invalid; retrying will not help.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A mutation was attempted on a read-only store.
    #[error("store is frozen (read-only)")]
    FrozenStore,

    /// The store could not be opened.
    #[error("store not available: {message}")]
    StoreNotAvailable {
        /// Why the open failed.
        message: String,
    },

    /// An event sequence already has an event at this timestamp.
    #[error("event sequence '{key}' already has events at timestamp {timestamp}")]
    StoreIntegrity {
        /// Sequence key.
        key: String,
        /// Colliding timestamp.
        timestamp: i64,
    },

    /// Unsupported backend or missing capability.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Stored data is invalid: foreign key prefix, unknown operator tag,
    /// undecryptable or undecodable value.
    #[error("corrupt data: {message}")]
    CorruptData {
        /// Description of the corruption.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An argument was rejected before touching the store.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A required key/value entry does not exist.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// Encrypting a value failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Returns `true` for conditions the caller is expected to handle.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrozenStore | Self::StoreIntegrity { .. })
    }

    /// Creates a store not available error.
    pub fn store_not_available(message: impl Into<String>) -> Self {
        Self::StoreNotAvailable {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a corrupt data error.
    pub fn corrupt_data(message: impl Into<String>) -> Self {
        Self::CorruptData {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a key not found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TimestampTaken { key, timestamp } => Self::StoreIntegrity { key, timestamp },
            StorageError::NotAvailable(message) => Self::StoreNotAvailable { message },
            StorageError::UnsupportedScheme(scheme) => {
                Self::configuration(format!("unsupported backend '{scheme}'"))
            }
            StorageError::ReadOnly => Self::FrozenStore,
            StorageError::Corrupted(message) => Self::CorruptData { message },
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_store_kinds() {
        let err = CoreError::from(StorageError::TimestampTaken {
            key: "k".into(),
            timestamp: 3,
        });
        assert!(matches!(err, CoreError::StoreIntegrity { timestamp: 3, .. }));
        assert!(err.is_recoverable());

        assert!(matches!(
            CoreError::from(StorageError::UnsupportedScheme("x".into())),
            CoreError::Configuration { .. }
        ));
        assert!(matches!(
            CoreError::from(StorageError::NotAvailable("gone".into())),
            CoreError::StoreNotAvailable { .. }
        ));
        assert!(matches!(
            CoreError::from(StorageError::Closed),
            CoreError::Storage(StorageError::Closed)
        ));
    }

    #[test]
    fn recoverability() {
        assert!(CoreError::FrozenStore.is_recoverable());
        assert!(!CoreError::corrupt_data("bad tag").is_recoverable());
        assert!(!CoreError::configuration("no backend").is_recoverable());
        assert!(!CoreError::invalid_argument("empty key").is_recoverable());
    }
}
