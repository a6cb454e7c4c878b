//! Store configuration.

use crate::crypto::EncryptionKey;
use crate::envelope::{CborSerializer, ValueSerializer};
use std::sync::Arc;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Immutable configuration for opening a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Namespace isolating this store's keys within the backend.
    pub namespace: String,

    /// Whether the store is read-only. Frozen stores fail to open if the
    /// namespace does not exist yet.
    pub frozen: bool,

    /// Key for value encryption; `None` stores values in the clear.
    pub encryption_key: Option<EncryptionKey>,

    /// Decimation frequency used by time-series queries that pass none.
    pub default_freq: Option<i64>,

    /// Value serialization format.
    pub serializer: Arc<dyn ValueSerializer>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            frozen: true,
            encryption_key: None,
            default_freq: None,
            serializer: Arc::new(CborSerializer),
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values: namespace `"default"`,
    /// frozen, unencrypted, no default frequency, CBOR values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets whether the store is read-only.
    #[must_use]
    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    /// Sets the encryption key.
    #[must_use]
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Sets the default decimation frequency.
    #[must_use]
    pub fn default_freq(mut self, freq: i64) -> Self {
        self.default_freq = Some(freq);
        self
    }

    /// Sets the value serializer.
    #[must_use]
    pub fn serializer(mut self, serializer: impl ValueSerializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }
}
