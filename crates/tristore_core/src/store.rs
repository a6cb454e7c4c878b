//! The store: one namespace of one backend, with its value envelope.

use crate::config::StoreConfig;
use crate::envelope::ValueEnvelope;
use crate::error::{CoreError, CoreResult};
use crate::events::EventSequences;
use crate::kv::KeyValue;
use crate::namespace::NamespaceCodec;
use crate::timeseries::TimeSeries;
use std::fmt;
use tracing::{debug, info, warn};
use tristore_codec::Value;
use tristore_storage::{BackendAdapter, BackendRegistry, StorageError};

/// An open store.
///
/// A store binds a [`NamespaceCodec`], a [`ValueEnvelope`] and one backend
/// adapter. The adapter is opened when the store is created and closed when
/// the store is closed, discarded or dropped.
///
/// Data is reached through three independent facets:
///
/// - [`kv`](Self::kv) - key/value entries
/// - [`timeseries`](Self::timeseries) - timestamped points
/// - [`events`](Self::events) - event sequences and replayed state
///
/// # Example
///
/// ```rust
/// use tristore_core::{Store, StoreConfig};
///
/// let store = Store::open("memory://doc", StoreConfig::new().frozen(false))?;
/// store.kv().set("greeting", "hello")?;
/// assert_eq!(store.kv().require("greeting")?.as_text(), Some("hello"));
/// store.close()?;
/// # Ok::<(), tristore_core::CoreError>(())
/// ```
pub struct Store {
    adapter: Box<dyn BackendAdapter>,
    codec: NamespaceCodec,
    envelope: ValueEnvelope,
    frozen: bool,
    default_freq: Option<i64>,
    closed: bool,
}

impl Store {
    /// Opens a store on the backend named by `dsn`, using the default
    /// [`BackendRegistry`].
    ///
    /// Each call builds a fresh registry, so `memory://` stores opened this
    /// way never share data. Use [`open_with_registry`](Self::open_with_registry)
    /// to share in-memory engines.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Configuration`] for an unknown scheme or invalid setting
    /// - [`CoreError::StoreNotAvailable`] if the backend cannot be opened, or
    ///   the store is frozen and the namespace does not exist
    pub fn open(dsn: &str, config: StoreConfig) -> CoreResult<Self> {
        Self::open_with_registry(dsn, config, &BackendRegistry::with_defaults())
    }

    /// Opens a store on the backend named by `dsn`, resolved through `registry`.
    pub fn open_with_registry(
        dsn: &str,
        config: StoreConfig,
        registry: &BackendRegistry,
    ) -> CoreResult<Self> {
        let codec = NamespaceCodec::new(config.namespace.clone());
        let adapter = registry.create(dsn, codec.prefix()).map_err(open_error)?;
        Self::bind(adapter, codec, config)
    }

    /// Opens a store on an already constructed adapter.
    ///
    /// The adapter must have been created for the prefix of the configured
    /// namespace, see [`NamespaceCodec::prefix`].
    pub fn with_adapter(adapter: Box<dyn BackendAdapter>, config: StoreConfig) -> CoreResult<Self> {
        let codec = NamespaceCodec::new(config.namespace.clone());
        Self::bind(adapter, codec, config)
    }

    fn bind(
        mut adapter: Box<dyn BackendAdapter>,
        codec: NamespaceCodec,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        if let Some(freq) = config.default_freq {
            if freq <= 0 {
                return Err(CoreError::configuration(format!(
                    "default frequency must be positive, got {freq}"
                )));
            }
        }
        adapter.open(config.frozen).map_err(open_error)?;
        debug!(
            backend = adapter.scheme(),
            namespace = codec.namespace(),
            frozen = config.frozen,
            encrypted = config.encryption_key.is_some(),
            "store opened"
        );
        let envelope = ValueEnvelope::new(config.serializer, config.encryption_key.as_ref());
        Ok(Self {
            adapter,
            codec,
            envelope,
            frozen: config.frozen,
            default_freq: config.default_freq,
            closed: false,
        })
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.codec.namespace()
    }

    /// Returns `true` if the store is read-only.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns `true` if values are encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.envelope.is_encrypted()
    }

    /// Returns the default decimation frequency.
    #[must_use]
    pub fn default_freq(&self) -> Option<i64> {
        self.default_freq
    }

    /// Key/value facet.
    #[must_use]
    pub fn kv(&self) -> KeyValue<'_> {
        KeyValue::new(self)
    }

    /// Time-series facet.
    #[must_use]
    pub fn timeseries(&self) -> TimeSeries<'_> {
        TimeSeries::new(self)
    }

    /// Event sequence facet.
    #[must_use]
    pub fn events(&self) -> EventSequences<'_> {
        EventSequences::new(self)
    }

    /// Closes the store, releasing the backend.
    ///
    /// Dropping a store closes it too; `close` reports the error instead of
    /// logging it.
    pub fn close(mut self) -> CoreResult<()> {
        self.closed = true;
        self.adapter.close()?;
        debug!(namespace = self.codec.namespace(), "store closed");
        Ok(())
    }

    /// Irrevocably erases every key/value entry, time series and event
    /// sequence of the namespace, then closes the store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FrozenStore`] on a read-only store.
    pub fn discard(mut self) -> CoreResult<()> {
        self.ensure_writable()?;
        self.closed = true;
        self.adapter.discard()?;
        info!(
            backend = self.adapter.scheme(),
            namespace = self.codec.namespace(),
            "namespace discarded"
        );
        Ok(())
    }

    pub(crate) fn adapter(&self) -> &dyn BackendAdapter {
        self.adapter.as_ref()
    }

    pub(crate) fn codec(&self) -> &NamespaceCodec {
        &self.codec
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        if self.frozen {
            Err(CoreError::FrozenStore)
        } else {
            Ok(())
        }
    }

    pub(crate) fn to_store(&self, value: &Value) -> CoreResult<Vec<u8>> {
        self.envelope.to_store(value, true)
    }

    pub(crate) fn from_store(&self, bytes: &[u8]) -> CoreResult<Value> {
        self.envelope.from_store(bytes, true)
    }

    /// Strips the namespace from every backend key.
    pub(crate) fn decode_keys(
        &self,
        ns_keys: impl IntoIterator<Item = String>,
    ) -> CoreResult<std::collections::BTreeSet<String>> {
        ns_keys
            .into_iter()
            .map(|ns_key| self.codec.decode(&ns_key).map(str::to_owned))
            .collect()
    }
}

fn open_error(err: StorageError) -> CoreError {
    match err {
        StorageError::UnsupportedScheme(_) => CoreError::from(err),
        StorageError::NotAvailable(message) => CoreError::store_not_available(message),
        other => CoreError::store_not_available(other.to_string()),
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.adapter.close() {
            warn!(
                namespace = self.codec.namespace(),
                error = %e,
                "failed to close store on drop"
            );
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.adapter.scheme())
            .field("namespace", &self.codec.namespace())
            .field("frozen", &self.frozen)
            .field("envelope", &self.envelope)
            .field("default_freq", &self.default_freq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tristore_storage::{InMemoryAdapter, MemoryEngine};

    fn writable() -> StoreConfig {
        StoreConfig::new().frozen(false)
    }

    #[test]
    fn unknown_scheme_is_configuration_error() {
        assert!(matches!(
            Store::open("redis://localhost", writable()),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn frozen_open_of_unknown_namespace_fails() {
        assert!(matches!(
            Store::open("memory://nothing", StoreConfig::new()),
            Err(CoreError::StoreNotAvailable { .. })
        ));
    }

    #[test]
    fn non_positive_default_freq_rejected() {
        assert!(matches!(
            Store::open("memory://f", writable().default_freq(0)),
            Err(CoreError::Configuration { .. })
        ));
    }

    #[test]
    fn shared_registry_shares_memory_engines() {
        let registry = BackendRegistry::with_defaults();
        let writer = Store::open_with_registry("memory://shared", writable(), &registry).unwrap();
        writer.kv().set("k", 1).unwrap();

        let reader = Store::open_with_registry("memory://shared", StoreConfig::new(), &registry).unwrap();
        assert!(reader.is_frozen());
        assert_eq!(reader.kv().get("k").unwrap(), Some(Value::from(1)));
        assert!(matches!(reader.kv().set("k", 2), Err(CoreError::FrozenStore)));
    }

    #[test]
    fn discard_erases_namespace() {
        let engine = MemoryEngine::new();
        let prefix = NamespaceCodec::new("default").prefix().to_string();
        let store = Store::with_adapter(
            Box::new(InMemoryAdapter::new(engine.clone(), prefix.clone())),
            writable(),
        )
        .unwrap();
        store.kv().set("k", 1).unwrap();
        store.timeseries().extend("t", [(1, 1)]).unwrap();
        store.discard().unwrap();
        assert!(engine.is_empty());

        let frozen = Store::with_adapter(Box::new(InMemoryAdapter::new(engine, prefix)), StoreConfig::new());
        assert!(matches!(frozen, Err(CoreError::StoreNotAvailable { .. })));
    }

    #[test]
    fn frozen_store_cannot_discard() {
        let registry = BackendRegistry::with_defaults();
        Store::open_with_registry("memory://d", writable(), &registry)
            .unwrap()
            .close()
            .unwrap();
        let frozen = Store::open_with_registry("memory://d", StoreConfig::new(), &registry).unwrap();
        assert!(matches!(frozen.discard(), Err(CoreError::FrozenStore)));
    }

    #[test]
    fn debug_hides_values() {
        let store = Store::open("memory://dbg", writable().namespace("probes")).unwrap();
        let text = format!("{store:?}");
        assert!(text.contains("probes"));
        assert!(text.contains("memory"));
    }
}
