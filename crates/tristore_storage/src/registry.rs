//! Scheme-based adapter registry.

use crate::backend::BackendAdapter;
use crate::error::{StorageError, StorageResult};
use crate::journal::JournalAdapter;
use crate::memory::{InMemoryAdapter, MemoryEngine};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Builds an unopened adapter from the DSN location and a namespace prefix.
pub type AdapterFactory =
    Arc<dyn Fn(&str, &str) -> StorageResult<Box<dyn BackendAdapter>> + Send + Sync>;

/// Maps connection-string schemes to adapter constructors.
///
/// A DSN has the form `<scheme>://<location>`. The default registry knows:
///
/// | scheme | adapter | location |
/// |---|---|---|
/// | `memory` | [`InMemoryAdapter`] | engine name, shared within this registry |
/// | `file` | [`JournalAdapter`] | journal file path |
/// | `sqlite` | `SqliteAdapter` (feature `sqlite`) | database file path |
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in engines.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        let engines: Arc<Mutex<HashMap<String, Arc<MemoryEngine>>>> = Arc::default();
        registry.register("memory", move |name, prefix| {
            let engine = Arc::clone(
                engines
                    .lock()
                    .entry(name.to_string())
                    .or_insert_with(MemoryEngine::new),
            );
            Ok(Box::new(InMemoryAdapter::new(engine, prefix)))
        });

        registry.register("file", |path, prefix| {
            Ok(Box::new(JournalAdapter::new(path, prefix)))
        });

        #[cfg(feature = "sqlite")]
        registry.register("sqlite", |path, prefix| {
            Ok(Box::new(crate::sqlite::SqliteAdapter::new(path, prefix)))
        });

        registry
    }

    /// Registers `factory` for `scheme`, replacing any previous one.
    pub fn register<F>(&mut self, scheme: impl Into<String>, factory: F)
    where
        F: Fn(&str, &str) -> StorageResult<Box<dyn BackendAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(scheme.into(), Arc::new(factory));
    }

    /// Returns the registered schemes in sorted order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds an unopened adapter for `dsn` bound to `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedScheme`] if the DSN is malformed or
    /// no factory is registered for its scheme.
    pub fn create(&self, dsn: &str, prefix: &str) -> StorageResult<Box<dyn BackendAdapter>> {
        let (scheme, location) = dsn
            .split_once("://")
            .ok_or_else(|| StorageError::UnsupportedScheme(format!("malformed DSN '{dsn}'")))?;
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| StorageError::UnsupportedScheme(scheme.to_string()))?;
        factory(location, prefix)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("schemes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unknown_and_malformed_dsn_rejected() {
        let registry = BackendRegistry::with_defaults();
        assert!(matches!(
            registry.create("redis://localhost", "ns:"),
            Err(StorageError::UnsupportedScheme(s)) if s == "redis"
        ));
        assert!(matches!(
            registry.create("no-scheme", "ns:"),
            Err(StorageError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn memory_engines_shared_by_name() {
        let registry = BackendRegistry::with_defaults();
        let mut a = registry.create("memory://shared", "ns:").unwrap();
        let mut b = registry.create("memory://shared", "ns:").unwrap();
        let mut c = registry.create("memory://other", "ns:").unwrap();
        a.open(false).unwrap();
        b.open(true).unwrap();
        c.open(false).unwrap();

        a.kv_set("ns:k", b"1").unwrap();
        assert_eq!(b.kv_get("ns:k").unwrap(), Some(b"1".to_vec()));
        assert_eq!(c.kv_get("ns:k").unwrap(), None);
    }

    #[test]
    fn separate_registries_do_not_share_memory() {
        let mut a = BackendRegistry::with_defaults().create("memory://x", "ns:").unwrap();
        a.open(false).unwrap();
        let mut b = BackendRegistry::with_defaults().create("memory://x", "ns:").unwrap();
        assert!(matches!(b.open(true), Err(StorageError::NotAvailable(_))));
    }

    #[test]
    fn file_scheme_builds_journal() {
        let dir = tempdir().unwrap();
        let dsn = format!("file://{}", dir.path().join("j.journal").display());
        let mut adapter = BackendRegistry::with_defaults().create(&dsn, "ns:").unwrap();
        assert_eq!(adapter.scheme(), "file");
        adapter.open(false).unwrap();
        assert!(dir.path().join("j.journal").exists());
    }

    #[test]
    fn custom_scheme_registration() {
        let mut registry = BackendRegistry::new();
        let engine = MemoryEngine::new();
        registry.register("mem2", move |_, prefix| {
            Ok(Box::new(InMemoryAdapter::new(Arc::clone(&engine), prefix)))
        });
        assert_eq!(registry.schemes().collect::<Vec<_>>(), vec!["mem2"]);
        assert_eq!(registry.create("mem2://", "ns:").unwrap().scheme(), "memory");
    }
}
