//! In-memory storage engine.

use crate::backend::{filter_ops, BackendAdapter, EventKey, Mode, RawChanges, RawEvent, RawPoint};
use crate::error::{StorageError, StorageResult};
use crate::tables::Tables;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared in-memory tables.
///
/// Several [`InMemoryAdapter`]s over one engine see each other's writes,
/// which is how separate stores share a `memory://` backend.
///
/// # Thread Safety
///
/// All access goes through one lock, so every adapter call is atomic.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tables: RwLock<Tables>,
}

impl MemoryEngine {
    /// Creates a new empty engine.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `true` if no namespace exists and no data is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

/// An adapter over a [`MemoryEngine`], bound to one namespace prefix.
///
/// # Example
///
/// ```rust
/// use tristore_storage::{BackendAdapter, InMemoryAdapter, MemoryEngine};
///
/// let engine = MemoryEngine::new();
/// let mut adapter = InMemoryAdapter::new(engine, "default:");
/// adapter.open(false).unwrap();
/// adapter.kv_set("default:name", b"probe").unwrap();
/// assert_eq!(adapter.kv_get("default:name").unwrap(), Some(b"probe".to_vec()));
/// ```
#[derive(Debug)]
pub struct InMemoryAdapter {
    engine: Arc<MemoryEngine>,
    prefix: String,
    mode: Mode,
}

impl InMemoryAdapter {
    /// Creates an unopened adapter for `prefix` over `engine`.
    pub fn new(engine: Arc<MemoryEngine>, prefix: impl Into<String>) -> Self {
        Self {
            engine,
            prefix: prefix.into(),
            mode: Mode::Closed,
        }
    }

    /// Returns the engine this adapter reads and writes.
    #[must_use]
    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }
}

impl BackendAdapter for InMemoryAdapter {
    fn scheme(&self) -> &'static str {
        "memory"
    }

    fn open(&mut self, read_only: bool) -> StorageResult<()> {
        if read_only {
            if !self.engine.tables.read().has_namespace(&self.prefix) {
                return Err(StorageError::not_available(format!(
                    "namespace '{}' does not exist",
                    self.prefix
                )));
            }
        } else {
            self.engine.tables.write().create_namespace(&self.prefix);
        }
        self.mode = Mode::opened(read_only);
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.mode = Mode::Closed;
        Ok(())
    }

    fn discard(&mut self) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().discard(&self.prefix);
        self.mode = Mode::Closed;
        Ok(())
    }

    fn kv_get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().kv_get(key))
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().kv_set(key, value);
        Ok(())
    }

    fn kv_delete(&self, keys: &[String]) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().kv_delete(keys);
        Ok(())
    }

    fn kv_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().kv_keys(&self.prefix))
    }

    fn ts_range(&self, key: &str, start: i64, end: i64) -> StorageResult<Vec<RawPoint>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().ts_range(key, start, end))
    }

    fn ts_first(&self, key: &str) -> StorageResult<Option<i64>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().ts_first(key))
    }

    fn ts_last(&self, key: &str) -> StorageResult<Option<i64>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().ts_last(key))
    }

    fn ts_extend(&self, key: &str, points: &[RawPoint]) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().ts_extend(key, points);
        Ok(())
    }

    fn ts_delete(&self, key: &str, start: i64, end: i64) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().ts_delete(key, start, end);
        Ok(())
    }

    fn ts_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().ts_keys(&self.prefix))
    }

    fn es_events(
        &self,
        key: &str,
        start: Option<i64>,
        end: Option<i64>,
        ops: Option<&[String]>,
    ) -> StorageResult<Vec<RawEvent>> {
        self.mode.readable()?;
        let events = self.engine.tables.read().es_events(key, start, end);
        Ok(filter_ops(events, ops))
    }

    fn es_append(&self, key: &str, timestamp: i64, changes: &RawChanges) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().es_append(key, timestamp, changes)
    }

    fn es_delete(&self, key: &str, events: &[EventKey]) -> StorageResult<()> {
        self.mode.writable()?;
        self.engine.tables.write().es_delete(key, events);
        Ok(())
    }

    fn es_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.mode.readable()?;
        Ok(self.engine.tables.read().es_keys(&self.prefix))
    }
}
