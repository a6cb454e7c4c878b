//! Backend adapter trait and raw row types.

use crate::error::{StorageError, StorageResult};
use std::collections::{BTreeMap, BTreeSet};

/// A stored time-series point: timestamp and raw value bytes.
pub type RawPoint = (i64, Vec<u8>);

/// One item change inside an event: operator tag and raw operand bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// Operator tag as persisted.
    pub op: String,
    /// Raw operand bytes.
    pub value: Vec<u8>,
}

impl RawChange {
    /// Creates a raw change.
    pub fn new(op: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            op: op.into(),
            value: value.into(),
        }
    }
}

/// Item changes recorded at one timestamp, keyed by item name.
pub type RawChanges = BTreeMap<String, RawChange>;

/// All changes stored for one sequence at one timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Event timestamp.
    pub timestamp: i64,
    /// Item changes at this timestamp.
    pub changes: RawChanges,
}

/// Primary key of a single stored item change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    /// Event timestamp.
    pub timestamp: i64,
    /// Item name.
    pub item: String,
    /// Operator tag.
    pub op: String,
}

/// Primitive operations a storage engine provides for all three data models.
///
/// An adapter is bound to one namespace prefix when constructed. Keys passed
/// in are already namespaced; listing operations return only keys carrying
/// the adapter's prefix.
///
/// # Invariants
///
/// - Every data operation fails with [`StorageError::Closed`] before
///   [`open`](Self::open) or after [`close`](Self::close)
/// - Writes through an adapter opened read-only fail with [`StorageError::ReadOnly`]
/// - [`es_append`](Self::es_append) checks and inserts in one atomic step:
///   it fails with [`StorageError::TimestampTaken`] and writes nothing if any
///   event exists for the key at that timestamp, even across handles
/// - Range results are ordered by ascending timestamp
pub trait BackendAdapter: Send + Sync {
    /// Short engine name used in logs.
    fn scheme(&self) -> &'static str;

    /// Opens the adapter.
    ///
    /// A writable open creates the namespace if needed. A read-only open of a
    /// namespace that does not exist fails with [`StorageError::NotAvailable`].
    fn open(&mut self, read_only: bool) -> StorageResult<()>;

    /// Closes the adapter. Closing twice is a no-op.
    fn close(&mut self) -> StorageResult<()>;

    /// Erases every item under the namespace and closes the adapter.
    ///
    /// The underlying medium is removed when no namespace has data left.
    fn discard(&mut self) -> StorageResult<()>;

    /// Reads a key/value entry.
    fn kv_get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes a key/value entry, replacing any previous value.
    fn kv_set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Deletes key/value entries. Unknown keys are ignored.
    fn kv_delete(&self, keys: &[String]) -> StorageResult<()>;

    /// Lists key/value keys of this namespace.
    fn kv_keys(&self) -> StorageResult<BTreeSet<String>>;

    /// Returns the points of `key` with `start <= timestamp <= end`.
    fn ts_range(&self, key: &str, start: i64, end: i64) -> StorageResult<Vec<RawPoint>>;

    /// Returns the earliest timestamp of `key`.
    fn ts_first(&self, key: &str) -> StorageResult<Option<i64>>;

    /// Returns the latest timestamp of `key`.
    fn ts_last(&self, key: &str) -> StorageResult<Option<i64>>;

    /// Upserts points: an existing timestamp is overwritten.
    fn ts_extend(&self, key: &str, points: &[RawPoint]) -> StorageResult<()>;

    /// Deletes the points of `key` with `start <= timestamp <= end`.
    fn ts_delete(&self, key: &str, start: i64, end: i64) -> StorageResult<()>;

    /// Lists time-series keys of this namespace.
    fn ts_keys(&self) -> StorageResult<BTreeSet<String>>;

    /// Returns the events of `key` grouped by timestamp, ascending.
    ///
    /// Bounds are inclusive. When `ops` is given only changes with one of
    /// those operator tags are returned, and timestamps left without changes
    /// are dropped.
    fn es_events(
        &self,
        key: &str,
        start: Option<i64>,
        end: Option<i64>,
        ops: Option<&[String]>,
    ) -> StorageResult<Vec<RawEvent>>;

    /// Atomically appends all changes of one event.
    fn es_append(&self, key: &str, timestamp: i64, changes: &RawChanges) -> StorageResult<()>;

    /// Deletes individual item changes. Unknown entries are ignored.
    fn es_delete(&self, key: &str, events: &[EventKey]) -> StorageResult<()>;

    /// Lists event sequence keys of this namespace.
    fn es_keys(&self) -> StorageResult<BTreeSet<String>>;
}

/// Open state shared by the engine implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Mode {
    #[default]
    Closed,
    ReadOnly,
    ReadWrite,
}

impl Mode {
    pub(crate) fn opened(read_only: bool) -> Self {
        if read_only {
            Mode::ReadOnly
        } else {
            Mode::ReadWrite
        }
    }

    pub(crate) fn readable(self) -> StorageResult<()> {
        match self {
            Mode::Closed => Err(StorageError::Closed),
            Mode::ReadOnly | Mode::ReadWrite => Ok(()),
        }
    }

    pub(crate) fn writable(self) -> StorageResult<()> {
        match self {
            Mode::Closed => Err(StorageError::Closed),
            Mode::ReadOnly => Err(StorageError::ReadOnly),
            Mode::ReadWrite => Ok(()),
        }
    }
}

/// Keeps only changes whose operator is in `ops`, dropping emptied events.
pub(crate) fn filter_ops(events: Vec<RawEvent>, ops: Option<&[String]>) -> Vec<RawEvent> {
    let Some(ops) = ops else {
        return events;
    };
    events
        .into_iter()
        .filter_map(|mut event| {
            event.changes.retain(|_, change| ops.contains(&change.op));
            (!event.changes.is_empty()).then_some(event)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(timestamp: i64, changes: &[(&str, &str)]) -> RawEvent {
        RawEvent {
            timestamp,
            changes: changes
                .iter()
                .map(|(item, op)| ((*item).to_string(), RawChange::new(*op, vec![0u8])))
                .collect(),
        }
    }

    #[test]
    fn mode_gates_reads_and_writes() {
        assert!(matches!(Mode::Closed.readable(), Err(StorageError::Closed)));
        assert!(matches!(Mode::Closed.writable(), Err(StorageError::Closed)));
        assert!(Mode::ReadOnly.readable().is_ok());
        assert!(matches!(
            Mode::ReadOnly.writable(),
            Err(StorageError::ReadOnly)
        ));
        assert!(Mode::opened(false).writable().is_ok());
    }

    #[test]
    fn filter_ops_drops_emptied_events() {
        let events = vec![
            event(1, &[("a", "set"), ("b", "add")]),
            event(2, &[("a", "delete")]),
        ];
        let ops = vec!["set".to_string()];
        let filtered = filter_ops(events.clone(), Some(&ops));
        assert_eq!(filtered, vec![event(1, &[("a", "set")])]);
        assert_eq!(filter_ops(events.clone(), None), events);
    }
}
