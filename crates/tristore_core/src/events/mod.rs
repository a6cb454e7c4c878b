//! Event sequences: append-only per-entity logs of item operations.
//!
//! The state of a sequence is never stored. It is rebuilt on every query by
//! replaying the log in ascending timestamp order, so [`past`] answers are
//! exact for any instant and an event inserted before the latest one takes
//! part in [`current`] from then on.
//!
//! Each [`apply`] records one event; the backend refuses a second event at
//! the same timestamp for the same key, atomically and across handles.
//!
//! [`past`]: EventSequences::past
//! [`current`]: EventSequences::current
//! [`apply`]: EventSequences::apply

mod operator;
mod replay;

pub use operator::{Change, EvalError, Operator};

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use replay::replay;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use tristore_codec::Value;
use tristore_storage::{EventKey, RawChange, RawChanges, RawEvent, StorageError};

/// Reconstructed state of a sequence: item name to value.
pub type State = BTreeMap<String, Value>;

/// All item changes recorded at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event timestamp.
    pub timestamp: i64,
    /// Operator and operand per item.
    pub changes: BTreeMap<String, (Operator, Value)>,
}

/// Filter for [`EventSequences::events`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Inclusive lower bound.
    pub start: Option<i64>,
    /// Inclusive upper bound.
    pub end: Option<i64>,
    /// Operators to keep; `None` or an empty list keeps all.
    pub ops: Option<Vec<Operator>>,
}

impl EventQuery {
    /// A query over every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lower bound.
    #[must_use]
    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Keeps only changes made with one of `ops`.
    #[must_use]
    pub fn ops(mut self, ops: impl IntoIterator<Item = Operator>) -> Self {
        self.ops = Some(ops.into_iter().collect());
        self
    }
}

/// Event sequences of a store.
///
/// Obtained from [`Store::events`].
#[derive(Debug, Clone, Copy)]
pub struct EventSequences<'s> {
    store: &'s Store,
}

impl<'s> EventSequences<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self { store }
    }

    /// Records `changes` as one event and returns the resulting current state.
    ///
    /// Each change is a bare value (assign) or an explicit operation, see
    /// [`Change`]. `timestamp` defaults to the wall clock in milliseconds.
    /// With no changes nothing is recorded and the current state is returned
    /// as is, `None` for an unknown key.
    ///
    /// The log with the new event merged in is replayed before anything is
    /// written, so an operation that cannot apply (an update of an unset
    /// item, a type mismatch) is refused and never enters the log.
    ///
    /// # Errors
    ///
    /// - [`CoreError::FrozenStore`] on a read-only store
    /// - [`CoreError::InvalidArgument`] if the merged log does not replay
    /// - [`CoreError::StoreIntegrity`] if the sequence already has an event
    ///   at `timestamp`; nothing is written
    ///
    /// # Example
    ///
    /// ```rust
    /// use tristore_core::{Change, Operator, Store, StoreConfig, Value};
    ///
    /// let store = Store::open("memory://doc", StoreConfig::new().frozen(false))?;
    /// let events = store.events();
    /// events.apply("door", [("opened", Change::from(0))], Some(1))?;
    /// let state = events.apply("door", [("opened", Change::op(Operator::Add, 1))], Some(2))?;
    /// assert_eq!(state.unwrap()["opened"], Value::from(1));
    /// # Ok::<(), tristore_core::CoreError>(())
    /// ```
    pub fn apply<K, C>(
        &self,
        key: &str,
        changes: impl IntoIterator<Item = (K, C)>,
        timestamp: Option<i64>,
    ) -> CoreResult<Option<State>>
    where
        K: Into<String>,
        C: Into<Change>,
    {
        self.store.ensure_writable()?;
        let ns_key = self.store.codec().encode(key)?;

        let mut normalized = BTreeMap::new();
        for (item, change) in changes {
            let item = item.into();
            if item.is_empty() {
                return Err(CoreError::invalid_argument("item names must be non-empty"));
            }
            normalized.insert(item, change.into().into_parts());
        }
        if normalized.is_empty() {
            return self.current(key);
        }
        let timestamp = timestamp.unwrap_or_else(now_millis);

        let raw = normalized
            .iter()
            .map(|(item, (op, operand))| {
                Ok((item.clone(), RawChange::new(op.tag(), self.store.to_store(operand)?)))
            })
            .collect::<CoreResult<RawChanges>>()?;

        let mut log = self.load(&ns_key, None, None, None)?;
        if log.iter().all(|e| e.timestamp != timestamp) {
            let at = log.partition_point(|e| e.timestamp < timestamp);
            log.insert(
                at,
                Event {
                    timestamp,
                    changes: normalized,
                },
            );
            replay(log).map_err(|e| {
                CoreError::invalid_argument(format!("event refused for sequence '{key}': {e}"))
            })?;
        }

        match self.store.adapter().es_append(&ns_key, timestamp, &raw) {
            Ok(()) => {}
            Err(StorageError::TimestampTaken { .. }) => {
                return Err(CoreError::StoreIntegrity {
                    key: key.to_string(),
                    timestamp,
                })
            }
            Err(e) => return Err(e.into()),
        }
        debug!(key, timestamp, items = raw.len(), "event appended");
        self.current(key)
    }

    /// Returns the current state, or `None` if the key has no events.
    ///
    /// A sequence whose items were all deleted returns an empty state.
    pub fn current(&self, key: &str) -> CoreResult<Option<State>> {
        Ok(self.current_with_timestamp(key)?.map(|(_, state)| state))
    }

    /// Like [`current`](Self::current), with the timestamp of the last event.
    pub fn current_with_timestamp(&self, key: &str) -> CoreResult<Option<(i64, State)>> {
        self.state_until(key, None)
    }

    /// Returns the state as of `timestamp`, built from the events at or
    /// before it, or `None` if there were none.
    pub fn past(&self, key: &str, timestamp: i64) -> CoreResult<Option<State>> {
        Ok(self.past_with_timestamp(key, timestamp)?.map(|(_, state)| state))
    }

    /// Like [`past`](Self::past), with the timestamp of the last event taken
    /// into account.
    pub fn past_with_timestamp(&self, key: &str, timestamp: i64) -> CoreResult<Option<(i64, State)>> {
        self.state_until(key, Some(timestamp))
    }

    fn state_until(&self, key: &str, end: Option<i64>) -> CoreResult<Option<(i64, State)>> {
        let ns_key = self.store.codec().encode(key)?;
        let log = self.load(&ns_key, None, end, None)?;
        replay(log).map_err(|e| CoreError::corrupt_data(format!("sequence '{key}': {e}")))
    }

    /// Returns the events of `key` matching `query`, ascending, or `None`
    /// if the key has no events at all.
    pub fn events(&self, key: &str, query: &EventQuery) -> CoreResult<Option<Vec<Event>>> {
        let ns_key = self.store.codec().encode(key)?;
        if !self.store.adapter().es_keys()?.contains(&ns_key) {
            return Ok(None);
        }
        let tags: Option<Vec<String>> = query
            .ops
            .as_ref()
            .filter(|ops| !ops.is_empty())
            .map(|ops| ops.iter().map(|op| op.tag().to_string()).collect());
        self.load(&ns_key, query.start, query.end, tags.as_deref())
            .map(Some)
    }

    /// Deletes the whole log of each key whose current state is empty.
    ///
    /// Sequences that still hold items are left as they are, even when some
    /// of their events no longer contribute to the state. Nothing is done
    /// when `remove` is `false`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FrozenStore`] on a read-only store.
    pub fn prune<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>, remove: bool) -> CoreResult<()> {
        self.store.ensure_writable()?;
        if !remove {
            return Ok(());
        }
        let adapter = self.store.adapter();
        for key in keys {
            let key = key.as_ref();
            if self.current(key)?.is_some_and(|state| !state.is_empty()) {
                continue;
            }
            let ns_key = self.store.codec().encode(key)?;
            let doomed: Vec<EventKey> = adapter
                .es_events(&ns_key, None, None, None)?
                .into_iter()
                .flat_map(|event| {
                    let timestamp = event.timestamp;
                    event.changes.into_iter().map(move |(item, change)| EventKey {
                        timestamp,
                        item,
                        op: change.op,
                    })
                })
                .collect();
            if !doomed.is_empty() {
                adapter.es_delete(&ns_key, &doomed)?;
                info!(key, events = doomed.len(), "pruned empty event sequence");
            }
        }
        Ok(())
    }

    /// Returns every key with at least one event.
    pub fn keys(&self) -> CoreResult<BTreeSet<String>> {
        self.store.decode_keys(self.store.adapter().es_keys()?)
    }

    fn load(
        &self,
        ns_key: &str,
        start: Option<i64>,
        end: Option<i64>,
        ops: Option<&[String]>,
    ) -> CoreResult<Vec<Event>> {
        self.store
            .adapter()
            .es_events(ns_key, start, end, ops)?
            .into_iter()
            .map(|raw| self.decode(raw))
            .collect()
    }

    fn decode(&self, raw: RawEvent) -> CoreResult<Event> {
        let timestamp = raw.timestamp;
        let changes: BTreeMap<String, (Operator, Value)> = raw
            .changes
            .into_iter()
            .map(|(item, change)| {
                let op = Operator::from_tag(&change.op).ok_or_else(|| {
                    CoreError::corrupt_data(format!(
                        "unknown operator '{}' at {} for item '{item}'",
                        change.op, timestamp
                    ))
                })?;
                Ok((item, (op, self.store.from_store(&change.value)?)))
            })
            .collect::<CoreResult<_>>()?;
        Ok(Event { timestamp, changes })
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
