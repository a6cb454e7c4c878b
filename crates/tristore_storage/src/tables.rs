//! Ordered in-memory tables shared by the memory and journal engines.

use crate::backend::{EventKey, RawChanges, RawEvent, RawPoint};
use crate::error::{StorageError, StorageResult};
use std::collections::{BTreeMap, BTreeSet};

/// The three data-model tables plus the set of created namespaces.
///
/// Time-series and event keys never map to an empty inner table.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Tables {
    namespaces: BTreeSet<String>,
    kv: BTreeMap<String, Vec<u8>>,
    ts: BTreeMap<String, BTreeMap<i64, Vec<u8>>>,
    es: BTreeMap<String, BTreeMap<i64, RawChanges>>,
}

fn keys_with_prefix<V>(table: &BTreeMap<String, V>, prefix: &str) -> BTreeSet<String> {
    table
        .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect()
}

impl Tables {
    pub(crate) fn has_namespace(&self, prefix: &str) -> bool {
        self.namespaces.contains(prefix)
    }

    pub(crate) fn create_namespace(&mut self, prefix: &str) {
        self.namespaces.insert(prefix.to_string());
    }

    /// True when no namespace exists and every table is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.namespaces.is_empty() && self.kv.is_empty() && self.ts.is_empty() && self.es.is_empty()
    }

    /// Removes the namespace and every entry carrying its prefix.
    pub(crate) fn discard(&mut self, prefix: &str) {
        self.namespaces.remove(prefix);
        self.kv.retain(|key, _| !key.starts_with(prefix));
        self.ts.retain(|key, _| !key.starts_with(prefix));
        self.es.retain(|key, _| !key.starts_with(prefix));
    }

    pub(crate) fn kv_get(&self, key: &str) -> Option<Vec<u8>> {
        self.kv.get(key).cloned()
    }

    pub(crate) fn kv_set(&mut self, key: &str, value: &[u8]) {
        self.kv.insert(key.to_string(), value.to_vec());
    }

    pub(crate) fn kv_delete(&mut self, keys: &[String]) {
        for key in keys {
            self.kv.remove(key);
        }
    }

    pub(crate) fn kv_keys(&self, prefix: &str) -> BTreeSet<String> {
        keys_with_prefix(&self.kv, prefix)
    }

    pub(crate) fn ts_range(&self, key: &str, start: i64, end: i64) -> Vec<RawPoint> {
        if end < start {
            return Vec::new();
        }
        self.ts
            .get(key)
            .map(|points| {
                points
                    .range(start..=end)
                    .map(|(ts, value)| (*ts, value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn ts_first(&self, key: &str) -> Option<i64> {
        self.ts.get(key)?.keys().next().copied()
    }

    pub(crate) fn ts_last(&self, key: &str) -> Option<i64> {
        self.ts.get(key)?.keys().next_back().copied()
    }

    pub(crate) fn ts_extend(&mut self, key: &str, points: &[RawPoint]) {
        if points.is_empty() {
            return;
        }
        let series = self.ts.entry(key.to_string()).or_default();
        for (ts, value) in points {
            series.insert(*ts, value.clone());
        }
    }

    pub(crate) fn ts_delete(&mut self, key: &str, start: i64, end: i64) {
        if end < start {
            return;
        }
        if let Some(series) = self.ts.get_mut(key) {
            let doomed: Vec<i64> = series.range(start..=end).map(|(ts, _)| *ts).collect();
            for ts in doomed {
                series.remove(&ts);
            }
            if series.is_empty() {
                self.ts.remove(key);
            }
        }
    }

    pub(crate) fn ts_keys(&self, prefix: &str) -> BTreeSet<String> {
        keys_with_prefix(&self.ts, prefix)
    }

    pub(crate) fn es_events(&self, key: &str, start: Option<i64>, end: Option<i64>) -> Vec<RawEvent> {
        let start = start.unwrap_or(i64::MIN);
        let end = end.unwrap_or(i64::MAX);
        if end < start {
            return Vec::new();
        }
        self.es
            .get(key)
            .map(|events| {
                events
                    .range(start..=end)
                    .map(|(ts, changes)| RawEvent {
                        timestamp: *ts,
                        changes: changes.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fails with [`StorageError::TimestampTaken`] if `timestamp` is used.
    pub(crate) fn es_check(&self, key: &str, timestamp: i64) -> StorageResult<()> {
        let taken = self
            .es
            .get(key)
            .is_some_and(|events| events.contains_key(&timestamp));
        if taken {
            return Err(StorageError::TimestampTaken {
                key: key.to_string(),
                timestamp,
            });
        }
        Ok(())
    }

    pub(crate) fn es_append(
        &mut self,
        key: &str,
        timestamp: i64,
        changes: &RawChanges,
    ) -> StorageResult<()> {
        self.es_check(key, timestamp)?;
        if changes.is_empty() {
            return Ok(());
        }
        self.es
            .entry(key.to_string())
            .or_default()
            .insert(timestamp, changes.clone());
        Ok(())
    }

    pub(crate) fn es_delete(&mut self, key: &str, events: &[EventKey]) {
        let Some(sequence) = self.es.get_mut(key) else {
            return;
        };
        for event in events {
            if let Some(changes) = sequence.get_mut(&event.timestamp) {
                if changes.get(&event.item).is_some_and(|c| c.op == event.op) {
                    changes.remove(&event.item);
                }
                if changes.is_empty() {
                    sequence.remove(&event.timestamp);
                }
            }
        }
        if sequence.is_empty() {
            self.es.remove(key);
        }
    }

    pub(crate) fn es_keys(&self, prefix: &str) -> BTreeSet<String> {
        keys_with_prefix(&self.es, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawChange;

    fn changes(items: &[(&str, &str)]) -> RawChanges {
        items
            .iter()
            .map(|(item, op)| ((*item).to_string(), RawChange::new(*op, b"v".to_vec())))
            .collect()
    }

    #[test]
    fn prefix_listing_is_isolated() {
        let mut t = Tables::default();
        t.kv_set("a:x", b"1");
        t.kv_set("ab:y", b"2");
        t.kv_set("a:z", b"3");
        t.kv_set("b:x", b"4");
        let keys: Vec<_> = t.kv_keys("a:").into_iter().collect();
        assert_eq!(keys, vec!["a:x".to_string(), "a:z".to_string()]);
    }

    #[test]
    fn ts_delete_drops_empty_series() {
        let mut t = Tables::default();
        t.ts_extend("n:k", &[(1, b"a".to_vec()), (2, b"b".to_vec())]);
        t.ts_delete("n:k", 1, 1);
        assert_eq!(t.ts_first("n:k"), Some(2));
        t.ts_delete("n:k", 0, 10);
        assert!(t.ts_keys("n:").is_empty());
        assert_eq!(t.ts_last("n:k"), None);
    }

    #[test]
    fn ts_extend_overwrites() {
        let mut t = Tables::default();
        t.ts_extend("n:k", &[(5, b"a".to_vec())]);
        t.ts_extend("n:k", &[(5, b"b".to_vec())]);
        assert_eq!(t.ts_range("n:k", 0, 10), vec![(5, b"b".to_vec())]);
    }

    #[test]
    fn es_append_rejects_taken_timestamp() {
        let mut t = Tables::default();
        t.es_append("n:e", 10, &changes(&[("a", "set")])).unwrap();
        let err = t.es_append("n:e", 10, &changes(&[("b", "set")]));
        assert!(matches!(err, Err(StorageError::TimestampTaken { timestamp: 10, .. })));
        assert_eq!(t.es_events("n:e", None, None)[0].changes, changes(&[("a", "set")]));
    }

    #[test]
    fn es_delete_matches_operator() {
        let mut t = Tables::default();
        t.es_append("n:e", 1, &changes(&[("a", "set"), ("b", "add")])).unwrap();
        t.es_delete(
            "n:e",
            &[EventKey {
                timestamp: 1,
                item: "a".into(),
                op: "add".into(),
            }],
        );
        assert_eq!(t.es_events("n:e", None, None)[0].changes.len(), 2);
        t.es_delete(
            "n:e",
            &[
                EventKey {
                    timestamp: 1,
                    item: "a".into(),
                    op: "set".into(),
                },
                EventKey {
                    timestamp: 1,
                    item: "b".into(),
                    op: "add".into(),
                },
            ],
        );
        assert!(t.es_keys("n:").is_empty());
    }

    #[test]
    fn discard_removes_only_own_prefix() {
        let mut t = Tables::default();
        t.create_namespace("a:");
        t.create_namespace("b:");
        t.kv_set("a:k", b"1");
        t.kv_set("b:k", b"2");
        t.discard("a:");
        assert!(!t.has_namespace("a:"));
        assert_eq!(t.kv_get("b:k"), Some(b"2".to_vec()));
        assert!(!t.is_empty());
        t.discard("b:");
        assert!(t.is_empty());
    }
}
