//! Relational engine on SQLite.
//!
//! Schema: one table per data model plus a `namespaces` table. Keys are
//! stored namespaced; prefix listing compares `substr(key, 1, n)`.

use crate::backend::{filter_ops, BackendAdapter, EventKey, Mode, RawChange, RawChanges, RawEvent, RawPoint};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS namespaces (
        name TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS ts (
        key TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (key, timestamp)
    );
    CREATE TABLE IF NOT EXISTS es (
        key TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        item TEXT NOT NULL,
        operator TEXT NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (key, timestamp, item, operator)
    );
";

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed adapter bound to one namespace prefix.
///
/// Each adapter owns one connection. Concurrent writers on the same file
/// are serialized by SQLite's database lock.
#[derive(Debug)]
pub struct SqliteAdapter {
    path: PathBuf,
    prefix: String,
    mode: Mode,
    conn: Mutex<Option<Connection>>,
}

impl SqliteAdapter {
    /// Creates an unopened adapter for `prefix` over the database at `path`.
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.into(),
            mode: Mode::Closed,
            conn: Mutex::new(None),
        }
    }

    /// Returns the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn prefix_len(&self) -> i64 {
        i64::try_from(self.prefix.chars().count()).unwrap_or(i64::MAX)
    }

    fn with_conn<T>(
        &self,
        write: bool,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        if write {
            self.mode.writable()?;
        } else {
            self.mode.readable()?;
        }
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        f(conn)
    }

    fn keys_of(&self, table: &str) -> StorageResult<BTreeSet<String>> {
        let sql = format!("SELECT DISTINCT key FROM {table} WHERE substr(key, 1, ?2) = ?1");
        self.with_conn(false, |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let keys = stmt
                .query_map(params![self.prefix, self.prefix_len()], |row| row.get(0))?
                .collect::<Result<BTreeSet<String>, _>>()?;
            Ok(keys)
        })
    }

    fn open_read_only(&self) -> StorageResult<Connection> {
        if !self.path.exists() {
            return Err(StorageError::not_available(format!(
                "database {} does not exist",
                self.path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let known = conn
            .query_row(
                "SELECT 1 FROM namespaces WHERE name = ?1",
                [&self.prefix],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| StorageError::not_available(format!("database not initialized: {e}")))?;
        if known.is_none() {
            return Err(StorageError::not_available(format!(
                "namespace '{}' does not exist",
                self.prefix
            )));
        }
        Ok(conn)
    }

    fn open_read_write(&self) -> StorageResult<Connection> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR IGNORE INTO namespaces (name) VALUES (?1)",
            [&self.prefix],
        )?;
        Ok(conn)
    }
}

impl BackendAdapter for SqliteAdapter {
    fn scheme(&self) -> &'static str {
        "sqlite"
    }

    fn open(&mut self, read_only: bool) -> StorageResult<()> {
        self.close()?;
        let conn = if read_only {
            self.open_read_only()?
        } else {
            self.open_read_write()?
        };
        *self.conn.get_mut() = Some(conn);
        self.mode = Mode::opened(read_only);
        debug!(path = %self.path.display(), read_only, "sqlite opened");
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.mode = Mode::Closed;
        if let Some(conn) = self.conn.get_mut().take() {
            conn.close().map_err(|(_, e)| StorageError::from(e))?;
            debug!(path = %self.path.display(), "sqlite closed");
        }
        Ok(())
    }

    fn discard(&mut self) -> StorageResult<()> {
        let n = self.prefix_len();
        let empty = self.with_conn(true, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for table in ["kv", "ts", "es"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE substr(key, 1, ?2) = ?1"),
                    params![self.prefix, n],
                )?;
            }
            tx.execute("DELETE FROM namespaces WHERE name = ?1", [&self.prefix])?;
            let remaining: i64 = tx.query_row(
                "SELECT (SELECT COUNT(*) FROM namespaces) + (SELECT COUNT(*) FROM kv)
                      + (SELECT COUNT(*) FROM ts) + (SELECT COUNT(*) FROM es)",
                [],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(remaining == 0)
        })?;
        self.close()?;
        if empty {
            fs::remove_file(&self.path)?;
        }
        info!(path = %self.path.display(), prefix = %self.prefix, removed = empty, "namespace discarded");
        Ok(())
    }

    fn kv_get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.with_conn(false, |conn| {
            Ok(conn
                .prepare_cached("SELECT value FROM kv WHERE key = ?1")?
                .query_row([key], |row| row.get(0))
                .optional()?)
        })
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.with_conn(true, |conn| {
            conn.prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")?
                .execute(params![key, value])?;
            Ok(())
        })
    }

    fn kv_delete(&self, keys: &[String]) -> StorageResult<()> {
        self.with_conn(true, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
                for key in keys {
                    stmt.execute([key])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn kv_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.keys_of("kv")
    }

    fn ts_range(&self, key: &str, start: i64, end: i64) -> StorageResult<Vec<RawPoint>> {
        self.with_conn(false, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT timestamp, value FROM ts
                 WHERE key = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp",
            )?;
            let points = stmt
                .query_map(params![key, start, end], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<RawPoint>, _>>()?;
            Ok(points)
        })
    }

    fn ts_first(&self, key: &str) -> StorageResult<Option<i64>> {
        self.with_conn(false, |conn| {
            Ok(conn.query_row("SELECT MIN(timestamp) FROM ts WHERE key = ?1", [key], |row| {
                row.get(0)
            })?)
        })
    }

    fn ts_last(&self, key: &str) -> StorageResult<Option<i64>> {
        self.with_conn(false, |conn| {
            Ok(conn.query_row("SELECT MAX(timestamp) FROM ts WHERE key = ?1", [key], |row| {
                row.get(0)
            })?)
        })
    }

    fn ts_extend(&self, key: &str, points: &[RawPoint]) -> StorageResult<()> {
        self.with_conn(true, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO ts (key, timestamp, value) VALUES (?1, ?2, ?3)",
                )?;
                for (timestamp, value) in points {
                    stmt.execute(params![key, timestamp, value])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn ts_delete(&self, key: &str, start: i64, end: i64) -> StorageResult<()> {
        self.with_conn(true, |conn| {
            conn.execute(
                "DELETE FROM ts WHERE key = ?1 AND timestamp >= ?2 AND timestamp <= ?3",
                params![key, start, end],
            )?;
            Ok(())
        })
    }

    fn ts_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.keys_of("ts")
    }

    fn es_events(
        &self,
        key: &str,
        start: Option<i64>,
        end: Option<i64>,
        ops: Option<&[String]>,
    ) -> StorageResult<Vec<RawEvent>> {
        let rows = self.with_conn(false, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT timestamp, item, operator, value FROM es
                 WHERE key = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                 ORDER BY timestamp, item",
            )?;
            let rows = stmt
                .query_map(
                    params![key, start.unwrap_or(i64::MIN), end.unwrap_or(i64::MAX)],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            RawChange::new(row.get::<_, String>(2)?, row.get::<_, Vec<u8>>(3)?),
                        ))
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut events: Vec<RawEvent> = Vec::new();
        for (timestamp, item, change) in rows {
            match events.last_mut() {
                Some(event) if event.timestamp == timestamp => {
                    event.changes.insert(item, change);
                }
                _ => events.push(RawEvent {
                    timestamp,
                    changes: [(item, change)].into(),
                }),
            }
        }
        Ok(filter_ops(events, ops))
    }

    fn es_append(&self, key: &str, timestamp: i64, changes: &RawChanges) -> StorageResult<()> {
        self.with_conn(true, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM es WHERE key = ?1 AND timestamp = ?2)",
                params![key, timestamp],
                |row| row.get(0),
            )?;
            if taken {
                return Err(StorageError::TimestampTaken {
                    key: key.to_string(),
                    timestamp,
                });
            }
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO es (key, timestamp, item, operator, value)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (item, change) in changes {
                    stmt.execute(params![key, timestamp, item, change.op, change.value])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn es_delete(&self, key: &str, events: &[EventKey]) -> StorageResult<()> {
        self.with_conn(true, |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare_cached(
                    "DELETE FROM es
                     WHERE key = ?1 AND timestamp = ?2 AND item = ?3 AND operator = ?4",
                )?;
                for event in events {
                    stmt.execute(params![key, event.timestamp, event.item, event.op])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn es_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.keys_of("es")
    }
}

impl Drop for SqliteAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(path: &Path, prefix: &str, read_only: bool) -> SqliteAdapter {
        let mut adapter = SqliteAdapter::new(path, prefix);
        adapter.open(read_only).unwrap();
        adapter
    }

    fn changes(items: &[(&str, &str)]) -> RawChanges {
        items
            .iter()
            .map(|(item, op)| ((*item).to_string(), RawChange::new(*op, b"v".to_vec())))
            .collect()
    }

    #[test]
    fn sqlite_read_only_open_requires_namespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let mut reader = SqliteAdapter::new(&path, "ns:");
        assert!(matches!(reader.open(true), Err(StorageError::NotAvailable(_))));

        let _writer = open(&path, "other:", false);
        assert!(matches!(reader.open(true), Err(StorageError::NotAvailable(_))));
    }

    #[test]
    fn sqlite_prefix_listing_ignores_like_wildcards() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let a = open(&path, "a_b:", false);
        let b = open(&path, "axb:", false);
        a.kv_set("a_b:one", b"1").unwrap();
        b.kv_set("axb:two", b"2").unwrap();
        assert_eq!(a.kv_keys().unwrap().into_iter().collect::<Vec<_>>(), vec!["a_b:one"]);
    }

    #[test]
    fn sqlite_events_grouped_by_timestamp() {
        let dir = tempdir().unwrap();
        let adapter = open(&dir.path().join("s.db"), "ns:", false);
        adapter.es_append("ns:e", 2, &changes(&[("b", "add")])).unwrap();
        adapter
            .es_append("ns:e", 1, &changes(&[("a", "set"), ("b", "set")]))
            .unwrap();
        let events = adapter.es_events("ns:e", None, None, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, 1);
        assert_eq!(events[0].changes, changes(&[("a", "set"), ("b", "set")]));

        let adds = adapter
            .es_events("ns:e", None, None, Some(&["add".to_string()]))
            .unwrap();
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].timestamp, 2);
    }

    #[test]
    fn sqlite_duplicate_timestamp_rejected_across_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let first = open(&path, "ns:", false);
        let second = open(&path, "ns:", false);
        first.es_append("ns:e", 7, &changes(&[("a", "set")])).unwrap();
        assert!(matches!(
            second.es_append("ns:e", 7, &changes(&[("z", "set")])),
            Err(StorageError::TimestampTaken { timestamp: 7, .. })
        ));
        assert_eq!(
            second.es_events("ns:e", None, None, None).unwrap()[0].changes,
            changes(&[("a", "set")])
        );
    }

    #[test]
    fn sqlite_discard_removes_file_when_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let mut adapter = open(&path, "ns:", false);
        adapter.ts_extend("ns:t", &[(1, b"x".to_vec())]).unwrap();
        adapter.discard().unwrap();
        assert!(!path.exists());
        assert!(matches!(adapter.ts_keys(), Err(StorageError::Closed)));
    }
}
