//! Embedded file engine backed by an append-only journal.
//!
//! Every mutation is appended as a framed record (see [`record`]) and
//! replayed into in-memory tables. Handles on the same file coordinate
//! through advisory locks: reads hold a shared lock, writes an exclusive
//! one, and each operation first replays whatever other handles appended
//! since its last call. The event timestamp check and the append happen
//! under the same exclusive lock, so they are atomic across processes.
//!
//! An incomplete frame left by a crash is ignored by readers and cut off by
//! the next writer. A complete frame failing its magic or checksum stops
//! every handle with [`StorageError::Corrupted`]; nothing after it is
//! touched.

mod record;

use crate::backend::{filter_ops, BackendAdapter, EventKey, Mode, RawChanges, RawEvent, RawPoint};
use crate::error::{StorageError, StorageResult};
use crate::tables::Tables;
use fs2::FileExt;
use parking_lot::Mutex;
use record::{read_frame, JournalRecord};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An open journal file and the tables replayed from it.
#[derive(Debug)]
struct Journal {
    file: File,
    offset: u64,
    tables: Tables,
    sync: bool,
}

impl Journal {
    /// Replays records appended since the last call.
    ///
    /// With `repair` set (exclusive lock held) a torn tail is truncated.
    fn catch_up(&mut self, path: &Path, repair: bool) -> StorageResult<()> {
        let len = self.file.metadata()?.len();
        if len < self.offset {
            return Err(StorageError::corrupted(format!(
                "journal {} shrank below replayed offset {}",
                path.display(),
                self.offset
            )));
        }
        if len == self.offset {
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        (&self.file).take(len - self.offset).read_to_end(&mut buf)?;

        let start = self.offset;
        let mut pos = 0;
        while pos < buf.len() {
            let frame = read_frame(&buf[pos..]).map_err(|e| {
                StorageError::corrupted(format!(
                    "journal {} at offset {}: {e}",
                    path.display(),
                    start + pos as u64
                ))
            })?;
            let Some((record, used)) = frame else {
                break;
            };
            record.apply(&mut self.tables)?;
            pos += used;
            self.offset = start + pos as u64;
        }

        if pos < buf.len() {
            let torn = buf.len() - pos;
            if repair {
                warn!(path = %path.display(), bytes = torn, "truncating torn journal tail");
                self.file.set_len(self.offset)?;
                self.file.sync_all()?;
            } else {
                debug!(path = %path.display(), bytes = torn, "ignoring torn journal tail");
            }
        }
        Ok(())
    }

    /// Writes a record at the replayed end of the file and applies it.
    fn append(&mut self, record: &JournalRecord) -> StorageResult<()> {
        let frame = record.encode_frame()?;
        self.file.seek(SeekFrom::Start(self.offset))?;
        self.file.write_all(&frame)?;
        if self.sync {
            self.file.sync_data()?;
        }
        self.offset += frame.len() as u64;
        record.apply(&mut self.tables)
    }
}

/// File-based adapter over a shared journal, bound to one namespace prefix.
///
/// # Durability
///
/// Each write is synced to disk before returning unless disabled with
/// [`with_sync`](Self::with_sync).
///
/// # Example
///
/// ```no_run
/// use tristore_storage::{BackendAdapter, JournalAdapter};
///
/// let mut adapter = JournalAdapter::new("data/store.journal", "default:");
/// adapter.open(false).unwrap();
/// adapter.ts_extend("default:temp", &[(100, b"21.5".to_vec())]).unwrap();
/// adapter.close().unwrap();
/// ```
#[derive(Debug)]
pub struct JournalAdapter {
    path: PathBuf,
    prefix: String,
    sync: bool,
    mode: Mode,
    journal: Mutex<Option<Journal>>,
}

impl JournalAdapter {
    /// Creates an unopened adapter for `prefix` over the journal at `path`.
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.into(),
            sync: true,
            mode: Mode::Closed,
            journal: Mutex::new(None),
        }
    }

    /// Sets whether every write is synced to disk.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` on the caught-up journal under a file lock.
    fn locked<T>(
        &self,
        exclusive: bool,
        f: impl FnOnce(&mut Journal) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self.journal.lock();
        let journal = guard.as_mut().ok_or(StorageError::Closed)?;
        if exclusive {
            FileExt::lock_exclusive(&journal.file)?;
        } else {
            FileExt::lock_shared(&journal.file)?;
        }
        let result = journal
            .catch_up(&self.path, exclusive)
            .and_then(|()| f(journal));
        let unlocked = FileExt::unlock(&journal.file);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StorageResult<T> {
        self.mode.readable()?;
        self.locked(false, |journal| Ok(f(&journal.tables)))
    }

    fn write(&self, record: JournalRecord) -> StorageResult<()> {
        self.mode.writable()?;
        self.locked(true, |journal| {
            if let JournalRecord::EsAppend { key, timestamp, .. } = &record {
                journal.tables.es_check(key, *timestamp)?;
            }
            journal.append(&record)
        })
    }
}

impl BackendAdapter for JournalAdapter {
    fn scheme(&self) -> &'static str {
        "file"
    }

    fn open(&mut self, read_only: bool) -> StorageResult<()> {
        self.close()?;
        let file = if read_only {
            if !self.path.exists() {
                return Err(StorageError::not_available(format!(
                    "journal {} does not exist",
                    self.path.display()
                )));
            }
            OpenOptions::new().read(true).open(&self.path)?
        } else {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?
        };

        *self.journal.get_mut() = Some(Journal {
            file,
            offset: 0,
            tables: Tables::default(),
            sync: self.sync,
        });

        let prefix = self.prefix.clone();
        let opened = self.locked(!read_only, |journal| {
            if journal.tables.has_namespace(&prefix) {
                return Ok(());
            }
            if read_only {
                return Err(StorageError::not_available(format!(
                    "namespace '{prefix}' does not exist"
                )));
            }
            journal.append(&JournalRecord::CreateNamespace { prefix })
        });
        if let Err(e) = opened {
            *self.journal.get_mut() = None;
            return Err(e);
        }

        self.mode = Mode::opened(read_only);
        debug!(path = %self.path.display(), read_only, "journal opened");
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if self.journal.get_mut().take().is_some() {
            debug!(path = %self.path.display(), "journal closed");
        }
        self.mode = Mode::Closed;
        Ok(())
    }

    fn discard(&mut self) -> StorageResult<()> {
        self.mode.writable()?;
        let prefix = self.prefix.clone();
        let path = self.path.clone();
        let removed = self.locked(true, |journal| {
            journal.append(&JournalRecord::Discard { prefix })?;
            if journal.tables.is_empty() {
                fs::remove_file(&path)?;
                return Ok(true);
            }
            Ok(false)
        })?;
        info!(path = %self.path.display(), prefix = %self.prefix, removed, "namespace discarded");
        self.close()
    }

    fn kv_get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.read(|t| t.kv_get(key))
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.write(JournalRecord::KvSet {
            key: key.to_string(),
            value: value.to_vec(),
        })
    }

    fn kv_delete(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return self.mode.writable();
        }
        self.write(JournalRecord::KvDelete {
            keys: keys.to_vec(),
        })
    }

    fn kv_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.read(|t| t.kv_keys(&self.prefix))
    }

    fn ts_range(&self, key: &str, start: i64, end: i64) -> StorageResult<Vec<RawPoint>> {
        self.read(|t| t.ts_range(key, start, end))
    }

    fn ts_first(&self, key: &str) -> StorageResult<Option<i64>> {
        self.read(|t| t.ts_first(key))
    }

    fn ts_last(&self, key: &str) -> StorageResult<Option<i64>> {
        self.read(|t| t.ts_last(key))
    }

    fn ts_extend(&self, key: &str, points: &[RawPoint]) -> StorageResult<()> {
        if points.is_empty() {
            return self.mode.writable();
        }
        self.write(JournalRecord::TsExtend {
            key: key.to_string(),
            points: points.to_vec(),
        })
    }

    fn ts_delete(&self, key: &str, start: i64, end: i64) -> StorageResult<()> {
        self.write(JournalRecord::TsDelete {
            key: key.to_string(),
            start,
            end,
        })
    }

    fn ts_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.read(|t| t.ts_keys(&self.prefix))
    }

    fn es_events(
        &self,
        key: &str,
        start: Option<i64>,
        end: Option<i64>,
        ops: Option<&[String]>,
    ) -> StorageResult<Vec<RawEvent>> {
        let events = self.read(|t| t.es_events(key, start, end))?;
        Ok(filter_ops(events, ops))
    }

    fn es_append(&self, key: &str, timestamp: i64, changes: &RawChanges) -> StorageResult<()> {
        self.write(JournalRecord::EsAppend {
            key: key.to_string(),
            timestamp,
            changes: changes.clone(),
        })
    }

    fn es_delete(&self, key: &str, events: &[EventKey]) -> StorageResult<()> {
        if events.is_empty() {
            return self.mode.writable();
        }
        self.write(JournalRecord::EsDelete {
            key: key.to_string(),
            events: events.to_vec(),
        })
    }

    fn es_keys(&self) -> StorageResult<BTreeSet<String>> {
        self.read(|t| t.es_keys(&self.prefix))
    }
}

impl Drop for JournalAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawChange;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open(path: &Path, prefix: &str, read_only: bool) -> JournalAdapter {
        let mut adapter = JournalAdapter::new(path, prefix);
        adapter.open(read_only).unwrap();
        adapter
    }

    fn set(item: &str, value: &[u8]) -> RawChanges {
        [(item.to_string(), RawChange::new("set", value.to_vec()))].into()
    }

    #[test]
    fn journal_read_only_open_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        let mut adapter = JournalAdapter::new(dir.path().join("none.journal"), "ns:");
        assert!(matches!(
            adapter.open(true),
            Err(StorageError::NotAvailable(_))
        ));
        assert!(!dir.path().join("none.journal").exists());
    }

    #[test]
    fn journal_read_only_open_of_unknown_namespace_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.journal");
        let _writer = open(&path, "a:", false);
        let mut reader = JournalAdapter::new(&path, "b:");
        assert!(matches!(
            reader.open(true),
            Err(StorageError::NotAvailable(_))
        ));
    }

    #[test]
    fn journal_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("s.journal");
        {
            let mut adapter = open(&path, "ns:", false);
            adapter.kv_set("ns:k", b"v").unwrap();
            adapter.ts_extend("ns:t", &[(1, b"a".to_vec()), (2, b"b".to_vec())]).unwrap();
            adapter.es_append("ns:e", 5, &set("x", b"1")).unwrap();
            adapter.close().unwrap();
        }
        let adapter = open(&path, "ns:", true);
        assert_eq!(adapter.kv_get("ns:k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(adapter.ts_last("ns:t").unwrap(), Some(2));
        assert_eq!(adapter.es_events("ns:e", None, None, None).unwrap().len(), 1);
    }

    #[test]
    fn journal_handles_see_each_others_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.journal");
        let first = open(&path, "ns:", false);
        let second = open(&path, "ns:", false);

        first.kv_set("ns:k", b"1").unwrap();
        assert_eq!(second.kv_get("ns:k").unwrap(), Some(b"1".to_vec()));

        first.es_append("ns:e", 10, &set("x", b"1")).unwrap();
        assert!(matches!(
            second.es_append("ns:e", 10, &set("y", b"2")),
            Err(StorageError::TimestampTaken { timestamp: 10, .. })
        ));
        let events = first.es_events("ns:e", None, None, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].changes, set("x", b"1"));
    }

    #[test]
    fn journal_torn_tail_is_truncated_by_writer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.journal");
        {
            let adapter = open(&path, "ns:", false);
            adapter.kv_set("ns:a", b"1").unwrap();
        }
        let intact = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"TSJR\x40\x00\x00\x00garbage").unwrap();
        }

        let reader = open(&path, "ns:", true);
        assert_eq!(reader.kv_get("ns:a").unwrap(), Some(b"1".to_vec()));

        let writer = open(&path, "ns:", false);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact);
        writer.kv_set("ns:b", b"2").unwrap();
        assert_eq!(reader.kv_get("ns:b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn journal_corrupt_middle_frame_fails_without_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.journal");
        let second_end = {
            let adapter = open(&path, "ns:", false);
            adapter.kv_set("ns:one", b"1").unwrap();
            adapter.kv_set("ns:two", b"2").unwrap();
            let second_end = fs::metadata(&path).unwrap().len();
            adapter.kv_set("ns:three", b"3").unwrap();
            second_end
        };
        let intact = fs::read(&path).unwrap();
        let mut damaged = intact.clone();
        let at = usize::try_from(second_end).unwrap() - 1;
        damaged[at] ^= 0xff;
        fs::write(&path, &damaged).unwrap();

        for read_only in [false, true] {
            let mut adapter = JournalAdapter::new(&path, "ns:");
            assert!(matches!(
                adapter.open(read_only),
                Err(StorageError::Corrupted(_))
            ));
        }
        assert_eq!(fs::read(&path).unwrap(), damaged);
        assert_eq!(damaged.len(), intact.len());
    }

    #[test]
    fn journal_discard_removes_file_when_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.journal");
        let mut a = open(&path, "a:", false);
        let mut b = open(&path, "b:", false);
        a.kv_set("a:k", b"1").unwrap();
        b.kv_set("b:k", b"2").unwrap();

        a.discard().unwrap();
        assert!(path.exists());
        assert!(matches!(a.kv_keys(), Err(StorageError::Closed)));
        assert_eq!(b.kv_keys().unwrap().len(), 1);

        b.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn journal_write_through_read_only_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.journal");
        let _writer = open(&path, "ns:", false);
        let reader = open(&path, "ns:", true);
        assert!(matches!(
            reader.kv_set("ns:k", b"v"),
            Err(StorageError::ReadOnly)
        ));
    }
}
