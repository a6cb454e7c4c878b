//! Journal record types and framing.
//!
//! Frame layout: `magic (4) || payload length u32 LE || crc32 u32 LE || payload`.
//! The payload is a canonical CBOR array `[record type, fields...]`.

use crate::backend::{EventKey, RawChange, RawChanges, RawPoint};
use crate::error::{StorageError, StorageResult};
use crate::tables::Tables;
use tristore_codec::{from_cbor, to_canonical_cbor, Value};

/// Magic bytes opening every journal frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"TSJR";

/// Size of the frame header preceding the payload.
pub(crate) const HEADER_SIZE: usize = 12;

/// Type tag of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RecordType {
    CreateNamespace = 1,
    KvSet = 2,
    KvDelete = 3,
    TsExtend = 4,
    TsDelete = 5,
    EsAppend = 6,
    EsDelete = 7,
    Discard = 8,
}

impl RecordType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::CreateNamespace),
            2 => Some(Self::KvSet),
            3 => Some(Self::KvDelete),
            4 => Some(Self::TsExtend),
            5 => Some(Self::TsDelete),
            6 => Some(Self::EsAppend),
            7 => Some(Self::EsDelete),
            8 => Some(Self::Discard),
            _ => None,
        }
    }
}

/// One mutation recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalRecord {
    CreateNamespace {
        prefix: String,
    },
    KvSet {
        key: String,
        value: Vec<u8>,
    },
    KvDelete {
        keys: Vec<String>,
    },
    TsExtend {
        key: String,
        points: Vec<RawPoint>,
    },
    TsDelete {
        key: String,
        start: i64,
        end: i64,
    },
    EsAppend {
        key: String,
        timestamp: i64,
        changes: RawChanges,
    },
    EsDelete {
        key: String,
        events: Vec<EventKey>,
    },
    Discard {
        prefix: String,
    },
}

impl JournalRecord {
    pub(crate) fn record_type(&self) -> RecordType {
        match self {
            Self::CreateNamespace { .. } => RecordType::CreateNamespace,
            Self::KvSet { .. } => RecordType::KvSet,
            Self::KvDelete { .. } => RecordType::KvDelete,
            Self::TsExtend { .. } => RecordType::TsExtend,
            Self::TsDelete { .. } => RecordType::TsDelete,
            Self::EsAppend { .. } => RecordType::EsAppend,
            Self::EsDelete { .. } => RecordType::EsDelete,
            Self::Discard { .. } => RecordType::Discard,
        }
    }

    /// Applies this record to the in-memory tables.
    pub(crate) fn apply(&self, tables: &mut Tables) -> StorageResult<()> {
        match self {
            Self::CreateNamespace { prefix } => tables.create_namespace(prefix),
            Self::KvSet { key, value } => tables.kv_set(key, value),
            Self::KvDelete { keys } => tables.kv_delete(keys),
            Self::TsExtend { key, points } => tables.ts_extend(key, points),
            Self::TsDelete { key, start, end } => tables.ts_delete(key, *start, *end),
            Self::EsAppend {
                key,
                timestamp,
                changes,
            } => tables
                .es_append(key, *timestamp, changes)
                .map_err(|e| StorageError::corrupted(format!("journal replay: {e}")))?,
            Self::EsDelete { key, events } => tables.es_delete(key, events),
            Self::Discard { prefix } => tables.discard(prefix),
        }
        Ok(())
    }

    fn to_value(&self) -> Value {
        let mut fields = vec![Value::Integer(self.record_type() as i64)];
        match self {
            Self::CreateNamespace { prefix } | Self::Discard { prefix } => {
                fields.push(Value::from(prefix.as_str()));
            }
            Self::KvSet { key, value } => {
                fields.push(Value::from(key.as_str()));
                fields.push(Value::from(value.as_slice()));
            }
            Self::KvDelete { keys } => {
                fields.push(Value::Array(
                    keys.iter().map(|k| Value::from(k.as_str())).collect(),
                ));
            }
            Self::TsExtend { key, points } => {
                fields.push(Value::from(key.as_str()));
                fields.push(Value::Array(
                    points
                        .iter()
                        .map(|(ts, value)| {
                            Value::Array(vec![Value::Integer(*ts), Value::from(value.as_slice())])
                        })
                        .collect(),
                ));
            }
            Self::TsDelete { key, start, end } => {
                fields.push(Value::from(key.as_str()));
                fields.push(Value::Integer(*start));
                fields.push(Value::Integer(*end));
            }
            Self::EsAppend {
                key,
                timestamp,
                changes,
            } => {
                fields.push(Value::from(key.as_str()));
                fields.push(Value::Integer(*timestamp));
                fields.push(Value::Array(
                    changes
                        .iter()
                        .map(|(item, change)| {
                            Value::Array(vec![
                                Value::from(item.as_str()),
                                Value::from(change.op.as_str()),
                                Value::from(change.value.as_slice()),
                            ])
                        })
                        .collect(),
                ));
            }
            Self::EsDelete { key, events } => {
                fields.push(Value::from(key.as_str()));
                fields.push(Value::Array(
                    events
                        .iter()
                        .map(|e| {
                            Value::Array(vec![
                                Value::Integer(e.timestamp),
                                Value::from(e.item.as_str()),
                                Value::from(e.op.as_str()),
                            ])
                        })
                        .collect(),
                ));
            }
        }
        Value::Array(fields)
    }

    fn from_value(value: Value) -> StorageResult<Self> {
        let Value::Array(items) = value else {
            return Err(StorageError::corrupted("journal record is not an array"));
        };
        let mut fields = Fields(items.into_iter());
        let tag = fields.integer()?;
        let record_type = u8::try_from(tag)
            .ok()
            .and_then(RecordType::from_byte)
            .ok_or_else(|| StorageError::corrupted(format!("unknown journal record type {tag}")))?;

        let record = match record_type {
            RecordType::CreateNamespace => Self::CreateNamespace {
                prefix: fields.text()?,
            },
            RecordType::Discard => Self::Discard {
                prefix: fields.text()?,
            },
            RecordType::KvSet => Self::KvSet {
                key: fields.text()?,
                value: fields.bytes()?,
            },
            RecordType::KvDelete => Self::KvDelete {
                keys: fields
                    .array()?
                    .into_iter()
                    .map(|k| match k {
                        Value::Text(s) => Ok(s),
                        other => Err(Fields::mismatch("text", &other)),
                    })
                    .collect::<StorageResult<_>>()?,
            },
            RecordType::TsExtend => {
                let key = fields.text()?;
                let points = fields
                    .array()?
                    .into_iter()
                    .map(|point| {
                        let mut p = Fields::of(point)?;
                        Ok((p.integer()?, p.bytes()?))
                    })
                    .collect::<StorageResult<_>>()?;
                Self::TsExtend { key, points }
            }
            RecordType::TsDelete => Self::TsDelete {
                key: fields.text()?,
                start: fields.integer()?,
                end: fields.integer()?,
            },
            RecordType::EsAppend => {
                let key = fields.text()?;
                let timestamp = fields.integer()?;
                let changes = fields
                    .array()?
                    .into_iter()
                    .map(|change| {
                        let mut c = Fields::of(change)?;
                        let item = c.text()?;
                        Ok((item, RawChange::new(c.text()?, c.bytes()?)))
                    })
                    .collect::<StorageResult<_>>()?;
                Self::EsAppend {
                    key,
                    timestamp,
                    changes,
                }
            }
            RecordType::EsDelete => {
                let key = fields.text()?;
                let events = fields
                    .array()?
                    .into_iter()
                    .map(|event| {
                        let mut e = Fields::of(event)?;
                        Ok(EventKey {
                            timestamp: e.integer()?,
                            item: e.text()?,
                            op: e.text()?,
                        })
                    })
                    .collect::<StorageResult<_>>()?;
                Self::EsDelete { key, events }
            }
        };
        fields.finish()?;
        Ok(record)
    }

    /// Encodes the record into a complete frame.
    pub(crate) fn encode_frame(&self) -> StorageResult<Vec<u8>> {
        let payload = to_canonical_cbor(&self.to_value())?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::corrupted("journal record exceeds 4 GiB"))?;
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&FRAME_MAGIC);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

/// Reads one frame from the start of `data`.
///
/// Returns `Ok(None)` for an incomplete header or payload, which is what a
/// write torn by a crash leaves behind. A complete frame with a bad magic or
/// checksum, or with a payload that cannot be decoded, is corruption.
pub(crate) fn read_frame(data: &[u8]) -> StorageResult<Option<(JournalRecord, usize)>> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }
    if data[..4] != FRAME_MAGIC {
        return Err(StorageError::corrupted("journal frame has a bad magic"));
    }
    let len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let Some(payload) = data.get(HEADER_SIZE..HEADER_SIZE + len) else {
        return Ok(None);
    };
    let actual = compute_crc32(payload);
    if actual != crc {
        return Err(StorageError::corrupted(format!(
            "journal frame checksum mismatch: expected {crc:#010x}, found {actual:#010x}"
        )));
    }
    let record = JournalRecord::from_value(from_cbor(payload)?)?;
    Ok(Some((record, HEADER_SIZE + len)))
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

/// Sequential reader over the fields of a record array.
struct Fields(std::vec::IntoIter<Value>);

impl Fields {
    fn of(value: Value) -> StorageResult<Self> {
        match value {
            Value::Array(items) => Ok(Self(items.into_iter())),
            other => Err(StorageError::corrupted(format!(
                "expected array in journal record, found {}",
                other.type_name()
            ))),
        }
    }

    fn next(&mut self) -> StorageResult<Value> {
        self.0
            .next()
            .ok_or_else(|| StorageError::corrupted("journal record is missing fields"))
    }

    fn mismatch(expected: &str, found: &Value) -> StorageError {
        StorageError::corrupted(format!(
            "expected {expected} in journal record, found {}",
            found.type_name()
        ))
    }

    fn integer(&mut self) -> StorageResult<i64> {
        match self.next()? {
            Value::Integer(n) => Ok(n),
            other => Err(Self::mismatch("integer", &other)),
        }
    }

    fn text(&mut self) -> StorageResult<String> {
        match self.next()? {
            Value::Text(s) => Ok(s),
            other => Err(Self::mismatch("text", &other)),
        }
    }

    fn bytes(&mut self) -> StorageResult<Vec<u8>> {
        match self.next()? {
            Value::Bytes(b) => Ok(b),
            other => Err(Self::mismatch("bytes", &other)),
        }
    }

    fn array(&mut self) -> StorageResult<Vec<Value>> {
        match self.next()? {
            Value::Array(items) => Ok(items),
            other => Err(Self::mismatch("array", &other)),
        }
    }

    fn finish(mut self) -> StorageResult<()> {
        match self.0.next() {
            None => Ok(()),
            Some(_) => Err(StorageError::corrupted("journal record has extra fields")),
        }
    }
}
