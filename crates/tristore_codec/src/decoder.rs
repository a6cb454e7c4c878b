//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Maximum element count for arrays and maps.
pub const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum byte/text string length.
pub const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting depth of arrays and maps.
const MAX_DEPTH: usize = 128;

/// Decodes exactly one value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR, contain
/// forbidden constructs, or have trailing bytes after the value.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A canonical CBOR decoder over a borrowed buffer.
///
/// Rejects non-shortest heads, unsorted or duplicate map keys,
/// non-double floats, NaN and indefinite lengths.
#[derive(Debug)]
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Creates a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decodes the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major_type = initial >> 5;
        let info = initial & 0x1f;

        match major_type {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.read_length(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            3 => {
                let len = self.read_length(info, MAX_BYTES_LENGTH)?;
                let bytes = self.read_bytes(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => {
                let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
                self.enter()?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                self.depth -= 1;
                Ok(Value::Array(items))
            }
            5 => {
                let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
                self.enter()?;
                let map = self.decode_map(len)?;
                self.depth -= 1;
                Ok(map)
            }
            6 => Err(CodecError::unsupported_type("tagged item")),
            _ => self.decode_simple(info),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn enter(&mut self) -> CodecResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        Ok(())
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, min) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => (u64::from(u16::from_be_bytes(self.read_array()?)), 0x100),
            26 => (u64::from(u32::from_be_bytes(self.read_array()?)), 0x1_0000),
            27 => (u64::from_be_bytes(self.read_array()?), 0x1_0000_0000),
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < min {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_length(&mut self, info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.read_argument(info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        Ok(claimed as usize)
    }

    fn decode_map(&mut self, len: usize) -> CodecResult<Value> {
        let mut pairs = Vec::with_capacity(len.min(1024));
        let mut prev_key: Option<&'a [u8]> = None;
        let data: &'a [u8] = self.data;

        for _ in 0..len {
            let start = self.pos;
            let key = self.decode()?;
            let key_bytes = &data[start..self.pos];

            if let Some(prev) = prev_key {
                let order = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if order != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25 | 26 => Err(CodecError::invalid_structure(
                "non-canonical: floats must be double precision",
            )),
            27 => {
                let f = f64::from_bits(u64::from_be_bytes(self.read_array()?));
                if f.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(f))
            }
            31 => Err(CodecError::invalid_structure("break without indefinite item")),
            other => Err(CodecError::unsupported_type(format!("simple value {other}"))),
        }
    }
}
