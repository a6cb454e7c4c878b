//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encodes a value to canonical CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value contains a NaN float.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Sort key for a map key: encoded length first, then the encoded bytes.
///
/// Keys that cannot be encoded sort last; the encoder rejects them anyway.
pub(crate) fn encoded_key(key: &Value) -> (usize, Vec<u8>) {
    match to_canonical_cbor(key) {
        Ok(bytes) => (bytes.len(), bytes),
        Err(_) => (usize::MAX, Vec::new()),
    }
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Creates a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encodes a value, appending to the buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f)?,
            Value::Bytes(b) => {
                self.encode_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.encode_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.encode_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => self.encode_map(pairs)?,
        }
        Ok(())
    }

    /// Consumes this encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns the bytes encoded so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 - n is in [0, i64::MAX] for every negative n
            self.encode_head(1, (-1 - n) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        if f.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&f.to_bits().to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, argument: u64) {
        let mt = major_type << 5;
        if argument < 24 {
            self.buffer.push(mt | argument as u8);
        } else if argument <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(argument as u8);
        } else if argument <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&argument.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            entries.push((to_canonical_cbor(key)?, value));
        }
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::encoding_failed("duplicate map key"));
        }

        self.encode_head(5, entries.len() as u64);
        for (key_bytes, value) in entries {
            self.buffer.extend_from_slice(&key_bytes);
            self.encode(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: Value) -> Vec<u8> {
        to_canonical_cbor(&value).unwrap()
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(Value::Null), vec![0xf6]);
        assert_eq!(enc(Value::Bool(false)), vec![0xf4]);
        assert_eq!(enc(Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn integers_use_shortest_head() {
        assert_eq!(enc(Value::Integer(23)), vec![0x17]);
        assert_eq!(enc(Value::Integer(24)), vec![0x18, 24]);
        assert_eq!(enc(Value::Integer(256)), vec![0x19, 0x01, 0x00]);
        assert_eq!(enc(Value::Integer(65536)), vec![0x1a, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(
            enc(Value::Integer(i64::MAX)),
            vec![0x1b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn negative_integers() {
        assert_eq!(enc(Value::Integer(-1)), vec![0x20]);
        assert_eq!(enc(Value::Integer(-25)), vec![0x38, 24]);
        assert_eq!(
            enc(Value::Integer(i64::MIN)),
            vec![0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn floats_are_always_double_width() {
        assert_eq!(
            enc(Value::Float(1.5)),
            vec![0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            to_canonical_cbor(&Value::Float(f64::NAN)),
            Err(CodecError::NaNForbidden)
        );
    }

    #[test]
    fn strings_and_bytes() {
        assert_eq!(enc(Value::Bytes(vec![1, 2, 3])), vec![0x43, 1, 2, 3]);
        assert_eq!(enc(Value::from("hi")), vec![0x62, b'h', b'i']);
    }

    #[test]
    fn map_keys_sorted_length_first() {
        let map = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
            (Value::Integer(1), Value::Integer(0)),
        ]);
        assert_eq!(
            enc(map),
            vec![0xa3, 0x01, 0x00, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }

    #[test]
    fn duplicate_map_keys_rejected() {
        let map = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        assert!(matches!(
            to_canonical_cbor(&map),
            Err(CodecError::EncodingFailed { .. })
        ));
    }
}
