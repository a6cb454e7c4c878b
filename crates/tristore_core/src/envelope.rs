//! Value serialization and encryption envelope.

use crate::crypto::{CryptoManager, EncryptionKey};
use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::sync::Arc;
use tristore_codec::{from_cbor, to_canonical_cbor, Value};

/// Converts values to bytes and back.
///
/// Implementations must round-trip every value they accept:
/// `load(dump(v)) == v`.
pub trait ValueSerializer: Send + Sync + fmt::Debug {
    /// Short format name used in logs.
    fn name(&self) -> &'static str;

    /// Serializes a value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for values the format cannot hold.
    fn dump(&self, value: &Value) -> CoreResult<Vec<u8>>;

    /// Deserializes stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptData`] if the bytes are not a valid value.
    fn load(&self, bytes: &[u8]) -> CoreResult<Value>;
}

/// Canonical CBOR, the default format. Holds every [`Value`] except NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborSerializer;

impl ValueSerializer for CborSerializer {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn dump(&self, value: &Value) -> CoreResult<Vec<u8>> {
        to_canonical_cbor(value)
            .map_err(|e| CoreError::invalid_argument(format!("value not storable as CBOR: {e}")))
    }

    fn load(&self, bytes: &[u8]) -> CoreResult<Value> {
        from_cbor(bytes).map_err(|e| CoreError::corrupt_data(format!("stored CBOR invalid: {e}")))
    }
}

/// JSON text, for stores other tools read directly.
///
/// JSON has no byte strings and no non-finite numbers: `Bytes` read back as
/// an array of integers, and non-finite floats are rejected. Map keys must
/// be text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

fn has_non_finite(value: &Value) -> bool {
    match value {
        Value::Float(f) => !f.is_finite(),
        Value::Array(items) => items.iter().any(has_non_finite),
        Value::Map(pairs) => pairs
            .iter()
            .any(|(k, v)| has_non_finite(k) || has_non_finite(v)),
        _ => false,
    }
}

impl ValueSerializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn dump(&self, value: &Value) -> CoreResult<Vec<u8>> {
        if has_non_finite(value) {
            return Err(CoreError::invalid_argument(
                "JSON cannot hold NaN or infinite floats",
            ));
        }
        serde_json::to_vec(value)
            .map_err(|e| CoreError::invalid_argument(format!("value not storable as JSON: {e}")))
    }

    fn load(&self, bytes: &[u8]) -> CoreResult<Value> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoreError::corrupt_data(format!("stored JSON invalid: {e}")))
    }
}

/// Serializes values, then encrypts them when a key is configured.
pub struct ValueEnvelope {
    serializer: Arc<dyn ValueSerializer>,
    crypto: Option<CryptoManager>,
}

impl ValueEnvelope {
    /// Creates an envelope. Values are encrypted iff `key` is given.
    pub fn new(serializer: Arc<dyn ValueSerializer>, key: Option<&EncryptionKey>) -> Self {
        Self {
            serializer,
            crypto: key.map(CryptoManager::new),
        }
    }

    /// Returns `true` if a key is configured.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.crypto.is_some()
    }

    /// Returns the serializer in use.
    #[must_use]
    pub fn serializer(&self) -> &dyn ValueSerializer {
        self.serializer.as_ref()
    }

    /// Serializes `value`, encrypting it if `encrypt` is set and a key is configured.
    pub fn to_store(&self, value: &Value, encrypt: bool) -> CoreResult<Vec<u8>> {
        let bytes = self.serializer.dump(value)?;
        match &self.crypto {
            Some(crypto) if encrypt => crypto.encrypt(&bytes),
            _ => Ok(bytes),
        }
    }

    /// Inverse of [`to_store`](Self::to_store).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptData`] if decryption or decoding fails.
    pub fn from_store(&self, bytes: &[u8], decrypt: bool) -> CoreResult<Value> {
        match &self.crypto {
            Some(crypto) if decrypt => self.serializer.load(&crypto.decrypt(bytes)?),
            _ => self.serializer.load(bytes),
        }
    }
}

impl fmt::Debug for ValueEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueEnvelope")
            .field("serializer", &self.serializer.name())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::map(vec![
            (Value::from("string"), Value::from("Some str")),
            (Value::from("int"), Value::from(-12)),
            (Value::from("float"), Value::from(2.5)),
            (
                Value::from("list"),
                Value::from(vec![Value::from(true), Value::Null]),
            ),
        ])
    }

    #[test]
    fn plain_round_trip_for_both_formats() {
        let serializers: [Arc<dyn ValueSerializer>; 2] =
            [Arc::new(CborSerializer), Arc::new(JsonSerializer)];
        for serializer in serializers {
            let envelope = ValueEnvelope::new(serializer, None);
            let bytes = envelope.to_store(&sample(), true).unwrap();
            assert_eq!(envelope.from_store(&bytes, true).unwrap(), sample());
        }
    }

    #[test]
    fn json_is_readable_text() {
        let envelope = ValueEnvelope::new(Arc::new(JsonSerializer), None);
        let bytes = envelope.to_store(&Value::from(vec![Value::from(1)]), true).unwrap();
        assert_eq!(bytes, b"[1]");
    }

    #[test]
    fn unstorable_values_rejected() {
        assert!(matches!(
            CborSerializer.dump(&Value::Float(f64::NAN)),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            JsonSerializer.dump(&Value::from(vec![Value::Float(f64::INFINITY)])),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn garbage_is_corrupt_data() {
        assert!(matches!(
            CborSerializer.load(&[0xff, 0x00]),
            Err(CoreError::CorruptData { .. })
        ));
        assert!(matches!(
            JsonSerializer.load(b"{nope"),
            Err(CoreError::CorruptData { .. })
        ));
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn encrypted_round_trip_and_bypass() {
        let key = EncryptionKey::generate();
        let envelope = ValueEnvelope::new(Arc::new(CborSerializer), Some(&key));
        assert!(envelope.is_encrypted());

        let sealed = envelope.to_store(&sample(), true).unwrap();
        assert_ne!(sealed, CborSerializer.dump(&sample()).unwrap());
        assert_eq!(envelope.from_store(&sealed, true).unwrap(), sample());

        let plain = envelope.to_store(&sample(), false).unwrap();
        assert_eq!(plain, CborSerializer.dump(&sample()).unwrap());
        assert_eq!(envelope.from_store(&plain, false).unwrap(), sample());
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn wrong_key_is_corrupt_data() {
        let sealed = ValueEnvelope::new(Arc::new(CborSerializer), Some(&EncryptionKey::generate()))
            .to_store(&sample(), true)
            .unwrap();
        let other = ValueEnvelope::new(Arc::new(CborSerializer), Some(&EncryptionKey::generate()));
        assert!(matches!(
            other.from_store(&sealed, true),
            Err(CoreError::CorruptData { .. })
        ));
    }
}
