//! # tristore codec
//!
//! The dynamic [`Value`] type stored by every tristore data model, and the
//! canonical CBOR encoding used as the default binary serialization format.
//!
//! ## Canonical CBOR Rules
//!
//! - Integers use the shortest encoding
//! - Floats are always encoded as 64-bit IEEE 754 (`0xfb`), NaN is rejected
//! - Maps are sorted by encoded key (length-first, then bytewise)
//! - Strings must be UTF-8
//! - No indefinite-length items
//! - A buffer must contain exactly one item
//!
//! ## Usage
//!
//! ```
//! use tristore_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::map(vec![
//!     (Value::from("count"), Value::from(3)),
//!     (Value::from("ratio"), Value::from(0.5)),
//! ]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
#[cfg(feature = "serde")]
mod serde_impl;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder, MAX_BYTES_LENGTH, MAX_CONTAINER_ELEMENTS};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encodes this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decodes a value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
