//! Value encryption using AES-256-GCM.
//!
//! Encryption is optional and enabled by the `encryption` feature (on by
//! default). Without it, [`EncryptionKey`] cannot be constructed: every
//! constructor returns [`CoreError::Configuration`](crate::CoreError::Configuration).
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - Fresh random nonce per value
//! - Keys are zeroized on drop
//! - Password-derived keys use HKDF-SHA256
//!
//! ## Usage
//!
//! ```ignore
//! use tristore_core::crypto::{CryptoManager, EncryptionKey};
//!
//! let key = EncryptionKey::generate();
//! let manager = CryptoManager::new(&key);
//!
//! let ciphertext = manager.encrypt(b"secret data")?;
//! let plaintext = manager.decrypt(&ciphertext)?;
//! ```

#[cfg(feature = "encryption")]
mod encrypted;

#[cfg(feature = "encryption")]
pub use encrypted::*;

/// Module contents when the encryption feature is disabled.
#[cfg(not(feature = "encryption"))]
mod stub {
    use crate::error::{CoreError, CoreResult};
    use std::convert::Infallible;

    fn not_enabled() -> CoreError {
        CoreError::configuration("encryption requested but the `encryption` feature is disabled")
    }

    /// Encryption key (cannot be constructed when encryption is disabled).
    #[derive(Debug, Clone)]
    pub struct EncryptionKey {
        never: Infallible,
    }

    impl EncryptionKey {
        /// Always returns an error when encryption is disabled.
        pub fn from_bytes(_bytes: &[u8]) -> CoreResult<Self> {
            Err(not_enabled())
        }

        /// Always returns an error when encryption is disabled.
        pub fn derive_from_password(_password: &[u8], _salt: &[u8]) -> CoreResult<Self> {
            Err(not_enabled())
        }
    }

    /// Crypto manager (uninhabited when encryption is disabled).
    #[derive(Debug)]
    pub struct CryptoManager {
        never: Infallible,
    }

    impl CryptoManager {
        /// Unreachable: no key exists to call this with.
        pub fn new(key: &EncryptionKey) -> Self {
            match key.never {}
        }

        /// Unreachable: no manager exists.
        pub fn encrypt(&self, _plaintext: &[u8]) -> CoreResult<Vec<u8>> {
            match self.never {}
        }

        /// Unreachable: no manager exists.
        pub fn decrypt(&self, _ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
            match self.never {}
        }
    }
}

#[cfg(not(feature = "encryption"))]
pub use stub::*;
