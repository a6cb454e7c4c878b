//! AES-256-GCM implementation.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Symmetric key for value encryption. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] unless `bytes` is exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_argument(format!(
                "invalid key size: expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// HKDF does not stretch low-entropy input; use a high-entropy
    /// passphrase and a random salt stored next to the data.
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), password);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"tristore-value-key-v1", &mut bytes)
            .map_err(|_| CoreError::encryption_failed("HKDF expand failed"))?;
        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts stored values.
///
/// Output format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct CryptoManager {
    cipher: Aes256Gcm,
}

impl CryptoManager {
    /// Creates a crypto manager for `key`.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::encryption_failed("AES-GCM encryption error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(out)
    }

    /// Decrypts data produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptData`] for a wrong key, tampered bytes or
    /// input too short to hold a nonce and tag.
    pub fn decrypt(&self, ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::corrupt_data("ciphertext too short"));
        }
        let (nonce, encrypted) = ciphertext.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), encrypted)
            .map_err(|_| CoreError::corrupt_data("decryption failed: wrong key or tampered value"))
    }
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(
            EncryptionKey::generate().as_bytes(),
            EncryptionKey::generate().as_bytes()
        );
    }

    #[test]
    fn key_size_checked() {
        assert!(EncryptionKey::from_bytes(&[7u8; KEY_SIZE]).is_ok());
        assert!(matches!(
            EncryptionKey::from_bytes(&[0u8; 16]),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn password_derivation_is_deterministic() {
        let a = EncryptionKey::derive_from_password(b"correct horse", b"salt-1").unwrap();
        let b = EncryptionKey::derive_from_password(b"correct horse", b"salt-1").unwrap();
        let c = EncryptionKey::derive_from_password(b"correct horse", b"salt-2").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn round_trip_with_fresh_nonces() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let first = manager.encrypt(b"reading").unwrap();
        let second = manager.encrypt(b"reading").unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), NONCE_SIZE + 7 + TAG_SIZE);
        assert_eq!(manager.decrypt(&first).unwrap(), b"reading");
    }

    #[test]
    fn wrong_key_or_tampering_is_corrupt_data() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let other = CryptoManager::new(&EncryptionKey::generate());
        let mut ciphertext = manager.encrypt(b"secret").unwrap();

        assert!(matches!(
            other.decrypt(&ciphertext),
            Err(CoreError::CorruptData { .. })
        ));
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(matches!(
            manager.decrypt(&ciphertext),
            Err(CoreError::CorruptData { .. })
        ));
        assert!(matches!(
            manager.decrypt(&[0u8; 10]),
            Err(CoreError::CorruptData { .. })
        ));
    }
}
