//! Authenticated encryption for records at rest.
//!
//! Sealed layout: `nonce (12 bytes) || ciphertext+tag`. A fresh random nonce
//! is drawn for every seal.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// A symmetric key for sealing stored records. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey([u8; KEY_LEN]);

impl SealingKey {
    /// Generate a random key.
    #[must_use]
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(key.as_slice());
        Self(bytes)
    }

    /// Wrap 32 key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for any other length.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt `plaintext`, binding `associated` (typically the storage key)
    /// so a sealed record cannot be replayed under another key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SealingFailed`] if encryption fails.
    pub fn seal(&self, plaintext: &[u8], associated: &[u8]) -> CryptoResult<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(
                &nonce,
                chacha20poly1305::aead::Payload {
                    msg: plaintext,
                    aad: associated,
                },
            )
            .map_err(|e| CryptoError::SealingFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a value produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SealingFailed`] if the input is truncated, was
    /// sealed under a different key or associated data, or was tampered with.
    pub fn open(&self, sealed: &[u8], associated: &[u8]) -> CryptoResult<Vec<u8>> {
        let (nonce, ciphertext) = sealed
            .split_at_checked(NONCE_LEN)
            .ok_or_else(|| CryptoError::SealingFailed("sealed record truncated".into()))?;
        self.cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                chacha20poly1305::aead::Payload {
                    msg: ciphertext,
                    aad: associated,
                },
            )
            .map_err(|_| CryptoError::SealingFailed("authentication failed".into()))
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let key = SealingKey::generate();
        let sealed = key.seal(b"token record", b"tokens/abc").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"token record");
        assert_eq!(key.open(&sealed, b"tokens/abc").unwrap(), b"token record");
    }

    #[test]
    fn test_associated_data_is_bound() {
        let key = SealingKey::generate();
        let sealed = key.seal(b"record", b"tokens/a").unwrap();
        assert!(key.open(&sealed, b"tokens/b").is_err());
    }

    #[test]
    fn test_wrong_key_and_tampering_rejected() {
        let key = SealingKey::generate();
        let mut sealed = key.seal(b"record", b"k").unwrap();
        assert!(SealingKey::generate().open(&sealed, b"k").is_err());

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(key.open(&sealed, b"k").is_err());
        assert!(key.open(&sealed[..5], b"k").is_err());
    }

    #[test]
    fn test_nonces_differ() {
        let key = SealingKey::generate();
        let a = key.seal(b"same", b"").unwrap();
        let b = key.seal(b"same", b"").unwrap();
        assert_ne!(a, b);
    }
}
