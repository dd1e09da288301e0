//! Ed25519 key pairs.

use std::path::Path;

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::signer::{Algorithm, Signer, Verifier};

/// Length of an Ed25519 signature in bytes.
const SIGNATURE_LEN: usize = 64;

/// An Ed25519 key pair. The secret half is zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)]
    verifying_key: VerifyingKey,
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            verifying_key: signing_key.verifying_key(),
            signing_key,
        }
    }

    /// Rebuild from a 32-byte secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for any other length.
    pub fn from_secret_key(bytes: &[u8]) -> CryptoResult<Self> {
        let mut secret = <[u8; 32]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();
        Ok(Self {
            verifying_key: signing_key.verifying_key(),
            signing_key,
        })
    }

    /// Load a signing key from a file holding the raw 32-byte secret.
    ///
    /// Symlinks are refused and the read buffer is zeroized. A missing file
    /// is an error; keys are provisioned outside the engine.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] if the file cannot be read or is a
    /// symlink, and [`CryptoError::InvalidKeyLength`] for a wrong size.
    pub fn load_from_file(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let meta = std::fs::symlink_metadata(path)
            .map_err(|e| CryptoError::IoError(format!("{}: {e}", path.display())))?;
        if meta.file_type().is_symlink() {
            return Err(CryptoError::IoError(format!(
                "{}: refusing to read key file through a symlink",
                path.display()
            )));
        }
        let bytes = Zeroizing::new(
            std::fs::read(path)
                .map_err(|e| CryptoError::IoError(format!("{}: {e}", path.display())))?,
        );
        Self::from_secret_key(&bytes)
    }

    /// Raw public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> &[u8; 32] {
        self.verifying_key.as_bytes()
    }

    /// Hex key ID (first 8 bytes of the public key).
    #[must_use]
    pub fn key_id_hex(&self) -> String {
        hex::encode(&self.public_key_bytes()[..8])
    }

    /// The shareable half of the pair.
    #[must_use]
    pub fn export_public_key(&self) -> PublicKey {
        PublicKey(*self.public_key_bytes())
    }

    /// Secret key bytes, for writing to secure storage.
    #[must_use]
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl Signer for KeyPair {
    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }

    fn key_id(&self) -> String {
        self.key_id_hex()
    }

    fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

impl Verifier for KeyPair {
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.export_public_key().verify(message, signature)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id_hex())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Hex key ID (first 8 bytes).
    #[must_use]
    pub fn key_id_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Verifier for PublicKey {
    /// Strict Ed25519 verification. Malformed keys and signatures of the
    /// wrong length never verify.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
            return false;
        };
        VerifyingKey::from_bytes(&self.0)
            .and_then(|key| key.verify_strict(message, &Signature::from_bytes(&bytes)))
            .is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.key_id_hex())
    }
}
