//! The sign/verify contract.
//!
//! Everything that signs (token issuance, attestations) depends on these two
//! traits rather than on a concrete key type, so deployments can plug in an
//! HSM or remote signer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CryptoResult;

/// Signature algorithm identifiers as they appear in token headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Ed25519.
    EdDSA,
    /// ECDSA over P-256 with SHA-256.
    ES256,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
    /// RSASSA-PSS with SHA-256.
    PS256,
    /// HMAC with SHA-256.
    HS256,
}

impl Algorithm {
    /// Header name of the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EdDSA => "EdDSA",
            Self::ES256 => "ES256",
            Self::RS256 => "RS256",
            Self::PS256 => "PS256",
            Self::HS256 => "HS256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces signatures over arbitrary bytes.
pub trait Signer: Send + Sync + fmt::Debug {
    /// Algorithm of the produced signatures.
    fn algorithm(&self) -> Algorithm;

    /// Identifier of the signing key, written into token headers.
    fn key_id(&self) -> String;

    /// Sign `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing key cannot sign.
    fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Checks signatures over arbitrary bytes.
pub trait Verifier: Send + Sync + fmt::Debug {
    /// Whether `signature` is a valid signature of `message`.
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}
