//! Attorn Crypto - Signing and sealing primitives for the delegation engine.
//!
//! This crate provides:
//! - The [`Signer`] / [`Verifier`] contract every signed artifact goes through
//! - Ed25519 key pairs and public keys implementing that contract
//! - Domain-separated BLAKE3 digests, used to bind cache entries to values
//! - [`SealingKey`] for encrypting records at rest (ChaCha20-Poly1305)
//!
//! Token and attestation code never touches key material directly; it is
//! handed an `Arc<dyn Signer>` or `Arc<dyn Verifier>`.
//!
//! # Example
//!
//! ```
//! use attorn_crypto::{KeyPair, Signer, Verifier};
//!
//! let keypair = KeyPair::generate();
//! let signature = Signer::sign(&keypair, b"grant").unwrap();
//!
//! let public = keypair.export_public_key();
//! assert!(public.verify(b"grant", &signature));
//! assert!(!public.verify(b"forged", &signature));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod keypair;
mod sealing;
mod signer;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::{KeyPair, PublicKey};
pub use sealing::SealingKey;
pub use signer::{Algorithm, Signer, Verifier};
