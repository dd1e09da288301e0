//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_crypto::prelude::*;` to import all essential types.

pub use crate::{
    Algorithm, ContentHash, CryptoError, CryptoResult, KeyPair, PublicKey, SealingKey, Signer,
    Verifier,
};
