//! Attorn Tokens - signed, time-bounded grants of delegated authority.
//!
//! This crate provides:
//! - The canonical [`Token`] model with power-of-attorney metadata
//! - A compact signed-claims wire format ([`wire`])
//! - [`TokenIssuer`] for minting access, refresh and id tokens
//! - The [`TokenStore`] contract with in-memory and key-value backends,
//!   the latter optionally sealed at rest
//! - The ordered [`ValidationPipeline`] and a [`RevocationList`]
//! - A background [`CleanupWorker`] that evicts expired tokens
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use attorn_crypto::KeyPair;
//! use attorn_tokens::{MemoryTokenStore, TokenIssuer, TokenRequest, TokenStore};
//!
//! let issuer = TokenIssuer::new(Arc::new(KeyPair::generate()), "https://issuer.example");
//! let token = issuer
//!     .issue(TokenRequest::access("agent-7").scope("payments:initiate"))
//!     .unwrap();
//!
//! let store = MemoryTokenStore::new();
//! store.save(token.id.as_str(), token.clone()).await.unwrap();
//! assert!(store.validate(&token).await.is_ok());
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod cleanup;
mod error;
mod filter;
mod issuer;
mod revocation;
mod store;
mod token;
mod validation;
pub mod wire;

pub use cleanup::CleanupWorker;
pub use error::{TokenError, TokenResult, ValidationError};
pub use filter::{ScopeMatch, TokenFilter};
pub use issuer::{TokenIssuer, TokenPair, TokenRequest};
pub use revocation::{RevocationCheck, RevocationList};
pub use store::{KvTokenStore, MemoryTokenStore, TokenStore};
pub use token::{
    DELEGATION_LABEL, PowerOfAttorney, RevocationStatus, Token, TokenMetadata, TokenType,
};
pub use validation::{
    ClaimRequirement, ClaimRule, DEFAULT_CLOCK_SKEW, ValidationConfig, ValidationPipeline,
    ValidationStage,
};
pub use wire::Claims;
