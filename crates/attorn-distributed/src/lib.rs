//! Attorn Distributed - cached token validation across instances.
//!
//! This crate provides:
//! - [`DistributedValidator`]: a local tier, a shared tier, then an
//!   authoritative [`TokenAuthenticator`]
//! - Short-lived negative caching bound to the exact token value
//! - Multi-tier revocation that reports partial failure
//! - A revocation feed peers follow to evict their local entries
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use attorn_crypto::{KeyPair, Verifier};
//! use attorn_distributed::{
//!     DistributedConfig, DistributedValidator, KvSharedCache, StoreAuthenticator,
//! };
//! use attorn_storage::MemoryKvStore;
//! use attorn_tokens::{
//!     MemoryTokenStore, RevocationList, TokenIssuer, TokenRequest, TokenStore,
//!     ValidationConfig, ValidationPipeline,
//! };
//!
//! let keys = Arc::new(KeyPair::generate());
//! let issuer = TokenIssuer::new(keys.clone(), "https://issuer.example");
//! let verifier: Arc<dyn Verifier> = keys;
//! let pipeline = ValidationPipeline::new(
//!     ValidationConfig::default(),
//!     Some(verifier),
//!     Arc::new(RevocationList::new()),
//! )
//! .unwrap();
//! let store = Arc::new(MemoryTokenStore::new());
//! let validator = DistributedValidator::new(
//!     Arc::new(StoreAuthenticator::new(pipeline, store.clone())),
//!     Arc::new(KvSharedCache::new(Arc::new(MemoryKvStore::new()))),
//!     DistributedConfig::default(),
//! );
//!
//! let token = issuer.issue(TokenRequest::access("agent-7")).unwrap();
//! store.save(token.id.as_str(), token.clone()).await.unwrap();
//! let record = validator.validate_token(&token.value).await.unwrap();
//! assert_eq!(record.subject, "agent-7");
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod authenticator;
mod error;
mod local;
mod record;
mod shared;
mod validator;

pub use authenticator::{DISTRIBUTED_REVOKER, StoreAuthenticator, TokenAuthenticator};
pub use error::{DistributedError, DistributedResult, RevocationStep};
pub use local::{DEFAULT_LOCAL_CAPACITY, LocalCache, RevokedIds};
pub use record::{ValidationRecord, value_hash};
pub use shared::{KvSharedCache, SHARED_CACHE_NAMESPACE, SharedCache};
pub use validator::{DistributedConfig, DistributedValidator, MAX_NEGATIVE_TTL};
