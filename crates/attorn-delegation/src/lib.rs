//! Attorn Delegation - the graph of who may act for whom.
//!
//! This crate provides:
//! - [`Delegation`] records with bounded [`ValidityPeriod`]s
//! - [`DelegationManager`], which keeps the graph acyclic and depth-bounded
//! - [`AttestationService`] for multi-party signed attestations
//! - The [`RegistryVerifier`] seam for confirming a principal's standing
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use attorn_core::PowerType;
//! use attorn_crypto::KeyPair;
//! use attorn_delegation::{
//!     AttestationRequirement, AttestationService, Delegation, DelegationManager,
//!     ValidityPeriod,
//! };
//! use chrono::{Duration, Utc};
//!
//! let key = Arc::new(KeyPair::generate());
//! let attestations = Arc::new(AttestationService::new(key.clone(), key));
//! let manager = DelegationManager::default().with_attestation_service(Arc::clone(&attestations));
//!
//! let attested = attestations
//!     .process_requirement(&AttestationRequirement::new("notary_public", "enhanced", ["notary-1"]))
//!     .await
//!     .unwrap();
//!
//! let grant = Delegation::new(
//!     "alice",
//!     "agent-7",
//!     PowerType::financial_transactions(),
//!     ValidityPeriod::starting(Utc::now(), Duration::days(30)),
//! )
//! .with_attestations(attested.into_iter().map(|a| a.id));
//!
//! let stored = manager.store_delegation(grant).await.unwrap();
//! assert!(stored.is_active());
//! assert_eq!(manager.chain_for("agent-7").await.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod attestation;
mod error;
mod manager;
mod model;
mod registry;

pub use attestation::{AttestationRequirement, AttestationService};
pub use error::{DelegationError, DelegationResult};
pub use manager::{DEFAULT_MAX_CHAIN_DEPTH, DelegationConfig, DelegationManager};
pub use model::{
    Attestation, AttestationLevel, AttestationStatus, AttesterType, Delegation, DelegationStatus,
    MAX_START_AHEAD, MAX_VALIDITY, ValidityPeriod,
};
pub use registry::{OwnerInfo, RegistryError, RegistryVerifier, StaticRegistry, UnimplementedRegistry};
