//! Prelude module - commonly used types for convenient import.
//!
//! Use `use attorn_delegation::prelude::*;` to import all essential types.

// Errors
pub use crate::{DelegationError, DelegationResult};

// Graph
pub use crate::{Delegation, DelegationConfig, DelegationManager, DelegationStatus, ValidityPeriod};

// Attestation
pub use crate::{
    Attestation, AttestationLevel, AttestationRequirement, AttestationService, AttesterType,
};

// Registry
pub use crate::{OwnerInfo, RegistryError, RegistryVerifier};
