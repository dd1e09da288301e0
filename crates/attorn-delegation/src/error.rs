//! Delegation and attestation errors.

use attorn_core::{AttestationId, DelegationId};
use thiserror::Error;

use crate::registry::RegistryError;

/// Errors from the delegation manager and attestation service.
///
/// Write-time errors are raised before anything is stored.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// Principal and delegate are the same identity.
    #[error("self-delegation not allowed: {principal}")]
    SelfDelegation {
        /// The identity on both ends.
        principal: String,
    },

    /// The principal already has the maximum number of active delegations.
    #[error("delegation chain for {principal} already at maximum depth {max}")]
    ChainDepthExceeded {
        /// The principal.
        principal: String,
        /// Configured bound.
        max: usize,
    },

    /// The new edge would make a path longer than the bound.
    #[error("delegation path through {principal} -> {delegate} would exceed depth {max}")]
    ChainTooDeep {
        /// The principal.
        principal: String,
        /// The delegate.
        delegate: String,
        /// Configured bound.
        max: usize,
    },

    /// The delegate already (transitively) delegates to the principal.
    #[error("delegation {principal} -> {delegate} would create a cycle")]
    CycleDetected {
        /// The principal.
        principal: String,
        /// The delegate.
        delegate: String,
    },

    /// The validity period breaks an invariant.
    #[error("invalid validity period: {reason}")]
    InvalidValidityPeriod {
        /// Which invariant failed.
        reason: String,
    },

    /// The delegation carries no attestation.
    #[error("at least one attestation is required")]
    MissingAttestation,

    /// No delegation with this ID.
    #[error("delegation not found: {id}")]
    NotFound {
        /// The missing ID.
        id: DelegationId,
    },

    /// A delegation with this ID is already stored.
    #[error("delegation already exists: {id}")]
    AlreadyExists {
        /// The duplicate ID.
        id: DelegationId,
    },

    /// The delegation exists but `now` is outside its validity period.
    #[error("delegation not currently valid: {id}")]
    NotCurrentlyValid {
        /// The delegation ID.
        id: DelegationId,
    },

    /// Unknown attester type.
    #[error("invalid attester type: {0}")]
    InvalidAttesterType(String),

    /// Unknown attestation level.
    #[error("invalid attestation level: {0}")]
    InvalidAttestationLevel(String),

    /// Fewer attesters than required.
    #[error("insufficient attesters: need {required}, provided {provided}")]
    InsufficientAttesters {
        /// Required count.
        required: usize,
        /// Supplied count.
        provided: usize,
    },

    /// Multi-signature requested but fewer than two attestations result.
    #[error("multi-signature required but only {produced} attestation(s) would be produced")]
    MultiSignatureRequired {
        /// Attestations the request would produce.
        produced: usize,
    },

    /// No attestation with this ID.
    #[error("attestation not found: {id}")]
    AttestationNotFound {
        /// The missing ID.
        id: AttestationId,
    },

    /// The attestation is older than its type allows.
    #[error("attestation expired: {id}")]
    AttestationExpired {
        /// The expired attestation.
        id: AttestationId,
    },

    /// The attestation signature does not verify.
    #[error("attestation signature invalid: {id}")]
    AttestationSignatureInvalid {
        /// The attestation.
        id: AttestationId,
    },

    /// Signing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] attorn_crypto::CryptoError),

    /// The registry rejected the principal.
    #[error("registry verification failed: {0}")]
    Registry(#[from] RegistryError),

    /// A background task failed.
    #[error("internal delegation error: {0}")]
    Internal(String),
}

impl DelegationError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SelfDelegation { .. } => "self_delegation",
            Self::ChainDepthExceeded { .. } | Self::ChainTooDeep { .. } => "depth_exceeded",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::InvalidValidityPeriod { .. } => "invalid_validity_period",
            Self::MissingAttestation => "missing_attestation",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotCurrentlyValid { .. } => "not_currently_valid",
            Self::InvalidAttesterType(_) => "invalid_attester_type",
            Self::InvalidAttestationLevel(_) => "invalid_attestation_level",
            Self::InsufficientAttesters { .. } => "insufficient_attesters",
            Self::MultiSignatureRequired { .. } => "multi_signature_required",
            Self::AttestationNotFound { .. } => "attestation_not_found",
            Self::AttestationExpired { .. } => "attestation_expired",
            Self::AttestationSignatureInvalid { .. } => "attestation_signature_invalid",
            Self::Crypto(_) => "crypto",
            Self::Registry(_) => "registry",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type for delegation operations.
pub type DelegationResult<T> = Result<T, DelegationError>;
