//! Token error types.
//!
//! Every variant maps to a stable string code via `code()` so callers (and
//! the shared cache) can branch on the failure kind without matching on
//! messages.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::validation::ValidationStage;

/// Errors from the validation pipeline. Each stage has its own variants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The signed value could not be parsed.
    #[error("malformed token: {reason}")]
    Malformed {
        /// What was wrong with the encoding.
        reason: String,
    },

    /// The signature did not verify.
    #[error("invalid token signature: {token_id}")]
    InvalidSignature {
        /// The token whose signature failed.
        token_id: String,
    },

    /// The signed claims disagree with the token's fields.
    #[error("invalid token claims: {reason}")]
    InvalidClaims {
        /// Which claim disagreed.
        reason: String,
    },

    /// The token is past its expiry (beyond the allowed skew).
    #[error("token expired at {expired_at}: {token_id}")]
    Expired {
        /// The expired token.
        token_id: String,
        /// When it expired.
        expired_at: DateTime<Utc>,
    },

    /// The token's not-before time has not been reached (beyond the skew).
    #[error("token not valid before {not_before}: {token_id}")]
    NotYetValid {
        /// The premature token.
        token_id: String,
        /// When it becomes valid.
        not_before: DateTime<Utc>,
    },

    /// The issuer is not on the allow-list.
    #[error("issuer not allowed: {issuer}")]
    InvalidIssuer {
        /// The rejected issuer.
        issuer: String,
    },

    /// No audience of the token is on the allow-list.
    #[error("audience not allowed: {audience:?}")]
    InvalidAudience {
        /// The token's audiences.
        audience: Vec<String>,
    },

    /// Required scopes are missing.
    #[error("insufficient scope, missing: {missing:?}")]
    InsufficientScope {
        /// The scopes the token lacks.
        missing: Vec<String>,
    },

    /// The token carries a revocation status.
    #[error("token revoked: {token_id}")]
    Revoked {
        /// The revoked token.
        token_id: String,
    },

    /// The token ID is on the revocation list.
    #[error("token blacklisted: {token_id}")]
    Blacklisted {
        /// The blacklisted token.
        token_id: String,
    },

    /// A required custom claim is absent.
    #[error("missing required claim: {claim}")]
    MissingClaim {
        /// The claim name.
        claim: String,
    },

    /// A custom claim has a disallowed value.
    #[error("claim {claim} has disallowed value {actual}")]
    ClaimMismatch {
        /// The claim name.
        claim: String,
        /// The offending value.
        actual: String,
    },
}

impl ValidationError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::InvalidClaims { .. } => "invalid_claims",
            Self::Expired { .. } => "expired",
            Self::NotYetValid { .. } => "not_yet_valid",
            Self::InvalidIssuer { .. } => "invalid_issuer",
            Self::InvalidAudience { .. } => "invalid_audience",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::Revoked { .. } => "revoked",
            Self::Blacklisted { .. } => "blacklisted",
            Self::MissingClaim { .. } => "missing_claim",
            Self::ClaimMismatch { .. } => "invalid_claim",
        }
    }

    /// The pipeline stage that produced this error.
    #[must_use]
    pub fn stage(&self) -> ValidationStage {
        match self {
            Self::Malformed { .. } | Self::InvalidSignature { .. } | Self::InvalidClaims { .. } => {
                ValidationStage::Signature
            },
            Self::Expired { .. } => ValidationStage::Expiry,
            Self::NotYetValid { .. } => ValidationStage::NotBefore,
            Self::InvalidIssuer { .. } => ValidationStage::Issuer,
            Self::InvalidAudience { .. } => ValidationStage::Audience,
            Self::InsufficientScope { .. } => ValidationStage::Scopes,
            Self::Revoked { .. } | Self::Blacklisted { .. } => ValidationStage::Revocation,
            Self::MissingClaim { .. } | Self::ClaimMismatch { .. } => ValidationStage::Claims,
        }
    }
}

/// Errors from token issuance and token stores.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token stored under the key.
    #[error("token not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The presented value differs from the stored copy (forged or stale).
    #[error("token does not match stored copy: {token_id}")]
    Mismatch {
        /// The token ID.
        token_id: String,
    },

    /// The stored token is revoked.
    #[error("token revoked: {token_id}")]
    Revoked {
        /// The token ID.
        token_id: String,
    },

    /// The stored token has expired.
    #[error("token expired: {token_id}")]
    Expired {
        /// The token ID.
        token_id: String,
    },

    /// The stored token is not yet valid.
    #[error("token not yet valid: {token_id}")]
    NotYetValid {
        /// The token ID.
        token_id: String,
    },

    /// A token already exists under the target key.
    #[error("token already exists: {key}")]
    Conflict {
        /// The occupied key.
        key: String,
    },

    /// The token has the wrong type for the operation.
    #[error("wrong token type: expected {expected}, got {actual}")]
    WrongType {
        /// Required type.
        expected: String,
        /// Presented type.
        actual: String,
    },

    /// Issuance request was invalid.
    #[error("invalid token request: {0}")]
    InvalidRequest(String),

    /// Components were wired with an unusable configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The wire value could not be decoded or verified.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] attorn_storage::StorageError),

    /// Signing or sealing error.
    #[error("crypto error: {0}")]
    Crypto(#[from] attorn_crypto::CryptoError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TokenError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Mismatch { .. } => "token_mismatch",
            Self::Revoked { .. } => "revoked",
            Self::Expired { .. } => "expired",
            Self::NotYetValid { .. } => "not_yet_valid",
            Self::Conflict { .. } => "conflict",
            Self::WrongType { .. } => "wrong_type",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
            Self::Validation(inner) => inner.code(),
            Self::Storage(_) => "storage",
            Self::Crypto(_) => "crypto",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;
