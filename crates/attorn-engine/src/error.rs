//! Engine error types.

use attorn_compliance::ComplianceError;
use attorn_config::ConfigError;
use attorn_core::CoreError;
use attorn_crypto::CryptoError;
use attorn_delegation::DelegationError;
use attorn_distributed::DistributedError;
use attorn_policy::PolicyError;
use attorn_tokens::{TokenError, ValidationError};
use thiserror::Error;

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration was rejected at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Key material could not be loaded.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A shared identifier was malformed.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// The token failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Token issuance or storage failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Cached validation or revocation failed.
    #[error(transparent)]
    Distributed(#[from] DistributedError),

    /// The delegation graph refused the operation.
    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// Policy evaluation failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The action breaks a compliance rule.
    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    /// The policy decision point denied the request.
    #[error("access denied to {subject} for {action} on {resource}")]
    Denied {
        /// Who acted.
        subject: String,
        /// On what.
        resource: String,
        /// Doing what.
        action: String,
        /// Policy that decided, if any.
        policy_id: Option<String>,
        /// Rule that decided, if any.
        rule_id: Option<String>,
    },

    /// The token was issued under a delegation that is no longer active.
    #[error("delegation {delegation_id} is not active")]
    DelegationInactive {
        /// The delegation.
        delegation_id: String,
    },

    /// The token holder is not the delegate of its delegation.
    #[error("token subject {subject} is not the delegate of {delegation_id}")]
    DelegateMismatch {
        /// The delegation.
        delegation_id: String,
        /// Subject of the token.
        subject: String,
    },

    /// The action is outside the delegated scope.
    #[error("action {action} is outside the scope of delegation {delegation_id}")]
    OutOfScope {
        /// The delegation.
        delegation_id: String,
        /// The action attempted.
        action: String,
    },

    /// The subject exceeded its request rate.
    #[error("rate limit exceeded for {subject}")]
    RateLimited {
        /// Who was throttled.
        subject: String,
    },

    /// The operation ran past its deadline.
    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        /// Operation name.
        operation: &'static str,
        /// The budget that was exceeded.
        timeout_secs: u64,
    },

    /// The engine is shutting down and admits no new requests.
    #[error("engine is shutting down")]
    ShuttingDown,

    /// Some tokens of a revoked delegation could not be revoked.
    #[error("delegation {delegation_id} revoked, but {} of its tokens were not", .failed.len())]
    CascadeIncomplete {
        /// The delegation.
        delegation_id: String,
        /// IDs of tokens that are still live.
        failed: Vec<String>,
    },
}

impl EngineError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Config(_) => "config_error",
            Self::Crypto(_) => "crypto_error",
            Self::Core(_) => "invalid_identifier",
            Self::Validation(e) => e.code(),
            Self::Token(e) => e.code(),
            Self::Distributed(e) => e.code(),
            Self::Delegation(e) => e.code(),
            Self::Policy(e) => e.code(),
            Self::Compliance(e) => e.violation_type(),
            Self::Denied { .. } => "access_denied",
            Self::DelegationInactive { .. } => "delegation_inactive",
            Self::DelegateMismatch { .. } => "delegate_mismatch",
            Self::OutOfScope { .. } => "out_of_scope",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::ShuttingDown => "shutting_down",
            Self::CascadeIncomplete { .. } => "cascade_incomplete",
        }
    }

    /// Whether the request was refused, as opposed to failing.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Denied { .. }
                | Self::DelegationInactive { .. }
                | Self::DelegateMismatch { .. }
                | Self::OutOfScope { .. }
                | Self::Compliance(_)
                | Self::RateLimited { .. }
                | Self::Distributed(
                    DistributedError::Validation(_) | DistributedError::Rejected { .. }
                )
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let denied = EngineError::Denied {
            subject: "agent".into(),
            resource: "account".into(),
            action: "transfer".into(),
            policy_id: Some("p".into()),
            rule_id: None,
        };
        assert_eq!(denied.code(), "access_denied");
        assert!(denied.is_denial());

        let timeout = EngineError::Timeout {
            operation: "authorize",
            timeout_secs: 30,
        };
        assert_eq!(timeout.to_string(), "authorize timed out after 30s");
        assert!(!timeout.is_denial());

        let cascade = EngineError::CascadeIncomplete {
            delegation_id: "del_1".into(),
            failed: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            cascade.to_string(),
            "delegation del_1 revoked, but 2 of its tokens were not"
        );
    }
}
