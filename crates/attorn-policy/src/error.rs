//! Policy evaluation errors.

use thiserror::Error;

/// Errors from the policy decision point.
///
/// A failed condition never surfaces here: the affected decision is dropped
/// and the combinator carries on without it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A data source could not supply its attributes.
    #[error("data source {source_id} failed: {reason}")]
    DataSource {
        /// The failing source.
        source_id: String,
        /// What went wrong.
        reason: String,
    },

    /// A condition could not be evaluated.
    #[error("condition failed: {reason}")]
    Condition {
        /// What went wrong.
        reason: String,
    },

    /// A required attribute is absent after enrichment.
    #[error("required attribute missing: {name}")]
    MissingAttribute {
        /// The attribute.
        name: String,
    },

    /// An enforcement handler rejected the decision.
    #[error("enforcement handler {handler_id} failed: {reason}")]
    Enforcement {
        /// The failing handler.
        handler_id: String,
        /// What went wrong.
        reason: String,
    },

    /// A policy definition is unusable.
    #[error("invalid policy {policy_id}: {reason}")]
    InvalidPolicy {
        /// The policy.
        policy_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A collaborator has no implementation wired in.
    #[error("not implemented: {0}")]
    Unimplemented(String),
}

impl PolicyError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataSource { .. } => "data_source_failed",
            Self::Condition { .. } => "condition_failed",
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::Enforcement { .. } => "enforcement_failed",
            Self::InvalidPolicy { .. } => "invalid_policy",
            Self::Unimplemented(_) => "unimplemented",
        }
    }

    pub(crate) fn condition(reason: impl Into<String>) -> Self {
        Self::Condition {
            reason: reason.into(),
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
