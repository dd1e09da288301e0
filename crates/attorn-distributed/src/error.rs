//! Distributed validation errors.

use std::fmt;

use attorn_tokens::{TokenError, ValidationError};
use thiserror::Error;

/// A step of a multi-tier revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevocationStep {
    /// The in-process cache.
    LocalCache,
    /// The shared cache.
    SharedCache,
    /// The base authenticator.
    Base,
}

impl fmt::Display for RevocationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalCache => "local_cache",
            Self::SharedCache => "shared_cache",
            Self::Base => "base",
        })
    }
}

/// Errors from the distributed validator.
#[derive(Debug, Error)]
pub enum DistributedError {
    /// The token value could not be read.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The base authenticator rejected the token or failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A cached rejection, still within its negative TTL.
    #[error("token {token_id} rejected ({code}), cached")]
    Rejected {
        /// The token.
        token_id: String,
        /// Validation code of the original rejection.
        code: String,
    },

    /// The shared cache failed.
    #[error("shared cache error: {0}")]
    Cache(String),

    /// Some revocation steps failed. Retrying is safe.
    #[error("partial revocation of {token_id}: failed {}", .failed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    PartialRevocation {
        /// The token.
        token_id: String,
        /// Steps that failed.
        failed: Vec<RevocationStep>,
    },
}

impl DistributedError {
    /// Stable machine-readable code. Rejections carry the validation code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Validation(e) => e.code(),
            Self::Token(e) => e.code(),
            Self::Rejected { code, .. } => code,
            Self::Cache(_) => "cache_error",
            Self::PartialRevocation { .. } => "partial_revocation",
        }
    }
}

impl From<attorn_storage::StorageError> for DistributedError {
    fn from(e: attorn_storage::StorageError) -> Self {
        Self::Cache(e.to_string())
    }
}

/// Result type for distributed validation.
pub type DistributedResult<T> = Result<T, DistributedError>;
