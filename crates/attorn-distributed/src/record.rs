//! The cached outcome of a validation.

use std::time::Duration;

use attorn_core::TokenId;
use attorn_crypto::ContentHash;
use attorn_tokens::Token;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const VALUE_HASH_DOMAIN: &str = "attorn.token-value";

/// Hash binding a cache entry to the exact token value it was made for.
#[must_use]
pub fn value_hash(value: &str) -> String {
    ContentHash::hash_with_domain(VALUE_HASH_DOMAIN, value.as_bytes()).to_hex()
}

/// What the caches store for a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Token ID.
    pub token_id: TokenId,
    /// Subject.
    pub subject: String,
    /// Scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// When the token expires, or for a rejection, when the record does.
    pub expires_at: DateTime<Utc>,
    /// [`value_hash`] of the validated value.
    pub value_hash: String,
    /// Validation code when the token was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

impl ValidationRecord {
    /// A positive record for a validated token.
    #[must_use]
    pub fn accepted(token: &Token) -> Self {
        Self {
            token_id: token.id.clone(),
            subject: token.subject.clone(),
            scopes: token.scopes.clone(),
            expires_at: token.expires_at,
            value_hash: value_hash(&token.value),
            rejection: None,
        }
    }

    /// A negative record that expires at `expires_at`.
    #[must_use]
    pub fn rejected(
        token_id: TokenId,
        value: &str,
        code: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id,
            subject: String::new(),
            scopes: Vec::new(),
            expires_at,
            value_hash: value_hash(value),
            rejection: Some(code.into()),
        }
    }

    /// Whether this records a successful validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rejection.is_none()
    }

    /// Whether the record was made for `value`.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.value_hash == value_hash(value)
    }

    /// Time left before `expires_at`, if any.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .signed_duration_since(now)
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// Whether the scope was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
