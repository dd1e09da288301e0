//! Identifier types used throughout Attorn.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Random hex suffix shared by the prefixed identifiers.
fn random_suffix() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Unique identifier for a token (the `jti` claim).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Create a new random token ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier, such as a `jti` read off the wire.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a delegation record (`del_<hex>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationId(String);

impl DelegationId {
    /// Prefix carried by every delegation ID.
    pub const PREFIX: &'static str = "del_";

    /// Generate a fresh delegation ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, random_suffix()))
    }

    /// Parse an identifier, checking its prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] if the prefix is missing.
    pub fn parse(value: &str) -> CoreResult<Self> {
        if value.starts_with(Self::PREFIX) && value.len() > Self::PREFIX.len() {
            Ok(Self(value.to_string()))
        } else {
            Err(CoreError::InvalidIdentifier {
                value: value.to_string(),
                prefix: Self::PREFIX,
            })
        }
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DelegationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an attestation record (`att_<hex>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttestationId(String);

impl AttestationId {
    /// Prefix carried by every attestation ID.
    pub const PREFIX: &'static str = "att_";

    /// Generate a fresh attestation ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, random_suffix()))
    }

    /// Parse an identifier, checking its prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`] if the prefix is missing.
    pub fn parse(value: &str) -> CoreResult<Self> {
        if value.starts_with(Self::PREFIX) && value.len() > Self::PREFIX.len() {
            Ok(Self(value.to_string()))
        } else {
            Err(CoreError::InvalidIdentifier {
                value: value.to_string(),
                prefix: Self::PREFIX,
            })
        }
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttestationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of power a principal transfers to a delegate.
///
/// Free-form so deployments can define their own categories; a few common
/// ones have constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PowerType(String);

impl PowerType {
    /// Create a power type from any label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Authority to execute financial transactions.
    #[must_use]
    pub fn financial_transactions() -> Self {
        Self::new("financial_transactions")
    }

    /// Authority to sign contracts on the principal's behalf.
    #[must_use]
    pub fn contract_signing() -> Self {
        Self::new("contract_signing")
    }

    /// Corporate governance authority (board-level actions).
    #[must_use]
    pub fn governance_authority() -> Self {
        Self::new("governance_authority")
    }

    /// Borrow the label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
