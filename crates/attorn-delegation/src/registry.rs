//! Identity and registry verification of principals.
//!
//! Registries are external systems (commercial registers, identity
//! providers). The engine consults a [`RegistryVerifier`] before a grant is
//! attested, and the policy layer exposes the answer as an attribute.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The owner is not in the registry.
    #[error("owner not registered: {owner_id}")]
    NotRegistered {
        /// The owner.
        owner_id: String,
    },

    /// The owner is registered but lacks legal capacity.
    #[error("owner {owner_id} lacks legal capacity: {reason}")]
    LegalStatus {
        /// The owner.
        owner_id: String,
        /// Why.
        reason: String,
    },

    /// The registry could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// No registry is wired in.
    #[error("registry verification not implemented")]
    Unimplemented,
}

/// Facts about a principal presented for verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnerInfo {
    /// Identity of the owner.
    pub owner_id: String,
    /// `individual`, `organization`, `client_owner` and so on.
    pub owner_type: String,
    /// Legal status as recorded by the owner.
    #[serde(default)]
    pub legal_status: String,
    /// Country code.
    #[serde(default)]
    pub jurisdiction: String,
    /// Registry entry, when the owner is a registered entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
}

impl OwnerInfo {
    /// Owner info with just an ID and type.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_type: owner_type.into(),
            ..Self::default()
        }
    }
}

/// Confirms a principal's registration and legal capacity.
#[async_trait]
pub trait RegistryVerifier: Send + Sync + std::fmt::Debug {
    /// `Ok(())` if `owner` is registered and may grant authority.
    async fn verify(&self, owner: &OwnerInfo) -> Result<(), RegistryError>;
}

/// Placeholder that fails every lookup with [`RegistryError::Unimplemented`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedRegistry;

#[async_trait]
impl RegistryVerifier for UnimplementedRegistry {
    async fn verify(&self, _owner: &OwnerInfo) -> Result<(), RegistryError> {
        Err(RegistryError::Unimplemented)
    }
}

/// A registry backed by an in-process allow-list of owner IDs.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    registered: RwLock<HashSet<String>>,
}

impl StaticRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with `owners`.
    #[must_use]
    pub fn with_owners<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registered: RwLock::new(owners.into_iter().map(Into::into).collect()),
        }
    }

    /// Register an owner.
    pub fn register(&self, owner_id: impl Into<String>) {
        self.registered
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(owner_id.into());
    }

    /// Remove an owner. Returns whether it was registered.
    pub fn deregister(&self, owner_id: &str) -> bool {
        self.registered
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(owner_id)
    }
}

#[async_trait]
impl RegistryVerifier for StaticRegistry {
    async fn verify(&self, owner: &OwnerInfo) -> Result<(), RegistryError> {
        let known = self
            .registered
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&owner.owner_id);
        if known {
            Ok(())
        } else {
            Err(RegistryError::NotRegistered {
                owner_id: owner.owner_id.clone(),
            })
        }
    }
}
