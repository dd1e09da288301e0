//! Attribute sources consulted before policies are evaluated.

use std::sync::Arc;

use async_trait::async_trait;
use attorn_core::{ClaimMap, ClaimValue};
use attorn_delegation::{OwnerInfo, RegistryError, RegistryVerifier};

use crate::error::{PolicyError, PolicyResult};

/// Attribute name published by [`RegistrySource`].
pub const PRINCIPAL_REGISTERED: &str = "principal.registered";

/// Supplies attributes for a request.
#[async_trait]
pub trait DataSource: Send + Sync + std::fmt::Debug {
    /// Stable identifier, used in cache keys.
    fn id(&self) -> &str;

    /// Attributes for the request triple.
    ///
    /// # Errors
    ///
    /// Any error fails the whole authorization.
    async fn fetch(&self, subject: &str, resource: &str, action: &str) -> PolicyResult<ClaimMap>;
}

/// A source returning the same attributes for every request.
#[derive(Debug, Clone)]
pub struct StaticSource {
    id: String,
    attributes: ClaimMap,
}

impl StaticSource {
    /// An empty source.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: ClaimMap::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl DataSource for StaticSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, _subject: &str, _resource: &str, _action: &str) -> PolicyResult<ClaimMap> {
        Ok(self.attributes.clone())
    }
}

/// Publishes [`PRINCIPAL_REGISTERED`] for the subject from a registry.
///
/// A definite answer from the registry becomes `true` or `false`. An
/// unreachable or unimplemented registry is an error, so the request fails
/// closed.
#[derive(Debug, Clone)]
pub struct RegistrySource {
    registry: Arc<dyn RegistryVerifier>,
    owner_type: String,
}

impl RegistrySource {
    /// Source identifier.
    pub const ID: &'static str = "registry";

    /// Look subjects up in `registry`.
    #[must_use]
    pub fn new(registry: Arc<dyn RegistryVerifier>) -> Self {
        Self {
            registry,
            owner_type: "principal".to_string(),
        }
    }

    /// Owner type presented to the registry.
    #[must_use]
    pub fn with_owner_type(mut self, owner_type: impl Into<String>) -> Self {
        self.owner_type = owner_type.into();
        self
    }
}

#[async_trait]
impl DataSource for RegistrySource {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn fetch(&self, subject: &str, _resource: &str, _action: &str) -> PolicyResult<ClaimMap> {
        let owner = OwnerInfo::new(subject, self.owner_type.clone());
        let registered = match self.registry.verify(&owner).await {
            Ok(()) => true,
            Err(RegistryError::NotRegistered { .. } | RegistryError::LegalStatus { .. }) => false,
            Err(e @ (RegistryError::Unavailable(_) | RegistryError::Unimplemented)) => {
                return Err(PolicyError::DataSource {
                    source_id: Self::ID.to_string(),
                    reason: e.to_string(),
                });
            },
        };
        Ok(ClaimMap::from([(
            PRINCIPAL_REGISTERED.to_string(),
            ClaimValue::Bool(registered),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attorn_delegation::{StaticRegistry, UnimplementedRegistry};

    #[tokio::test]
    async fn test_registry_source() {
        let source = RegistrySource::new(Arc::new(StaticRegistry::with_owners(["alice"])));
        let alice = source.fetch("alice", "r", "a").await.unwrap();
        assert_eq!(alice[PRINCIPAL_REGISTERED], ClaimValue::Bool(true));
        let bob = source.fetch("bob", "r", "a").await.unwrap();
        assert_eq!(bob[PRINCIPAL_REGISTERED], ClaimValue::Bool(false));
    }

    #[tokio::test]
    async fn test_unimplemented_registry_fails_closed() {
        let source = RegistrySource::new(Arc::new(UnimplementedRegistry));
        let err = source.fetch("alice", "r", "a").await.unwrap_err();
        assert_eq!(err.code(), "data_source_failed");
    }
}
