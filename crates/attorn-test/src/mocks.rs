//! Mock implementations for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attorn_core::ClaimMap;
use attorn_delegation::{OwnerInfo, RegistryError, RegistryVerifier};
use attorn_distributed::{DistributedError, DistributedResult, KvSharedCache, SharedCache};
use attorn_policy::{DataSource, Decision, EnforcementHandler, PolicyError, PolicyResult};
use attorn_storage::MemoryKvStore;

/// Mock principal registry.
///
/// Owners can be registered, marked as lacking legal capacity, or the whole
/// registry can be made unreachable. Every lookup is counted.
#[derive(Debug, Default)]
pub struct MockRegistry {
    registered: Mutex<HashSet<String>>,
    incapacitated: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl MockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an owner.
    #[must_use]
    pub fn with_owner(self, owner_id: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.registered.lock() {
            guard.insert(owner_id.into());
        }
        self
    }

    /// Mark a registered owner as lacking legal capacity.
    #[must_use]
    pub fn with_incapacity(self, owner_id: impl Into<String>, reason: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.incapacitated.lock() {
            guard.insert(owner_id.into(), reason.into());
        }
        self
    }

    /// Make every lookup fail as unreachable, or restore it.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryVerifier for MockRegistry {
    async fn verify(&self, owner: &OwnerInfo) -> Result<(), RegistryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("mock registry offline".into()));
        }
        let registered = self
            .registered
            .lock()
            .map(|g| g.contains(&owner.owner_id))
            .unwrap_or(false);
        if !registered {
            return Err(RegistryError::NotRegistered {
                owner_id: owner.owner_id.clone(),
            });
        }
        let incapacity = self
            .incapacitated
            .lock()
            .ok()
            .and_then(|g| g.get(&owner.owner_id).cloned());
        match incapacity {
            Some(reason) => Err(RegistryError::LegalStatus {
                owner_id: owner.owner_id.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// A shared cache that can be switched into failure.
///
/// Backed by a real [`KvSharedCache`] over memory so that recovery after a
/// failure window sees the entries written before it.
#[derive(Debug)]
pub struct FlakySharedCache {
    inner: KvSharedCache,
    failing: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl Default for FlakySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakySharedCache {
    /// A healthy cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: KvSharedCache::new(Arc::new(MemoryKvStore::new())),
            failing: AtomicBool::new(false),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Fail every operation until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reads attempted, failed or not.
    #[must_use]
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Writes attempted, failed or not.
    #[must_use]
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Deletes attempted, failed or not.
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check(&self) -> DistributedResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DistributedError::Cache("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedCache for FlakySharedCache {
    async fn get(&self, key: &str) -> DistributedResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DistributedResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> DistributedResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.delete(key).await
    }
}

/// Enforcement handler that records every decision it sees.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    id: String,
    decisions: Arc<Mutex<Vec<Decision>>>,
    reject: Arc<AtomicBool>,
}

impl RecordingHandler {
    /// Create a handler with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            decisions: Arc::new(Mutex::new(Vec::new())),
            reject: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fail enforcement from now on, or stop failing.
    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Decisions seen so far.
    #[must_use]
    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EnforcementHandler for RecordingHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn enforce(&self, decision: &Decision) -> PolicyResult<()> {
        if let Ok(mut guard) = self.decisions.lock() {
            guard.push(decision.clone());
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(PolicyError::Enforcement {
                handler_id: self.id.clone(),
                reason: "rejected by test".into(),
            });
        }
        Ok(())
    }
}

/// Data source returning fixed attributes, or failing on demand.
#[derive(Debug, Clone)]
pub struct MockDataSource {
    id: String,
    attributes: ClaimMap,
    failing: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
}

impl MockDataSource {
    /// A source with no attributes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: ClaimMap::new(),
            failing: Arc::new(AtomicBool::new(false)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Supply `value` for `name`.
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<attorn_core::ClaimValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Fail every fetch, or stop failing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fetches so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, _subject: &str, _resource: &str, _action: &str) -> PolicyResult<ClaimMap> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PolicyError::DataSource {
                source_id: self.id.clone(),
                reason: "source offline".into(),
            });
        }
        Ok(self.attributes.clone())
    }
}
