//! The key-value trait and its in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{StorageError, StorageResult};

/// Namespaced byte store with optional per-entry expiry.
///
/// Absence is `Ok(None)`, never an error. Implementations must be safe to
/// share across tasks.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    /// Fetch a value.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store a value with no expiry, replacing any previous value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Store a value that disappears after `ttl`.
    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()>;

    /// Remove a value. Returns whether it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List live keys in a namespace.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Whether a live value exists.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

fn validate_key(namespace: &str, key: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey("empty namespace".into()));
    }
    if key.is_empty() {
        return Err(StorageError::InvalidKey(format!("empty key in {namespace}")));
    }
    Ok(())
}

/// In-process [`KvStore`].
///
/// Expired entries are invisible to reads and are dropped lazily on the next
/// write to their namespace or by [`purge_expired`](Self::purge_expired).
/// Expiry follows `tokio::time`, so paused-time tests can step past a TTL.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    namespaces: RwLock<HashMap<String, HashMap<String, Entry>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        let mut removed: usize = 0;
        for entries in namespaces.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now));
            removed = removed.saturating_add(before.saturating_sub(entries.len()));
        }
        if removed > 0 {
            tracing::debug!(removed, "purged expired kv entries");
        }
        removed
    }

    async fn insert(&self, namespace: &str, key: &str, entry: Entry) -> StorageResult<()> {
        validate_key(namespace, key)?;
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        let entries = namespaces.entry(namespace.to_string()).or_default();
        entries.retain(|_, existing| existing.is_live(now));
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(namespace, key)?;
        let now = Instant::now();
        let namespaces = self.namespaces.read().await;
        Ok(namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.insert(
            namespace,
            key,
            Entry {
                value,
                expires_at: None,
            },
        )
        .await
    }

    async fn set_with_ttl(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StorageResult<()> {
        let expires_at = Instant::now().checked_add(ttl);
        self.insert(namespace, key, Entry { value, expires_at }).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_key(namespace, key)?;
        let now = Instant::now();
        let mut namespaces = self.namespaces.write().await;
        Ok(namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let now = Instant::now();
        let namespaces = self.namespaces.read().await;
        let mut keys: Vec<String> = namespaces
            .get(namespace)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, entry)| entry.is_live(now))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}

/// A [`KvStore`] bound to one namespace, with JSON helpers.
#[derive(Debug, Clone)]
pub struct ScopedKvStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl ScopedKvStore {
    /// Bind `inner` to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an empty namespace.
    pub fn new(inner: Arc<dyn KvStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(StorageError::InvalidKey("empty namespace".into()));
        }
        Ok(Self { inner, namespace })
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fetch raw bytes.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(&self.namespace, key).await
    }

    /// Store raw bytes, optionally expiring.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StorageResult<()> {
        match ttl {
            Some(ttl) => {
                self.inner
                    .set_with_ttl(&self.namespace, key, value, ttl)
                    .await
            },
            None => self.inner.set(&self.namespace, key, value).await,
        }
    }

    /// Remove a key.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(&self.namespace, key).await
    }

    /// List live keys.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Fetch and decode a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored bytes do not
    /// decode as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Encode and store a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `value` cannot be encoded.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(key, bytes, ttl).await
    }
}
