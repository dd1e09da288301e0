//! Token store over a shared key-value backend.

use std::sync::Arc;

use async_trait::async_trait;
use attorn_core::{Clock, SystemClock};
use attorn_crypto::SealingKey;
use attorn_storage::{KvStore, ScopedKvStore};
use chrono::{DateTime, Duration, Utc};

use super::locks::KeyedLocks;
use super::{Backend, TokenStore};
use crate::error::{TokenError, TokenResult};
use crate::filter::TokenFilter;
use crate::token::Token;
use crate::validation::DEFAULT_CLOCK_SKEW;

/// Namespace tokens are written to.
pub const TOKEN_NAMESPACE: &str = "tokens";

/// [`TokenStore`] over any [`KvStore`].
///
/// Plain mode writes JSON, so several engine instances can share one
/// backend. Sealed mode encrypts every record with ChaCha20-Poly1305, binding
/// the storage key as associated data.
///
/// Entries are written with a TTL of the token's remaining lifetime plus the
/// clock skew, so the backend can drop them without a cleanup pass.
///
/// The per-key locks are process-local. Instances sharing a backend are
/// serialized only within each process.
#[derive(Debug)]
pub struct KvTokenStore {
    kv: ScopedKvStore,
    sealing: Option<Arc<SealingKey>>,
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl KvTokenStore {
    /// A plain JSON store.
    ///
    /// # Errors
    ///
    /// Propagates namespace errors from the backend.
    pub fn new(kv: Arc<dyn KvStore>) -> TokenResult<Self> {
        Ok(Self {
            kv: ScopedKvStore::new(kv, TOKEN_NAMESPACE)?,
            sealing: None,
            locks: KeyedLocks::new(),
            clock: Arc::new(SystemClock),
            clock_skew: DEFAULT_CLOCK_SKEW,
        })
    }

    /// An encrypted-at-rest store.
    ///
    /// # Errors
    ///
    /// Propagates namespace errors from the backend.
    pub fn encrypted(kv: Arc<dyn KvStore>, key: SealingKey) -> TokenResult<Self> {
        let mut store = Self::new(kv)?;
        store.sealing = Some(Arc::new(key));
        Ok(store)
    }

    /// Use `clock` for expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tolerance applied to expiry and not-before.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Whether records are sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.sealing.is_some()
    }

    fn encode(&self, key: &str, token: &Token) -> TokenResult<Vec<u8>> {
        let json = serde_json::to_vec(token).map_err(|e| TokenError::Serialization(e.to_string()))?;
        match &self.sealing {
            Some(sealing) => Ok(sealing.seal(&json, key.as_bytes())?),
            None => Ok(json),
        }
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> TokenResult<Token> {
        let opened;
        let json = match &self.sealing {
            Some(sealing) => {
                opened = sealing.open(bytes, key.as_bytes())?;
                opened.as_slice()
            },
            None => bytes,
        };
        serde_json::from_slice(json).map_err(|e| TokenError::Serialization(e.to_string()))
    }

    fn ttl_for(&self, token: &Token) -> Option<std::time::Duration> {
        let deadline = token.expires_at.checked_add_signed(self.clock_skew)?;
        deadline
            .signed_duration_since(self.clock.now())
            .to_std()
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }
}

#[async_trait]
impl Backend for KvTokenStore {
    async fn load(&self, key: &str) -> TokenResult<Option<Token>> {
        match self.kv.get(key).await? {
            Some(bytes) => self.decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn persist(&self, key: &str, token: &Token) -> TokenResult<()> {
        let bytes = self.encode(key, token)?;
        // Already past expiry: keep it without a TTL so validate reports
        // Expired rather than NotFound until cleanup runs.
        self.kv.set(key, bytes, self.ttl_for(token)).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> TokenResult<bool> {
        Ok(self.kv.delete(key).await?)
    }

    async fn keys(&self) -> TokenResult<Vec<String>> {
        Ok(self.kv.list_keys().await?)
    }

    fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn skew(&self) -> Duration {
        self.clock_skew
    }
}

#[async_trait]
impl TokenStore for KvTokenStore {
    async fn save(&self, key: &str, token: Token) -> TokenResult<()> {
        super::save(self, key, &token).await
    }

    async fn get(&self, key: &str) -> TokenResult<Token> {
        super::get(self, key).await
    }

    async fn delete(&self, key: &str) -> TokenResult<bool> {
        super::delete(self, key).await
    }

    async fn list(&self, filter: &TokenFilter) -> TokenResult<Vec<Token>> {
        super::list(self, filter).await
    }

    async fn revoke(&self, token: &Token, reason: &str, revoked_by: &str) -> TokenResult<Token> {
        super::revoke(self, token, reason, revoked_by).await
    }

    async fn validate(&self, token: &Token) -> TokenResult<Token> {
        super::validate(self, token).await
    }

    async fn rotate(&self, old: &Token, new: Token) -> TokenResult<()> {
        super::rotate(self, old, new).await
    }

    async fn cleanup(&self) -> TokenResult<usize> {
        super::cleanup(self).await
    }
}
