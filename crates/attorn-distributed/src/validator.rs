//! Two-tier cached validation.

use std::sync::Arc;
use std::time::Duration;

use attorn_core::{Clock, SystemClock, TokenId};
use attorn_tokens::{TokenError, ValidationStage, wire};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::authenticator::TokenAuthenticator;
use crate::error::{DistributedError, DistributedResult, RevocationStep};
use crate::local::{DEFAULT_LOCAL_CAPACITY, LocalCache, RevokedIds};
use crate::record::ValidationRecord;
use crate::shared::SharedCache;

/// Rejection code for IDs known to be revoked.
const REVOKED_CODE: &str = "revoked";

/// Upper bound on how long a rejection may be cached.
pub const MAX_NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// Validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    /// Prefix of shared-cache keys.
    pub key_prefix: String,
    /// Longest a positive record is cached. Never beyond token expiry.
    pub cache_ttl: Duration,
    /// Bound on the local tier. Zero disables it.
    pub local_max_entries: usize,
    /// Cache rejections.
    pub cache_negative: bool,
    /// How long a rejection is cached. Clamped to [`MAX_NEGATIVE_TTL`].
    pub negative_ttl: Duration,
    /// Capacity of the revocation broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            key_prefix: "token:".into(),
            cache_ttl: Duration::from_secs(300),
            local_max_entries: DEFAULT_LOCAL_CAPACITY,
            cache_negative: true,
            negative_ttl: Duration::from_secs(5),
            broadcast_capacity: 1024,
        }
    }
}

/// Validation through a local tier, a shared tier, then an authenticator.
///
/// Cache failures degrade to the next tier. Entries are keyed by token ID
/// and bound to a hash of the full value, so a forged value carrying a
/// cached ID always reaches the authenticator.
///
/// A revocation deletes the entries and marks the ID locally for
/// `cache_ttl`. A validation that was already past the authenticator when
/// the revocation landed never leaves an acceptance behind. Peers get the
/// same guarantee once they see the ID on the revocation feed.
#[derive(Debug)]
pub struct DistributedValidator {
    base: Arc<dyn TokenAuthenticator>,
    shared: Arc<dyn SharedCache>,
    local: Arc<LocalCache>,
    revoked: Arc<RevokedIds>,
    config: DistributedConfig,
    revocations: broadcast::Sender<TokenId>,
    clock: Arc<dyn Clock>,
}

impl DistributedValidator {
    /// Validator over `base` and `shared`.
    #[must_use]
    pub fn new(
        base: Arc<dyn TokenAuthenticator>,
        shared: Arc<dyn SharedCache>,
        mut config: DistributedConfig,
    ) -> Self {
        config.negative_ttl = config.negative_ttl.min(MAX_NEGATIVE_TTL);
        let (revocations, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            base,
            shared,
            local: Arc::new(LocalCache::new(config.local_max_entries)),
            revoked: Arc::new(RevokedIds::new()),
            config,
            revocations,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for record lifetimes.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Effective settings.
    #[must_use]
    pub fn config(&self) -> &DistributedConfig {
        &self.config
    }

    /// The local tier.
    #[must_use]
    pub fn local_cache(&self) -> &LocalCache {
        &self.local
    }

    fn shared_key(&self, token_id: &TokenId) -> String {
        format!("{}{token_id}", self.config.key_prefix)
    }

    /// Validate a wire value.
    ///
    /// # Errors
    ///
    /// Returns [`DistributedError::Rejected`] for a cached rejection or a
    /// known revocation, the decoding error for an unreadable value, or the
    /// authenticator's error.
    pub async fn validate_token(&self, value: &str) -> DistributedResult<ValidationRecord> {
        let (_, claims) = wire::decode_unverified(value)?;
        let token_id = claims.jti;

        if self.revoked.contains(token_id.as_str()) {
            debug!(%token_id, "token revoked on this instance or a peer");
            return Err(Self::revoked_error(&token_id));
        }

        if let Some(record) = self.local.get(token_id.as_str())
            && record.matches(value)
        {
            debug!(%token_id, "local cache hit");
            return Self::outcome(record);
        }

        let key = self.shared_key(&token_id);
        match self.shared.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<ValidationRecord>(&raw) {
                Ok(record) if record.matches(value) => {
                    if let Some(ttl) = record.remaining_at(self.clock.now()) {
                        debug!(%token_id, "shared cache hit");
                        self.local.insert(record.clone(), ttl);
                        return Self::outcome(record);
                    }
                },
                Ok(_) => debug!(%token_id, "shared entry is for another value"),
                Err(e) => warn!(%token_id, error = %e, "unreadable shared cache entry"),
            },
            Ok(None) => {},
            Err(e) => warn!(%token_id, error = %e, "shared cache unavailable, falling through"),
        }

        match self.base.validate_token(value).await {
            Ok(token) => {
                let record = ValidationRecord::accepted(&token);
                let ttl = token
                    .remaining_at(self.clock.now())
                    .map(|left| left.min(self.config.cache_ttl));
                if let Some(ttl) = ttl {
                    self.write_back_accepted(&key, &record, ttl).await;
                }
                Ok(record)
            },
            Err(e) => {
                if self.config.cache_negative
                    && let Some(code) = negative_code(&e)
                {
                    let ttl = self.config.negative_ttl;
                    let expires_at = chrono::Duration::from_std(ttl)
                        .ok()
                        .and_then(|d| self.clock.now().checked_add_signed(d))
                        .unwrap_or_else(Utc::now);
                    let record =
                        ValidationRecord::rejected(token_id.clone(), value, code, expires_at);
                    self.write_back(&key, &record, ttl).await;
                }
                Err(e.into())
            },
        }
    }

    fn outcome(record: ValidationRecord) -> DistributedResult<ValidationRecord> {
        match &record.rejection {
            None => Ok(record),
            Some(code) => Err(DistributedError::Rejected {
                token_id: record.token_id.to_string(),
                code: code.clone(),
            }),
        }
    }

    fn revoked_error(token_id: &TokenId) -> DistributedError {
        DistributedError::Rejected {
            token_id: token_id.to_string(),
            code: REVOKED_CODE.into(),
        }
    }

    /// Cache an acceptance unless the token was revoked meanwhile.
    ///
    /// The revoked set is checked again after the shared write: a
    /// revocation that slipped in between has its deletion repeated.
    async fn write_back_accepted(&self, key: &str, record: &ValidationRecord, ttl: Duration) {
        let token_id = record.token_id.as_str();
        if self.revoked.contains(token_id) {
            debug!(%token_id, "revoked during validation, not caching");
            return;
        }
        self.write_back(key, record, ttl).await;
        if self.revoked.contains(token_id) {
            self.local.remove(token_id);
            if let Err(e) = self.shared.delete(key).await {
                warn!(%token_id, error = %e, "could not drop acceptance written during revocation");
            }
        }
    }

    async fn write_back(&self, key: &str, record: &ValidationRecord, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.local.insert(record.clone(), ttl);
        match serde_json::to_string(record) {
            Ok(raw) => {
                if let Err(e) = self.shared.set(key, raw, ttl).await {
                    warn!(token_id = %record.token_id, error = %e, "shared cache write failed");
                }
            },
            Err(e) => warn!(token_id = %record.token_id, error = %e, "record not serializable"),
        }
    }

    /// Revoke a wire value on every tier and tell peers to evict it.
    ///
    /// Every step is attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the decoding error for an unreadable value, or
    /// [`DistributedError::PartialRevocation`] naming the failed steps.
    pub async fn revoke_token(&self, value: &str, reason: &str) -> DistributedResult<()> {
        let (_, claims) = wire::decode_unverified(value)?;
        let token_id = claims.jti;
        let mut failed = Vec::new();

        self.revoked.purge_expired();
        self.revoked.insert(token_id.as_str(), self.config.cache_ttl);
        self.local.remove(token_id.as_str());
        if let Err(e) = self.shared.delete(&self.shared_key(&token_id)).await {
            warn!(%token_id, error = %e, "shared cache eviction failed");
            failed.push(RevocationStep::SharedCache);
        }
        if let Err(e) = self.base.revoke_token(value, reason).await {
            warn!(%token_id, error = %e, "base revocation failed");
            failed.push(RevocationStep::Base);
        }
        // A concurrent validation may have repopulated the local tier.
        self.local.remove(token_id.as_str());

        if self.revocations.send(token_id.clone()).is_err() {
            debug!(%token_id, "no revocation subscribers");
        }

        if failed.is_empty() {
            info!(%token_id, reason, "token revoked on all tiers");
            Ok(())
        } else {
            Err(DistributedError::PartialRevocation {
                token_id: token_id.to_string(),
                failed,
            })
        }
    }

    /// Receive IDs this validator revokes.
    #[must_use]
    pub fn subscribe_revocations(&self) -> broadcast::Receiver<TokenId> {
        self.revocations.subscribe()
    }

    /// Evict IDs arriving on `rx` from the local tier and refuse them from
    /// then on, until the channel closes. A lagged receiver clears the
    /// whole tier.
    #[must_use]
    pub fn follow_revocations(&self, mut rx: broadcast::Receiver<TokenId>) -> JoinHandle<()> {
        let local = Arc::clone(&self.local);
        let revoked = Arc::clone(&self.revoked);
        let ttl = self.config.cache_ttl;
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(token_id) => {
                        revoked.insert(token_id.as_str(), ttl);
                        if local.remove(token_id.as_str()) {
                            debug!(%token_id, "evicted on peer revocation");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "revocation feed lagged, clearing local cache");
                        local.clear();
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Failures that are safe to remember for a few seconds.
///
/// Not-yet-valid tokens become valid on their own, and missing or
/// unreachable storage says nothing about the token. Values that fail
/// authentication are never cached, so they cannot displace the entry of
/// the genuine token with the same ID.
fn negative_code(error: &TokenError) -> Option<&'static str> {
    match error {
        TokenError::Validation(v) => match v.stage() {
            ValidationStage::Signature | ValidationStage::NotBefore => None,
            _ => Some(v.code()),
        },
        TokenError::Revoked { .. } | TokenError::Expired { .. } => Some(error.code()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::StoreAuthenticator;
    use crate::shared::KvSharedCache;
    use async_trait::async_trait;
    use attorn_crypto::{KeyPair, Verifier};
    use attorn_storage::MemoryKvStore;
    use attorn_crypto::Signer;
    use attorn_tokens::{
        Claims, MemoryTokenStore, RevocationList, Token, TokenIssuer, TokenRequest, TokenStore,
        ValidationConfig, ValidationPipeline,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Shared cache that can be switched off.
    #[derive(Debug)]
    struct Flaky {
        inner: KvSharedCache,
        down: AtomicBool,
        sets: std::sync::Mutex<Vec<(String, Duration)>>,
    }

    impl Flaky {
        fn new() -> Self {
            Self {
                inner: KvSharedCache::new(Arc::new(MemoryKvStore::new())),
                down: AtomicBool::new(false),
                sets: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn check(&self) -> DistributedResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(DistributedError::Cache("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SharedCache for Flaky {
        async fn get(&self, key: &str) -> DistributedResult<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> DistributedResult<()> {
            self.check()?;
            self.sets.lock().unwrap().push((key.to_string(), ttl));
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> DistributedResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }
    }

    /// Counts calls through to the real authenticator.
    #[derive(Debug)]
    struct Counting {
        inner: StoreAuthenticator,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenAuthenticator for Counting {
        async fn validate_token(&self, value: &str) -> attorn_tokens::TokenResult<Token> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.validate_token(value).await
        }

        async fn revoke_token(&self, value: &str, reason: &str) -> attorn_tokens::TokenResult<()> {
            self.inner.revoke_token(value, reason).await
        }
    }

    struct Fixture {
        issuer: TokenIssuer,
        store: Arc<dyn TokenStore>,
        base: Arc<Counting>,
        shared: Arc<Flaky>,
    }

    impl Fixture {
        fn new() -> Self {
            let keys = Arc::new(KeyPair::generate());
            let issuer = TokenIssuer::new(keys.clone(), "issuer");
            let list = Arc::new(RevocationList::new());
            let verifier: Arc<dyn Verifier> = keys;
            let pipeline = ValidationPipeline::new(
                ValidationConfig::default(),
                Some(verifier),
                list.clone(),
            )
            .unwrap();
            let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
            let base = Arc::new(Counting {
                inner: StoreAuthenticator::new(pipeline, store.clone())
                    .with_revocation_list(list),
                calls: AtomicUsize::new(0),
            });
            Self {
                issuer,
                store,
                base,
                shared: Arc::new(Flaky::new()),
            }
        }

        fn validator(&self) -> DistributedValidator {
            DistributedValidator::new(
                self.base.clone(),
                self.shared.clone(),
                DistributedConfig::default(),
            )
        }

        async fn token(&self, ttl: chrono::Duration) -> Token {
            let token = self
                .issuer
                .issue(TokenRequest::access("agent").scope("read").ttl(ttl))
                .unwrap();
            self.store
                .save(token.id.as_str(), token.clone())
                .await
                .unwrap();
            token
        }

        fn calls(&self) -> usize {
            self.base.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_local_hit_skips_base() {
        let fx = Fixture::new();
        let validator = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;

        let first = validator.validate_token(&token.value).await.unwrap();
        assert!(first.is_valid());
        assert!(first.has_scope("read"));
        validator.validate_token(&token.value).await.unwrap();
        assert_eq!(fx.calls(), 1);
    }

    #[tokio::test]
    async fn test_shared_hit_populates_peer() {
        let fx = Fixture::new();
        let a = fx.validator();
        let b = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;

        a.validate_token(&token.value).await.unwrap();
        b.validate_token(&token.value).await.unwrap();
        assert_eq!(fx.calls(), 1);
        assert_eq!(b.local_cache().len(), 1);
    }

    #[tokio::test]
    async fn test_write_back_ttl_bounded_by_expiry() {
        let fx = Fixture::new();
        let validator = fx.validator();
        let token = fx.token(chrono::Duration::seconds(60)).await;

        validator.validate_token(&token.value).await.unwrap();
        let sets = fx.shared.sets.lock().unwrap().clone();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].1 <= Duration::from_secs(60));
        assert!(sets[0].1 > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_shared_outage_degrades_to_base() {
        let fx = Fixture::new();
        fx.shared.down.store(true, Ordering::SeqCst);
        let validator = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;

        let record = validator.validate_token(&token.value).await.unwrap();
        assert_eq!(record.token_id, token.id);
        // Still cached locally despite the failed write-back.
        validator.validate_token(&token.value).await.unwrap();
        assert_eq!(fx.calls(), 1);
    }

    #[tokio::test]
    async fn test_forged_value_misses_cache() {
        let fx = Fixture::new();
        let validator = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;
        validator.validate_token(&token.value).await.unwrap();

        // Same claims, same ID, signed by someone else.
        let attacker: Arc<dyn Signer> = Arc::new(KeyPair::generate());
        let forged = wire::encode(&Claims::from_token(&token), attacker.as_ref()).unwrap();
        let err = validator.validate_token(&forged).await.unwrap_err();
        assert_eq!(err.code(), "invalid_signature");
        assert_eq!(fx.calls(), 2);

        // The genuine entry survived.
        validator.validate_token(&token.value).await.unwrap();
        assert_eq!(fx.calls(), 2);
    }

    #[tokio::test]
    async fn test_rejection_cached_then_pinned_by_revoke() {
        let fx = Fixture::new();
        let validator = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;
        fx.store
            .revoke(&token, "test", "admin")
            .await
            .unwrap();

        let err = validator.validate_token(&token.value).await.unwrap_err();
        assert_eq!(err.code(), "revoked");
        let err = validator.validate_token(&token.value).await.unwrap_err();
        assert!(matches!(err, DistributedError::Rejected { .. }));
        assert_eq!(err.code(), "revoked");
        assert_eq!(fx.calls(), 1);

        validator.revoke_token(&token.value, "cleanup").await.unwrap();
        assert!(validator.local_cache().is_empty());
        // Refused locally without asking the authenticator.
        let err = validator.validate_token(&token.value).await.unwrap_err();
        assert!(matches!(err, DistributedError::Rejected { .. }));
        assert_eq!(err.code(), "revoked");
        assert_eq!(fx.calls(), 1);

        // The shared entry is gone, so a fresh instance asks the authenticator.
        let err = fx.validator().validate_token(&token.value).await.unwrap_err();
        assert_eq!(err.code(), "revoked");
        assert_eq!(fx.calls(), 2);
    }

    /// Holds a validation between the authenticator and the write-back.
    #[derive(Debug)]
    struct Gated {
        inner: Arc<Counting>,
        validated: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl TokenAuthenticator for Gated {
        async fn validate_token(&self, value: &str) -> attorn_tokens::TokenResult<Token> {
            let token = self.inner.validate_token(value).await?;
            self.validated.notify_one();
            self.release.notified().await;
            Ok(token)
        }

        async fn revoke_token(&self, value: &str, reason: &str) -> attorn_tokens::TokenResult<()> {
            self.inner.revoke_token(value, reason).await
        }
    }

    #[tokio::test]
    async fn test_in_flight_validation_cannot_outlive_revocation() {
        let fx = Fixture::new();
        let gated = Arc::new(Gated {
            inner: fx.base.clone(),
            validated: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let validator = Arc::new(DistributedValidator::new(
            gated.clone(),
            fx.shared.clone(),
            DistributedConfig::default(),
        ));
        let token = fx.token(chrono::Duration::hours(1)).await;

        let in_flight = tokio::spawn({
            let validator = Arc::clone(&validator);
            let value = token.value.clone();
            async move { validator.validate_token(&value).await }
        });
        gated.validated.notified().await;
        validator.revoke_token(&token.value, "compromised").await.unwrap();
        gated.release.notify_one();
        // The answer computed before the revocation is returned once.
        in_flight.await.unwrap().unwrap();

        assert!(validator.local_cache().get(token.id.as_str()).is_none());
        let key = format!("{}{}", validator.config().key_prefix, token.id);
        assert_eq!(fx.shared.get(&key).await.unwrap(), None);
        let err = validator.validate_token(&token.value).await.unwrap_err();
        assert_eq!(err.code(), "revoked");
        let err = fx.validator().validate_token(&token.value).await.unwrap_err();
        assert_eq!(err.code(), "revoked");
    }

    #[tokio::test]
    async fn test_peer_refuses_token_after_feed() {
        let fx = Fixture::new();
        let a = fx.validator();
        let b = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;

        let listener = b.follow_revocations(a.subscribe_revocations());
        a.revoke_token(&token.value, "compromised").await.unwrap();
        drop(a);
        listener.await.unwrap();

        // The peer refuses without asking the authenticator.
        let err = b.validate_token(&token.value).await.unwrap_err();
        assert_eq!(err.code(), "revoked");
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_token_not_negatively_cached() {
        let fx = Fixture::new();
        let validator = fx.validator();
        let token = fx
            .issuer
            .issue(TokenRequest::access("ghost"))
            .unwrap();

        validator.validate_token(&token.value).await.unwrap_err();
        validator.validate_token(&token.value).await.unwrap_err();
        assert_eq!(fx.calls(), 2);
    }

    #[tokio::test]
    async fn test_partial_revocation_reports_failed_step() {
        let fx = Fixture::new();
        let validator = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;
        validator.validate_token(&token.value).await.unwrap();

        fx.shared.down.store(true, Ordering::SeqCst);
        let err = validator
            .revoke_token(&token.value, "compromised")
            .await
            .unwrap_err();
        match err {
            DistributedError::PartialRevocation { failed, .. } => {
                assert_eq!(failed, vec![RevocationStep::SharedCache]);
            },
            other => panic!("unexpected {other:?}"),
        }
        // The base still revoked it.
        let stored = fx.store.get(token.id.as_str()).await.unwrap();
        assert!(stored.revocation.is_some());
        assert!(validator.local_cache().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_value() {
        let fx = Fixture::new();
        let err = fx.validator().validate_token("garbage").await.unwrap_err();
        assert_eq!(err.code(), "malformed");
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_peer_revocation_evicts_local_entry() {
        let fx = Fixture::new();
        let a = fx.validator();
        let b = fx.validator();
        let token = fx.token(chrono::Duration::hours(1)).await;
        b.validate_token(&token.value).await.unwrap();
        assert_eq!(b.local_cache().len(), 1);

        let listener = b.follow_revocations(a.subscribe_revocations());
        a.revoke_token(&token.value, "compromised").await.unwrap();
        drop(a);
        listener.await.unwrap();
        assert!(b.local_cache().is_empty());
    }

    #[test]
    fn test_negative_ttl_clamped() {
        let fx = Fixture::new();
        let config = DistributedConfig {
            negative_ttl: Duration::from_secs(300),
            ..DistributedConfig::default()
        };
        let validator = DistributedValidator::new(fx.base.clone(), fx.shared.clone(), config);
        assert_eq!(validator.config().negative_ttl, MAX_NEGATIVE_TTL);
    }
}
