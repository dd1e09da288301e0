//! Token storage.
//!
//! [`TokenStore`] is the contract; [`MemoryTokenStore`] and
//! [`KvTokenStore`] implement it. Both share the locked read-modify-write
//! sequences in this module, so they differ only in how a token is loaded
//! and persisted.

mod kv;
mod locks;
mod memory;

pub use kv::KvTokenStore;
pub use memory::MemoryTokenStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::error::{TokenError, TokenResult};
use crate::filter::TokenFilter;
use crate::token::{RevocationStatus, Token};
use locks::KeyedLocks;

/// Reason recorded on a refresh token replaced by [`TokenStore::rotate`].
pub const ROTATED_REASON: &str = "rotated";

/// Persistent home of issued tokens.
///
/// `revoke`, `validate` and `rotate` address tokens by ID and hold the
/// per-key lock for the whole read-modify-write. Plain reads take no lock.
#[async_trait]
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Store `token` under `key`, replacing any previous value.
    async fn save(&self, key: &str, token: Token) -> TokenResult<()>;

    /// Fetch the token under `key`.
    ///
    /// Returns [`TokenError::NotFound`] if absent.
    async fn get(&self, key: &str) -> TokenResult<Token>;

    /// Remove the token under `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> TokenResult<bool>;

    /// Tokens matching `filter` as of now.
    async fn list(&self, filter: &TokenFilter) -> TokenResult<Vec<Token>>;

    /// Number of tokens matching `filter`.
    async fn count(&self, filter: &TokenFilter) -> TokenResult<usize> {
        Ok(self.list(filter).await?.len())
    }

    /// Mark the stored copy of `token` revoked. Revoking twice keeps the
    /// first status.
    async fn revoke(&self, token: &Token, reason: &str, revoked_by: &str) -> TokenResult<Token>;

    /// Check `token` against its stored copy and stamp `last_used_at`.
    ///
    /// The signed values are compared in constant time. A differing value is
    /// [`TokenError::Mismatch`], distinct from [`TokenError::NotFound`].
    async fn validate(&self, token: &Token) -> TokenResult<Token>;

    /// Replace `old` with `new`: `old` is revoked and `new` is saved under
    /// its ID, atomically with respect to other writers of either key.
    async fn rotate(&self, old: &Token, new: Token) -> TokenResult<()>;

    /// Evict expired tokens. Returns how many were removed.
    async fn cleanup(&self) -> TokenResult<usize>;
}

/// Load/persist primitives a backend supplies to the shared sequences.
#[async_trait]
pub(crate) trait Backend: Send + Sync {
    async fn load(&self, key: &str) -> TokenResult<Option<Token>>;
    async fn persist(&self, key: &str, token: &Token) -> TokenResult<()>;
    async fn remove(&self, key: &str) -> TokenResult<bool>;
    async fn keys(&self) -> TokenResult<Vec<String>>;
    fn locks(&self) -> &KeyedLocks;
    fn now(&self) -> DateTime<Utc>;
    fn skew(&self) -> Duration;
}

fn same_value(stored: &Token, presented: &Token) -> bool {
    bool::from(stored.value.as_bytes().ct_eq(presented.value.as_bytes()))
}

async fn load_matching<B: Backend + ?Sized>(backend: &B, presented: &Token) -> TokenResult<Token> {
    let key = presented.id.as_str();
    let stored = backend
        .load(key)
        .await?
        .ok_or_else(|| TokenError::NotFound {
            key: key.to_string(),
        })?;
    if !same_value(&stored, presented) {
        return Err(TokenError::Mismatch {
            token_id: key.to_string(),
        });
    }
    Ok(stored)
}

pub(crate) async fn save<B: Backend + ?Sized>(backend: &B, key: &str, token: &Token) -> TokenResult<()> {
    let _guard = backend.locks().lock(key).await;
    backend.persist(key, token).await
}

pub(crate) async fn delete<B: Backend + ?Sized>(backend: &B, key: &str) -> TokenResult<bool> {
    let _guard = backend.locks().lock(key).await;
    backend.remove(key).await
}

pub(crate) async fn get<B: Backend + ?Sized>(backend: &B, key: &str) -> TokenResult<Token> {
    backend
        .load(key)
        .await?
        .ok_or_else(|| TokenError::NotFound {
            key: key.to_string(),
        })
}

pub(crate) async fn list<B: Backend + ?Sized>(
    backend: &B,
    filter: &TokenFilter,
) -> TokenResult<Vec<Token>> {
    let now = backend.now();
    let mut out = Vec::new();
    for key in backend.keys().await? {
        // Deleted between listing and loading.
        let Some(token) = backend.load(&key).await? else {
            continue;
        };
        if filter.matches(&token, now) {
            out.push(token);
        }
    }
    Ok(out)
}

pub(crate) async fn revoke<B: Backend + ?Sized>(
    backend: &B,
    token: &Token,
    reason: &str,
    revoked_by: &str,
) -> TokenResult<Token> {
    let _guard = backend.locks().lock(token.id.as_str()).await;
    let mut stored = load_matching(backend, token).await?;
    if stored.is_revoked() {
        return Ok(stored);
    }
    stored.revocation = Some(RevocationStatus {
        revoked_at: backend.now(),
        reason: reason.to_string(),
        revoked_by: revoked_by.to_string(),
    });
    backend.persist(stored.id.as_str(), &stored).await?;
    info!(token_id = %stored.id, reason, revoked_by, "token revoked");
    Ok(stored)
}

pub(crate) async fn validate<B: Backend + ?Sized>(backend: &B, token: &Token) -> TokenResult<Token> {
    let _guard = backend.locks().lock(token.id.as_str()).await;
    let mut stored = load_matching(backend, token).await?;
    let token_id = stored.id.to_string();
    if stored.is_revoked() {
        return Err(TokenError::Revoked { token_id });
    }
    let now = backend.now();
    if stored.is_expired_at(now, backend.skew()) {
        return Err(TokenError::Expired { token_id });
    }
    if stored.is_premature_at(now, backend.skew()) {
        return Err(TokenError::NotYetValid { token_id });
    }
    stored.last_used_at = Some(now);
    backend.persist(stored.id.as_str(), &stored).await?;
    Ok(stored)
}

pub(crate) async fn rotate<B: Backend + ?Sized>(backend: &B, old: &Token, new: Token) -> TokenResult<()> {
    if old.id == new.id {
        return Err(TokenError::Conflict {
            key: new.id.to_string(),
        });
    }
    let _guards = backend
        .locks()
        .lock_pair(old.id.as_str(), new.id.as_str())
        .await;

    let mut stored = load_matching(backend, old).await?;
    if stored.is_revoked() {
        return Err(TokenError::Revoked {
            token_id: stored.id.to_string(),
        });
    }
    if backend.load(new.id.as_str()).await?.is_some() {
        return Err(TokenError::Conflict {
            key: new.id.to_string(),
        });
    }

    stored.revocation = Some(RevocationStatus {
        revoked_at: backend.now(),
        reason: ROTATED_REASON.to_string(),
        revoked_by: new.id.to_string(),
    });
    backend.persist(new.id.as_str(), &new).await?;
    backend.persist(stored.id.as_str(), &stored).await?;
    debug!(old = %stored.id, new = %new.id, "token rotated");
    Ok(())
}

pub(crate) async fn cleanup<B: Backend + ?Sized>(backend: &B) -> TokenResult<usize> {
    let mut evicted: usize = 0;
    for key in backend.keys().await? {
        let _guard = backend.locks().lock(&key).await;
        // Re-check under the lock: the token may have been replaced.
        let expired = backend
            .load(&key)
            .await?
            .is_some_and(|token| token.is_expired_at(backend.now(), backend.skew()));
        if expired && backend.remove(&key).await? {
            evicted = evicted.saturating_add(1);
        }
    }
    let pruned = backend.locks().prune();
    if evicted > 0 {
        debug!(evicted, pruned_locks = pruned, "token cleanup pass");
    }
    Ok(evicted)
}

/// Behavioral checks every backend must pass.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::issuer::{TokenIssuer, TokenRequest};
    use crate::token::TokenType;
    use std::sync::Arc;

    pub(crate) fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            Arc::new(attorn_crypto::KeyPair::generate()),
            "https://issuer.example",
        )
    }

    pub(crate) async fn save_get_delete(store: &dyn TokenStore) {
        let token = issuer().issue(TokenRequest::access("agent")).unwrap();
        store.save(token.id.as_str(), token.clone()).await.unwrap();
        assert_eq!(store.get(token.id.as_str()).await.unwrap(), token);
        assert!(store.delete(token.id.as_str()).await.unwrap());
        assert!(matches!(
            store.get(token.id.as_str()).await,
            Err(TokenError::NotFound { .. })
        ));
        assert!(!store.delete(token.id.as_str()).await.unwrap());
    }

    pub(crate) async fn validate_then_revoke(store: &dyn TokenStore) {
        let token = issuer().issue(TokenRequest::access("agent")).unwrap();
        store.save(token.id.as_str(), token.clone()).await.unwrap();

        let used = store.validate(&token).await.unwrap();
        assert!(used.last_used_at.is_some());
        assert!(store.validate(&token).await.is_ok());

        let revoked = store.revoke(&token, "compromised", "admin").await.unwrap();
        let first = revoked.revocation.clone().unwrap();
        let again = store.revoke(&token, "other", "other").await.unwrap();
        assert_eq!(again.revocation.unwrap(), first);

        for _ in 0..2 {
            assert!(matches!(
                store.validate(&token).await,
                Err(TokenError::Revoked { .. })
            ));
        }
    }

    pub(crate) async fn mismatch_is_not_not_found(store: &dyn TokenStore) {
        let token = issuer().issue(TokenRequest::access("agent")).unwrap();
        store.save(token.id.as_str(), token.clone()).await.unwrap();

        let mut forged = token.clone();
        forged.value.push('x');
        assert!(matches!(
            store.validate(&forged).await,
            Err(TokenError::Mismatch { .. })
        ));

        let unknown = issuer().issue(TokenRequest::access("agent")).unwrap();
        assert!(matches!(
            store.validate(&unknown).await,
            Err(TokenError::NotFound { .. })
        ));
    }

    pub(crate) async fn list_and_count(store: &dyn TokenStore) {
        let issuer = issuer();
        for subject in ["a", "a", "b"] {
            let token = issuer
                .issue(TokenRequest::access(subject).scope("read"))
                .unwrap();
            store.save(token.id.clone().as_str(), token).await.unwrap();
        }
        let refresh = issuer.issue(TokenRequest::refresh("a")).unwrap();
        store.save(refresh.id.clone().as_str(), refresh).await.unwrap();

        assert_eq!(store.count(&TokenFilter::new()).await.unwrap(), 4);
        assert_eq!(store.count(&TokenFilter::new().subject("a")).await.unwrap(), 3);
        let access_a = TokenFilter::new()
            .subject("a")
            .token_type(TokenType::Access);
        assert_eq!(store.list(&access_a).await.unwrap().len(), 2);
    }

    pub(crate) async fn rotate_rules(store: &dyn TokenStore) {
        let issuer = issuer();
        let old = issuer.issue(TokenRequest::refresh("agent")).unwrap();
        let new = issuer.issue(TokenRequest::refresh("agent")).unwrap();
        store.save(old.id.as_str(), old.clone()).await.unwrap();

        store.rotate(&old, new.clone()).await.unwrap();
        let spent = store.get(old.id.as_str()).await.unwrap();
        assert_eq!(spent.revocation.unwrap().reason, ROTATED_REASON);
        assert!(store.validate(&new).await.is_ok());

        // Spent tokens cannot rotate again.
        let another = issuer.issue(TokenRequest::refresh("agent")).unwrap();
        assert!(matches!(
            store.rotate(&old, another).await,
            Err(TokenError::Revoked { .. })
        ));

        // Target already present.
        let fresh = issuer.issue(TokenRequest::refresh("agent")).unwrap();
        store.save(fresh.id.as_str(), fresh.clone()).await.unwrap();
        assert!(matches!(
            store.rotate(&new, fresh).await,
            Err(TokenError::Conflict { .. })
        ));
    }
}
