//! In-memory token store.

use std::sync::Arc;

use async_trait::async_trait;
use attorn_core::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use super::locks::KeyedLocks;
use super::{Backend, TokenStore};
use crate::error::TokenResult;
use crate::filter::TokenFilter;
use crate::token::Token;
use crate::validation::DEFAULT_CLOCK_SKEW;

/// Process-local [`TokenStore`].
#[derive(Debug)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, Token>,
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
            locks: KeyedLocks::new(),
            clock: Arc::new(SystemClock),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
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

    /// Number of stored tokens, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Backend for MemoryTokenStore {
    async fn load(&self, key: &str) -> TokenResult<Option<Token>> {
        Ok(self.tokens.get(key).map(|entry| entry.value().clone()))
    }

    async fn persist(&self, key: &str, token: &Token) -> TokenResult<()> {
        self.tokens.insert(key.to_string(), token.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> TokenResult<bool> {
        Ok(self.tokens.remove(key).is_some())
    }

    async fn keys(&self) -> TokenResult<Vec<String>> {
        let mut keys: Vec<String> = self.tokens.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
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
impl TokenStore for MemoryTokenStore {
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

#[cfg(test)]
mod tests {
    use super::super::conformance;
    use super::*;
    use crate::error::TokenError;
    use crate::issuer::TokenRequest;
    use attorn_core::ManualClock;

    #[tokio::test]
    async fn test_conformance() {
        conformance::save_get_delete(&MemoryTokenStore::new()).await;
        conformance::validate_then_revoke(&MemoryTokenStore::new()).await;
        conformance::mismatch_is_not_not_found(&MemoryTokenStore::new()).await;
        conformance::list_and_count(&MemoryTokenStore::new()).await;
        conformance::rotate_rules(&MemoryTokenStore::new()).await;
    }

    #[tokio::test]
    async fn test_expiry_and_cleanup() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = MemoryTokenStore::new().with_clock(clock.clone());
        let issuer = conformance::issuer().with_clock(clock.clone());

        let short = issuer
            .issue(TokenRequest::access("a").ttl(Duration::minutes(1)))
            .unwrap();
        let long = issuer.issue(TokenRequest::access("b")).unwrap();
        store.save(short.id.as_str(), short.clone()).await.unwrap();
        store.save(long.id.as_str(), long.clone()).await.unwrap();

        // Inside the skew window the token still validates.
        clock.advance(Duration::seconds(80));
        assert!(store.validate(&short).await.is_ok());
        assert_eq!(store.cleanup().await.unwrap(), 0);

        clock.advance(Duration::minutes(5));
        assert!(matches!(
            store.validate(&short).await,
            Err(TokenError::Expired { .. })
        ));
        assert_eq!(store.cleanup().await.unwrap(), 1);
        assert_eq!(store.cleanup().await.unwrap(), 0);
        assert_eq!(store.len(), 1);
        assert!(store.get(long.id.as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn test_not_yet_valid() {
        let store = MemoryTokenStore::new();
        let start = Utc::now() + Duration::minutes(10);
        let token = conformance::issuer()
            .issue(TokenRequest::access("a").not_before(start))
            .unwrap();
        store.save(token.id.as_str(), token.clone()).await.unwrap();
        assert!(matches!(
            store.validate(&token).await,
            Err(TokenError::NotYetValid { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_validate_and_revoke() {
        let store = Arc::new(MemoryTokenStore::new());
        let token = conformance::issuer()
            .issue(TokenRequest::access("a"))
            .unwrap();
        store.save(token.id.as_str(), token.clone()).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                if i == 8 {
                    store.revoke(&token, "race", "test").await.map(|_| ())
                } else {
                    store.validate(&token).await.map(|_| ())
                }
            }));
        }
        for result in futures::future::join_all(tasks).await {
            match result.unwrap() {
                Ok(()) | Err(TokenError::Revoked { .. }) => {},
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // Whatever the interleaving, the revocation sticks.
        assert!(store.get(token.id.as_str()).await.unwrap().is_revoked());
        assert!(matches!(
            store.validate(&token).await,
            Err(TokenError::Revoked { .. })
        ));
    }
}
