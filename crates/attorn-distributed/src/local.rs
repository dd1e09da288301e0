//! The in-process tier.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::record::ValidationRecord;

/// Default bound on local entries.
pub const DEFAULT_LOCAL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    record: ValidationRecord,
    expires_at: Instant,
}

/// TTL-bounded map of token ID to validation record.
///
/// When full, expired entries are purged first, then the entry closest to
/// expiry is evicted.
#[derive(Debug)]
pub struct LocalCache {
    entries: DashMap<String, Entry>,
    max_entries: usize,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_CAPACITY)
    }
}

impl LocalCache {
    /// A cache of at most `max_entries`. Zero disables it.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// The fresh record for `token_id`.
    #[must_use]
    pub fn get(&self, token_id: &str) -> Option<ValidationRecord> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(token_id)
            .and_then(|entry| (entry.expires_at > now).then(|| entry.record.clone()));
        if hit.is_none() {
            self.entries
                .remove_if(token_id, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    /// Store `record` for `ttl`.
    pub fn insert(&self, record: ValidationRecord, ttl: Duration) {
        if self.max_entries == 0 || ttl.is_zero() {
            return;
        }
        let key = record.token_id.to_string();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            let now = Instant::now();
            self.entries.retain(|_, entry| entry.expires_at > now);
            if self.entries.len() >= self.max_entries {
                let soonest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.expires_at)
                    .map(|entry| entry.key().clone());
                if let Some(soonest) = soonest {
                    self.entries.remove(&soonest);
                }
            }
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                record,
                expires_at: now.checked_add(ttl).unwrap_or(now),
            },
        );
    }

    /// Drop the record for `token_id`. Returns whether one was present.
    pub fn remove(&self, token_id: &str) -> bool {
        self.entries.remove(token_id).is_some()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Token IDs revoked through this instance or its peers.
///
/// Entries outlive any positive record written before the revocation, so a
/// validation racing the revocation cannot bring the token back.
#[derive(Debug, Default)]
pub struct RevokedIds {
    ids: DashMap<String, Instant>,
}

impl RevokedIds {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `token_id` as revoked for `ttl`.
    pub fn insert(&self, token_id: &str, ttl: Duration) {
        let now = Instant::now();
        let until = now.checked_add(ttl).unwrap_or(now);
        self.ids
            .entry(token_id.to_string())
            .and_modify(|at| *at = (*at).max(until))
            .or_insert(until);
    }

    /// Whether `token_id` is known to be revoked.
    #[must_use]
    pub fn contains(&self, token_id: &str) -> bool {
        let now = Instant::now();
        let live = self.ids.get(token_id).is_some_and(|until| *until > now);
        if !live {
            self.ids.remove_if(token_id, |_, until| *until <= now);
        }
        live
    }

    /// Drop expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.ids.len();
        self.ids.retain(|_, until| *until > now);
        before.saturating_sub(self.ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attorn_core::TokenId;
    use chrono::Utc;

    fn record(id: &str) -> ValidationRecord {
        ValidationRecord::rejected(TokenId::from_string(id), "v", "expired", Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_and_eviction() {
        let cache = LocalCache::new(2);
        cache.insert(record("a"), Duration::from_secs(10));
        cache.insert(record("b"), Duration::from_secs(60));
        cache.insert(record("c"), Duration::from_secs(60));
        // "a" expired soonest and was evicted.
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoked_ids_expire() {
        let revoked = RevokedIds::new();
        revoked.insert("a", Duration::from_secs(30));
        revoked.insert("a", Duration::from_secs(5));
        assert!(revoked.contains("a"));
        assert!(!revoked.contains("b"));

        tokio::time::advance(Duration::from_secs(10)).await;
        // The longer lifetime wins.
        assert!(revoked.contains("a"));
        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(revoked.purge_expired(), 1);
        assert!(!revoked.contains("a"));
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = LocalCache::new(2);
        cache.insert(record("a"), Duration::ZERO);
        assert!(cache.is_empty());
    }
}
