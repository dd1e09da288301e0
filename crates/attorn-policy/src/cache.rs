//! Cache of attributes gathered from data sources.
//!
//! Entries are keyed `{source}:{subject}:{resource}:{action}` and live for a
//! fixed TTL. When the cache is full, expired entries are purged first and
//! then the oldest insertion is evicted. Only the decision point writes.

use std::time::Duration;

use attorn_core::ClaimMap;
use dashmap::DashMap;
use tokio::time::Instant;

/// Default entry lifetime.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(60);

/// Default entry bound.
pub const DEFAULT_CONTEXT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    attributes: ClaimMap,
    inserted_at: Instant,
    expires_at: Instant,
}

/// TTL-bounded cache of data-source results.
#[derive(Debug)]
pub struct ContextCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_TTL, DEFAULT_CONTEXT_CAPACITY)
    }
}

impl ContextCache {
    /// A cache holding at most `max_entries` for `ttl` each.
    ///
    /// A zero `max_entries` disables caching.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// The cache key for a data-source lookup.
    #[must_use]
    pub fn key(source: &str, subject: &str, resource: &str, action: &str) -> String {
        format!("{source}:{subject}:{resource}:{action}")
    }

    /// Cached attributes, if present and fresh.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ClaimMap> {
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|entry| {
            (entry.expires_at > now).then(|| entry.attributes.clone())
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        hit
    }

    /// Store attributes under `key`.
    pub fn insert(&self, key: String, attributes: ClaimMap) {
        if self.max_entries == 0 {
            return;
        }
        let now = Instant::now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            Entry {
                attributes,
                inserted_at: now,
                expires_at: now.checked_add(self.ttl).unwrap_or(now),
            },
        );
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Number of entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
