//! Token blacklist consulted at the revocation stage.

use attorn_core::TokenId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Answers whether a token ID has been revoked out of band.
pub trait RevocationCheck: Send + Sync + std::fmt::Debug {
    /// Whether `id` is revoked as of `now`.
    fn is_revoked(&self, id: &TokenId, now: DateTime<Utc>) -> bool;
}

/// Blacklist of token IDs with expiring entries.
///
/// An entry only needs to live as long as the token it blocks: once the
/// token has expired the expiry stage rejects it anyway, so [`prune`]
/// drops the entry.
///
/// [`prune`]: RevocationList::prune
#[derive(Debug, Default)]
pub struct RevocationList {
    entries: DashMap<TokenId, DateTime<Utc>>,
}

impl RevocationList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blacklist `id` until `until`. Re-adding extends to the later expiry.
    pub fn revoke(&self, id: TokenId, until: DateTime<Utc>) {
        self.entries
            .entry(id)
            .and_modify(|existing| *existing = (*existing).max(until))
            .or_insert(until);
    }

    /// Drop an entry. Returns whether it existed.
    pub fn remove(&self, id: &TokenId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop entries whose token has expired by `now`. Returns the count.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, until| *until >= now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RevocationCheck for RevocationList {
    fn is_revoked(&self, id: &TokenId, now: DateTime<Utc>) -> bool {
        self.entries.get(id).is_some_and(|until| *until >= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_revoke_and_check() {
        let list = RevocationList::new();
        let now = Utc::now();
        let id = TokenId::new();
        assert!(!list.is_revoked(&id, now));

        list.revoke(id.clone(), now + Duration::hours(1));
        assert!(list.is_revoked(&id, now));
        assert!(!list.is_revoked(&TokenId::new(), now));
    }

    #[test]
    fn test_prune_drops_expired_entries() {
        let list = RevocationList::new();
        let now = Utc::now();
        let stale = TokenId::new();
        let live = TokenId::new();
        list.revoke(stale.clone(), now - Duration::minutes(1));
        list.revoke(live.clone(), now + Duration::minutes(1));

        assert_eq!(list.prune(now), 1);
        assert_eq!(list.len(), 1);
        assert!(list.is_revoked(&live, now));
        assert!(!list.is_revoked(&stale, now));
    }

    #[test]
    fn test_revoke_keeps_later_expiry() {
        let list = RevocationList::new();
        let now = Utc::now();
        let id = TokenId::new();
        list.revoke(id.clone(), now + Duration::hours(2));
        list.revoke(id.clone(), now + Duration::hours(1));
        assert!(list.is_revoked(&id, now + Duration::minutes(90)));
    }
}
