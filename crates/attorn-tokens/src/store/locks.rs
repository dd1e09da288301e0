//! Per-key async mutexes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutex per key.
///
/// Guards are owned, so they can be held across awaits and moved into
/// spawned tasks.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it if needed.
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out before awaiting so no map shard stays locked.
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Acquire two keys in a fixed order. Returns a single guard when the
    /// keys are equal.
    pub(crate) async fn lock_pair(
        &self,
        a: &str,
        b: &str,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        match a.cmp(b) {
            std::cmp::Ordering::Equal => (self.lock(a).await, None),
            std::cmp::Ordering::Less => {
                let first = self.lock(a).await;
                (first, Some(self.lock(b).await))
            },
            std::cmp::Ordering::Greater => {
                let first = self.lock(b).await;
                (first, Some(self.lock(a).await))
            },
        }
    }

    /// Forget locks nobody holds. Returns how many were dropped.
    pub(crate) fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}
