//! The shared tier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use attorn_storage::KvStore;

use crate::error::{DistributedError, DistributedResult};

/// Namespace used by [`KvSharedCache`].
pub const SHARED_CACHE_NAMESPACE: &str = "shared-cache";

/// A cache shared between validator instances.
///
/// A missing entry is `Ok(None)`. Errors mean the cache could not be
/// reached; callers degrade rather than fail.
#[async_trait]
pub trait SharedCache: Send + Sync + std::fmt::Debug {
    /// Fetch a value.
    async fn get(&self, key: &str) -> DistributedResult<Option<String>>;

    /// Store a value for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> DistributedResult<()>;

    /// Remove a value. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> DistributedResult<()>;
}

/// A [`SharedCache`] over any [`KvStore`].
#[derive(Debug, Clone)]
pub struct KvSharedCache {
    kv: Arc<dyn KvStore>,
}

impl KvSharedCache {
    /// Use `kv` as the shared tier.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl SharedCache for KvSharedCache {
    async fn get(&self, key: &str) -> DistributedResult<Option<String>> {
        self.kv
            .get(SHARED_CACHE_NAMESPACE, key)
            .await?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| DistributedError::Cache(format!("entry {key} is not UTF-8: {e}")))
            })
            .transpose()
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DistributedResult<()> {
        self.kv
            .set_with_ttl(SHARED_CACHE_NAMESPACE, key, value.into_bytes(), ttl)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> DistributedResult<()> {
        self.kv.delete(SHARED_CACHE_NAMESPACE, key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attorn_storage::MemoryKvStore;

    #[tokio::test(start_paused = true)]
    async fn test_kv_shared_cache() {
        let cache = KvSharedCache::new(Arc::new(MemoryKvStore::new()));
        assert_eq!(cache.get("token:a").await.unwrap(), None);
        cache
            .set("token:a", "{}".into(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cache.get("token:a").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("token:a").await.unwrap(), None);
        cache.delete("token:a").await.unwrap();
    }
}
