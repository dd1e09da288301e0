//! Background eviction of expired tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::revocation::RevocationList;
use crate::store::TokenStore;

/// Periodically runs [`TokenStore::cleanup`] and prunes the blacklist.
///
/// Each pass is idempotent. Dropping the worker aborts the task; use
/// [`shutdown`](Self::shutdown) to let an in-flight pass finish first.
#[derive(Debug)]
pub struct CleanupWorker {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CleanupWorker {
    /// Spawn the loop on the current runtime. The first pass runs
    /// immediately.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn TokenStore>,
        revocations: Option<Arc<RevocationList>>,
        interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {},
                }
                match store.cleanup().await {
                    Ok(0) => {},
                    Ok(evicted) => debug!(evicted, "evicted expired tokens"),
                    Err(e) => warn!(error = %e, "token cleanup failed"),
                }
                if let Some(list) = &revocations {
                    let pruned = list.prune(Utc::now());
                    if pruned > 0 {
                        debug!(pruned, "pruned revocation list");
                    }
                }
            }
            debug!("token cleanup worker stopped");
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// A token that stops the worker when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop, waiting up to `grace` for the current pass. Returns
    /// `true` on a clean stop, `false` if the task had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return true;
        };
        if let Ok(joined) = tokio::time::timeout(grace, &mut handle).await {
            joined.is_ok()
        } else {
            info!(grace_ms = grace.as_millis(), "cleanup worker aborted after grace period");
            handle.abort();
            false
        }
    }
}

impl Drop for CleanupWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{TokenIssuer, TokenRequest};
    use crate::store::MemoryTokenStore;
    use attorn_core::{ManualClock, TokenId};
    use attorn_crypto::KeyPair;

    #[tokio::test(start_paused = true)]
    async fn test_worker_evicts_and_stops() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryTokenStore::new().with_clock(clock.clone()));
        let issuer = TokenIssuer::new(Arc::new(KeyPair::generate()), "iss").with_clock(clock.clone());
        let token = issuer
            .issue(TokenRequest::access("a").ttl(chrono::Duration::seconds(5)))
            .unwrap();
        store.save(token.id.clone().as_str(), token).await.unwrap();

        let revocations = Arc::new(RevocationList::new());
        revocations.revoke(TokenId::new(), Utc::now() - chrono::Duration::hours(1));

        let worker = CleanupWorker::spawn(
            store.clone(),
            Some(revocations.clone()),
            Duration::from_secs(60),
        );
        clock.advance(chrono::Duration::minutes(5));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(store.is_empty());
        assert!(revocations.is_empty());
        assert!(worker.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let worker = CleanupWorker::spawn(store, None, Duration::from_millis(10));
        worker.cancellation_token().cancel();
        assert!(worker.shutdown(Duration::from_secs(1)).await);
    }
}
