//! Request admission.
//!
//! Two limits apply to every engine request:
//! - a token bucket per subject, refilled continuously at `rate` per second
//!   up to `burst`; an empty bucket refuses the request immediately
//! - a global cap on requests in flight, enforced by a FIFO-fair semaphore;
//!   waiting for a slot is cancelled by dropping the future

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Subjects tracked before full buckets are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained requests per second per subject.
    pub per_subject_rate: f64,
    /// Requests a subject may make back to back.
    pub per_subject_burst: u32,
    /// Requests in flight across all subjects.
    pub max_in_flight: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_subject_rate: 10.0,
            per_subject_burst: 20,
            max_in_flight: 256,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = elapsed.mul_add(rate, self.tokens).min(burst);
        self.refilled_at = now;
    }
}

/// Per-subject token buckets plus a global in-flight cap.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
    in_flight: Arc<Semaphore>,
}

impl RateLimiter {
    /// A limiter with `config`.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            buckets: DashMap::new(),
            config,
        }
    }

    /// Effective settings.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one token from `subject`'s bucket.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RateLimited`] if the bucket is empty.
    pub fn check(&self, subject: &str) -> EngineResult<()> {
        let now = Instant::now();
        let burst = f64::from(self.config.per_subject_burst.max(1));
        if self.buckets.len() >= PRUNE_THRESHOLD {
            self.prune_full(now);
        }

        let mut bucket = self.buckets.entry(subject.to_string()).or_insert(Bucket {
            tokens: burst,
            refilled_at: now,
        });
        bucket.refill(now, self.config.per_subject_rate, burst);
        if bucket.tokens < 1.0 {
            debug!(subject, "rate limited");
            return Err(EngineError::RateLimited {
                subject: subject.to_string(),
            });
        }
        bucket.tokens -= 1.0;
        Ok(())
    }

    /// Wait for an in-flight slot. Slots are granted in arrival order and
    /// released when the permit drops.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ShuttingDown`] once [`close`](Self::close) has
    /// been called.
    pub async fn acquire(&self) -> EngineResult<OwnedSemaphorePermit> {
        Arc::clone(&self.in_flight)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::ShuttingDown)
    }

    /// Refuse all further slots. Waiters are woken with an error.
    pub fn close(&self) {
        self.in_flight.close();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.in_flight.is_closed()
    }

    /// Free in-flight slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.in_flight.available_permits()
    }

    /// Number of subjects with a bucket.
    #[must_use]
    pub fn tracked_subjects(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets that have refilled completely; they are
    /// indistinguishable from new ones.
    fn prune_full(&self, now: Instant) {
        let burst = f64::from(self.config.per_subject_burst.max(1));
        let rate = self.config.per_subject_rate;
        self.buckets.retain(|_, bucket| {
            let mut refilled = *bucket;
            refilled.refill(now, rate, burst);
            refilled.tokens < burst
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(rate: f64, burst: u32, in_flight: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            per_subject_rate: rate,
            per_subject_burst: burst,
            max_in_flight: in_flight,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_burst_and_refill() {
        let limiter = limiter(2.0, 3, 8);
        for _ in 0..3 {
            limiter.check("agent").unwrap();
        }
        let err = limiter.check("agent").unwrap_err();
        assert_eq!(err.code(), "rate_limited");

        // Other subjects have their own bucket.
        limiter.check("other").unwrap();

        // Half a second at 2/s refills one token.
        tokio::time::advance(Duration::from_millis(500)).await;
        limiter.check("agent").unwrap();
        assert!(limiter.check("agent").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_burst() {
        let limiter = limiter(100.0, 2, 8);
        tokio::time::advance(Duration::from_secs(60)).await;
        limiter.check("agent").unwrap();
        limiter.check("agent").unwrap();
        assert!(limiter.check("agent").is_err());
    }

    #[tokio::test]
    async fn test_in_flight_cap_is_fifo() {
        let limiter = Arc::new(limiter(10.0, 10, 1));
        let first = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await.map(drop) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_is_cancellable() {
        let limiter = limiter(10.0, 10, 1);
        let held = limiter.acquire().await.unwrap();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(timed_out.is_err());
        drop(held);
        // The abandoned wait did not consume a slot.
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let limiter = Arc::new(limiter(10.0, 10, 1));
        let _held = limiter.acquire().await.unwrap();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await.map(drop) })
        };
        tokio::task::yield_now().await;
        limiter.close();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::ShuttingDown));
        assert!(limiter.is_closed());
    }
}
