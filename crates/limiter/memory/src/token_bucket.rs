use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use weir_limiter::clock::{Clock, SystemClock};
use weir_limiter::error::LimiterError;
use weir_limiter::key::LimitKey;
use weir_limiter::limiter::RateLimiter;

/// Bucket state for one logical key.
///
/// `expires_at_ms` mirrors the TTL the shared-store variant puts on its
/// keys: a bucket untouched for a full window is as good as gone, and the
/// next touch re-initializes it.
#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill_ms: u64,
    expires_at_ms: u64,
}

impl Bucket {
    fn fresh(capacity: f64, now_ms: u64, window_ms: u64) -> Self {
        // First touch spends one token, so the first call is always allowed.
        Self {
            tokens: capacity - 1.0,
            last_refill_ms: now_ms,
            expires_at_ms: now_ms + window_ms,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// In-memory token-bucket [`RateLimiter`] backed by a [`DashMap`].
///
/// Tokens refill continuously at `quota / per_seconds` per second, capped
/// at the capacity (`burst`, or `quota` when no burst is set). Refill is
/// computed lazily on each access from the elapsed wall-clock time; the
/// injected [`Clock`] makes that deterministic in tests.
///
/// Correctness requires all callers to share one instance; per-key
/// atomicity comes from the map's entry guards.
#[derive(Debug)]
pub struct MemoryTokenBucket {
    buckets: DashMap<String, Bucket>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryTokenBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenBucket {
    /// Create a backend on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a backend on the given clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Drop every bucket that has sat untouched for a full window.
    ///
    /// Hosts call this on their own cadence to bound the map; the engine
    /// never spawns background work.
    pub fn prune(&self) {
        let now_ms = self.clock.now_millis();
        self.buckets.retain(|_, bucket| !bucket.is_expired(now_ms));
    }

    /// Number of live tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[async_trait]
impl RateLimiter for MemoryTokenBucket {
    async fn allow(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
    ) -> Result<bool, LimiterError> {
        self.allow_burst(key, quota, per_seconds, quota).await
    }

    #[allow(clippy::cast_precision_loss)]
    async fn allow_burst(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
        burst: u64,
    ) -> Result<bool, LimiterError> {
        let now_ms = self.clock.now_millis();
        let per = per_seconds.max(1);
        let capacity = burst.max(1) as f64;
        let rate = quota as f64 / per as f64;
        let window_ms = per * 1_000;

        // The entry guard makes refill-then-consume atomic per key.
        match self.buckets.entry(key.canonical()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let bucket = occupied.get_mut();

                if bucket.is_expired(now_ms) {
                    *bucket = Bucket::fresh(capacity, now_ms, window_ms);
                    return Ok(true);
                }

                let elapsed_secs = now_ms.saturating_sub(bucket.last_refill_ms) as f64 / 1_000.0;
                bucket.tokens = (bucket.tokens + elapsed_secs * rate).min(capacity);
                bucket.last_refill_ms = now_ms;
                bucket.expires_at_ms = now_ms + window_ms;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Bucket::fresh(capacity, now_ms, window_ms));
                Ok(true)
            }
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    async fn retry_after(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
    ) -> Result<Duration, LimiterError> {
        let now_ms = self.clock.now_millis();
        let per = per_seconds.max(1);
        let rate = quota as f64 / per as f64;

        let Some(bucket) = self.buckets.get(&key.canonical()) else {
            return Ok(Duration::ZERO);
        };
        if bucket.is_expired(now_ms) {
            // Next touch re-initializes and allows.
            return Ok(Duration::ZERO);
        }

        // Refresh without consuming; the cap is irrelevant below one token.
        let elapsed_secs = now_ms.saturating_sub(bucket.last_refill_ms) as f64 / 1_000.0;
        let tokens = bucket.tokens + elapsed_secs * rate;
        if tokens >= 1.0 {
            return Ok(Duration::ZERO);
        }
        if rate <= 0.0 {
            return Ok(Duration::from_secs(per));
        }

        let wait_secs = ((1.0 - tokens) / rate).ceil();
        Ok(Duration::from_secs(wait_secs as u64))
    }
}
