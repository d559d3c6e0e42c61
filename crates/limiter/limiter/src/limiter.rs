use std::time::Duration;

use async_trait::async_trait;

use crate::error::LimiterError;
use crate::key::LimitKey;

/// Trait for rate limiter backends.
///
/// Implementations must be `Send + Sync` and safe for concurrent access:
/// two concurrent `allow` calls on the same key must never both win the
/// last unit of capacity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one unit of usage against `key` and decide whether the call
    /// may proceed under `quota` units per `per_seconds`.
    async fn allow(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
    ) -> Result<bool, LimiterError>;

    /// Burst-aware variant of [`allow`](Self::allow): token-bucket
    /// backends refill at `quota / per_seconds` but hold up to `burst`
    /// tokens. Window backends have no burst concept and delegate to
    /// `allow`.
    async fn allow_burst(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
        burst: u64,
    ) -> Result<bool, LimiterError> {
        let _ = burst;
        self.allow(key, quota, per_seconds).await
    }

    /// How long a blocked caller should wait before `key` can be allowed
    /// again under `quota` units per `per_seconds`. Always `>= 0`, and
    /// `> 0` whenever the most recent `allow` on `key` returned `false`.
    ///
    /// Token-bucket backends need the full limit to derive the refill
    /// rate; window backends only use `per_seconds` for the boundary.
    async fn retry_after(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
    ) -> Result<Duration, LimiterError>;
}
