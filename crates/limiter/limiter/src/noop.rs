use std::time::Duration;

use async_trait::async_trait;

use crate::error::LimiterError;
use crate::key::LimitKey;
use crate::limiter::RateLimiter;

/// Backend that allows everything and never asks callers to wait.
///
/// The default when limiting is disabled, and the degradation target when
/// a real backend cannot be constructed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLimiter;

impl NoopLimiter {
    /// Create a new no-op limiter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RateLimiter for NoopLimiter {
    async fn allow(
        &self,
        _key: &LimitKey,
        _quota: u64,
        _per_seconds: u64,
    ) -> Result<bool, LimiterError> {
        Ok(true)
    }

    async fn retry_after(
        &self,
        _key: &LimitKey,
        _quota: u64,
        _per_seconds: u64,
    ) -> Result<Duration, LimiterError> {
        Ok(Duration::ZERO)
    }
}
