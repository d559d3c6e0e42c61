use std::time::Duration;

use thiserror::Error;

use crate::types::LimitName;

/// The one user-visible rejection: a limit was exceeded.
///
/// Always recoverable by retrying after [`LimitExceeded::retry_after`].
/// Every other failure inside the engine is handled locally (clamped,
/// degraded, or swallowed) and never reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit '{limit}' exceeded, retry after {}s", self.retry_after_secs())]
pub struct LimitExceeded {
    /// Symbolic name of the limit that blocked the call.
    pub limit: LimitName,
    /// How long the caller should wait before retrying.
    pub retry_after: Duration,
}

impl LimitExceeded {
    /// Create a rejection for the named limit.
    #[must_use]
    pub fn new(limit: impl Into<LimitName>, retry_after: Duration) -> Self {
        Self {
            limit: limit.into(),
            retry_after,
        }
    }

    /// Retry delay in whole seconds, rounded up so the wait is never
    /// under-reported. Suitable for a `Retry-After` header.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}
