use std::time::Duration;

use crate::error::LimiterError;
use crate::key::LimitKey;
use crate::limiter::RateLimiter;

fn test_key(id: &str) -> LimitKey {
    LimitKey::new("conformance", id)
}

/// Run the rate limiter conformance test suite.
///
/// Call this from your backend's test module with a fresh instance. For
/// shared-store backends, construct the instance with a unique key prefix
/// so reruns start from a clean keyspace.
///
/// The suite uses no clock control: every property here must hold without
/// advancing time. Window-reset and refill behavior are backend-specific
/// and tested next to each backend.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_limiter_conformance_tests(limiter: &dyn RateLimiter) -> Result<(), LimiterError> {
    test_quota_exhaustion(limiter).await?;
    test_single_unit_quota(limiter).await?;
    test_retry_after_bounds(limiter).await?;
    test_keys_independent(limiter).await?;
    test_burst_capacity(limiter).await?;
    Ok(())
}

async fn test_quota_exhaustion(limiter: &dyn RateLimiter) -> Result<(), LimiterError> {
    let key = test_key("exhaustion");
    for i in 0..3 {
        let allowed = limiter.allow(&key, 3, 60).await?;
        assert!(allowed, "call {} of 3 should be allowed", i + 1);
    }
    let allowed = limiter.allow(&key, 3, 60).await?;
    assert!(!allowed, "call 4 should be blocked at quota 3");
    Ok(())
}

async fn test_single_unit_quota(limiter: &dyn RateLimiter) -> Result<(), LimiterError> {
    let key = test_key("single-unit");
    let first = limiter.allow(&key, 1, 60).await?;
    assert!(first, "first call at quota 1 should be allowed");
    let second = limiter.allow(&key, 1, 60).await?;
    assert!(!second, "second call at quota 1 should be blocked");
    Ok(())
}

async fn test_retry_after_bounds(limiter: &dyn RateLimiter) -> Result<(), LimiterError> {
    let key = test_key("retry-after");
    limiter.allow(&key, 1, 60).await?;
    let blocked = limiter.allow(&key, 1, 60).await?;
    assert!(!blocked, "key should be exhausted");

    let wait = limiter.retry_after(&key, 1, 60).await?;
    assert!(
        wait > Duration::ZERO,
        "retry_after should be positive after a block, got {wait:?}"
    );
    assert!(
        wait <= Duration::from_secs(60),
        "retry_after should never exceed the window, got {wait:?}"
    );
    Ok(())
}

async fn test_keys_independent(limiter: &dyn RateLimiter) -> Result<(), LimiterError> {
    let first = test_key("indep-a");
    let second = test_key("indep-b");

    limiter.allow(&first, 1, 60).await?;
    let blocked = limiter.allow(&first, 1, 60).await?;
    assert!(!blocked, "first key should be exhausted");

    let allowed = limiter.allow(&second, 1, 60).await?;
    assert!(allowed, "second key should be unaffected by the first");
    Ok(())
}

async fn test_burst_capacity(limiter: &dyn RateLimiter) -> Result<(), LimiterError> {
    let key = test_key("burst");
    for i in 0..2 {
        let allowed = limiter.allow_burst(&key, 2, 60, 4).await?;
        assert!(allowed, "call {} of quota 2 should be allowed", i + 1);
    }
    // Window backends block from call 3; bucket backends keep allowing
    // up to the burst capacity of 4. Both must block call 5.
    let mut last = true;
    for _ in 2..5 {
        last = limiter.allow_burst(&key, 2, 60, 4).await?;
    }
    assert!(!last, "call 5 should be blocked at burst capacity 4");
    Ok(())
}
