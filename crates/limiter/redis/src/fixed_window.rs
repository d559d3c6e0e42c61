use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use weir_limiter::clock::{Clock, SystemClock};
use weir_limiter::error::LimiterError;
use weir_limiter::key::LimitKey;
use weir_limiter::limiter::RateLimiter;

use crate::config::RedisLimiterConfig;

/// Redis-backed fixed-window [`RateLimiter`].
///
/// Counters live at `{prefix}:fw:{key}:{window_start}:{per_seconds}` and
/// are advanced with `INCR`. The window TTL is set exactly once: on the
/// increment that created the key, or on a later call that finds the key
/// without a TTL (a crash between `INCR` and `PEXPIRE` would otherwise
/// strand the counter forever).
pub struct RedisFixedWindow {
    pool: Pool,
    prefix: String,
}

impl RedisFixedWindow {
    /// Create a backend from the provided configuration.
    ///
    /// The pool is lazy; this validates the URL but does not connect.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisLimiterConfig) -> Result<Self, LimiterError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| LimiterError::Connection(e.to_string()))?
            .map_err(|e| LimiterError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, LimiterError> {
        self.pool
            .get()
            .await
            .map_err(|e| LimiterError::Connection(e.to_string()))
    }

    fn window_key(&self, key: &LimitKey, window_start: u64, per: u64) -> String {
        format!(
            "{}:fw:{}:{}:{}",
            self.prefix,
            key.canonical(),
            window_start,
            per
        )
    }

    fn current_window(per: u64) -> u64 {
        let now_secs = SystemClock.now_millis() / 1_000;
        now_secs - (now_secs % per)
    }
}

#[async_trait]
impl RateLimiter for RedisFixedWindow {
    async fn allow(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
    ) -> Result<bool, LimiterError> {
        let per = per_seconds.max(1);
        let window_start = Self::current_window(per);
        let redis_key = self.window_key(key, window_start, per);
        let window_ms = i64::try_from(per * 1_000).unwrap_or(i64::MAX);

        let mut conn = self.conn().await?;
        let count: i64 = conn
            .incr(&redis_key, 1)
            .await
            .map_err(|e| LimiterError::Backend(e.to_string()))?;

        if count == 1 {
            let () = conn
                .pexpire(&redis_key, window_ms)
                .await
                .map_err(|e| LimiterError::Backend(e.to_string()))?;
        } else {
            // A crash between INCR and PEXPIRE leaves a counter with no
            // TTL; any later call repairs it.
            let ttl_ms: i64 = conn
                .pttl(&redis_key)
                .await
                .map_err(|e| LimiterError::Backend(e.to_string()))?;
            if ttl_ms < 0 {
                let () = conn
                    .pexpire(&redis_key, window_ms)
                    .await
                    .map_err(|e| LimiterError::Backend(e.to_string()))?;
            }
        }

        Ok(u64::try_from(count).unwrap_or(u64::MAX) <= quota)
    }

    async fn retry_after(
        &self,
        key: &LimitKey,
        _quota: u64,
        per_seconds: u64,
    ) -> Result<Duration, LimiterError> {
        let per = per_seconds.max(1);
        let window_start = Self::current_window(per);
        let redis_key = self.window_key(key, window_start, per);

        let mut conn = self.conn().await?;
        let ttl_ms: i64 = conn
            .pttl(&redis_key)
            .await
            .map_err(|e| LimiterError::Backend(e.to_string()))?;

        match u64::try_from(ttl_ms) {
            Ok(ms) => Ok(Duration::from_millis(ms)),
            // PTTL answers a negative sentinel when the key or its TTL is
            // missing; report the full window as the upper bound.
            Err(_) => Ok(Duration::from_secs(per)),
        }
    }
}


#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use weir_limiter::testing::run_limiter_conformance_tests;

    use super::*;

    fn test_config() -> RedisLimiterConfig {
        RedisLimiterConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("weir-test-{}", uuid::Uuid::new_v4()),
            ..RedisLimiterConfig::default()
        }
    }

    #[tokio::test]
    async fn conformance() {
        let limiter = RedisFixedWindow::new(&test_config()).expect("pool creation should succeed");
        run_limiter_conformance_tests(&limiter)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn window_expires_and_resets() {
        let limiter = RedisFixedWindow::new(&test_config()).expect("pool creation should succeed");
        let key = LimitKey::new("orders", "expiry");

        limiter.allow(&key, 1, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert!(
            limiter.allow(&key, 1, 1).await.unwrap(),
            "a fresh window should reset the counter"
        );
    }

    #[tokio::test]
    async fn retry_after_positive_while_blocked() {
        let limiter = RedisFixedWindow::new(&test_config()).expect("pool creation should succeed");
        let key = LimitKey::new("orders", "blocked");

        limiter.allow(&key, 1, 60).await.unwrap();
        assert!(!limiter.allow(&key, 1, 60).await.unwrap());

        let wait = limiter.retry_after(&key, 1, 60).await.unwrap();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(60));
    }
}
