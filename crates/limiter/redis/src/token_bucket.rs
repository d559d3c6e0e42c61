use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use weir_limiter::clock::{Clock, SystemClock};
use weir_limiter::error::LimiterError;
use weir_limiter::key::LimitKey;
use weir_limiter::limiter::RateLimiter;

use crate::config::RedisLimiterConfig;
use crate::scripts;

/// Redis-backed token-bucket [`RateLimiter`].
///
/// Bucket state is packed as `<tokens>:<last_refill_ms>` at
/// `{prefix}:tb:{key}` and refreshed atomically by a Lua script, so
/// concurrent callers over one key never double-spend a token. The key
/// carries a TTL of one full refill window and idle buckets simply expire.
pub struct RedisTokenBucket {
    pool: Pool,
    prefix: String,
}

impl RedisTokenBucket {
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

    fn bucket_key(&self, key: &LimitKey) -> String {
        format!("{}:tb:{}", self.prefix, key.canonical())
    }
}

/// Parse the packed `<tokens>:<last_refill_ms>` bucket state.
fn parse_state(state: &str) -> Result<(f64, u64), LimiterError> {
    let (tokens, last_ms) = state
        .split_once(':')
        .ok_or_else(|| LimiterError::Serialization(format!("malformed bucket state: {state}")))?;
    let tokens = tokens
        .parse::<f64>()
        .map_err(|e| LimiterError::Serialization(format!("bucket tokens: {e}")))?;
    let last_ms = last_ms
        .parse::<u64>()
        .map_err(|e| LimiterError::Serialization(format!("bucket timestamp: {e}")))?;
    Ok((tokens, last_ms))
}

#[async_trait]
impl RateLimiter for RedisTokenBucket {
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
        let per = per_seconds.max(1);
        let now_ms = SystemClock.now_millis();
        let capacity = burst.max(1);
        let rate_per_ms = quota as f64 / (per * 1_000) as f64;
        let window_ms = per * 1_000;
        let redis_key = self.bucket_key(key);

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::TOKEN_BUCKET);
        let result: Vec<i64> = script
            .key(&redis_key)
            .arg(now_ms)
            .arg(capacity)
            .arg(rate_per_ms)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LimiterError::Backend(e.to_string()))?;

        match result.first() {
            Some(allowed) => Ok(*allowed == 1),
            None => Err(LimiterError::Backend(
                "unexpected token bucket script response".to_string(),
            )),
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
        let per = per_seconds.max(1);
        let now_ms = SystemClock.now_millis();
        let rate = quota as f64 / per as f64;
        let redis_key = self.bucket_key(key);

        let mut conn = self.conn().await?;
        let state: Option<String> = conn
            .get(&redis_key)
            .await
            .map_err(|e| LimiterError::Backend(e.to_string()))?;
        let Some(state) = state else {
            // A missing bucket means the next call starts fresh.
            return Ok(Duration::ZERO);
        };
        let (tokens, last_ms) = parse_state(&state)?;

        // Refresh client-side without consuming, mirroring the script's
        // refill arithmetic.
        let elapsed_secs = now_ms.saturating_sub(last_ms) as f64 / 1_000.0;
        let tokens = tokens + elapsed_secs * rate;
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
