//! Redis rate limiter backends for Weir.
//!
//! This crate provides shared-store implementations of the
//! [`RateLimiter`] trait from `weir-limiter`, for fleets where every
//! process must count against the same limits.
//!
//! # Backends
//!
//! - **Fixed window** ([`RedisFixedWindow`]): one counter per
//!   `(key, window)`, advanced with `INCR`; the window TTL is set exactly
//!   once, with a recovery check for the crash-between-commands case.
//! - **Token bucket** ([`RedisTokenBucket`]): refill-and-consume runs as
//!   a single server-side Lua script, so concurrent callers on one key
//!   cannot interleave inside the read-modify-write.
//!
//! Both backends use a `deadpool-redis` connection pool. Construction
//! fails with [`LimiterError::Connection`] when the pool cannot be built;
//! the enforcement layer degrades to its no-op backend in that case.
//!
//! # Integration tests
//!
//! Tests that need a live Redis run behind the `integration` feature and
//! read the instance URL from `REDIS_URL`:
//!
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo test -p weir-limiter-redis --features integration
//! ```
//!
//! [`RateLimiter`]: weir_limiter::RateLimiter
//! [`LimiterError::Connection`]: weir_limiter::LimiterError::Connection

mod config;
mod fixed_window;
mod scripts;
mod token_bucket;

pub use config::RedisLimiterConfig;
pub use fixed_window::RedisFixedWindow;
pub use token_bucket::RedisTokenBucket;
