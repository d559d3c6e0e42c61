pub mod clock;
pub mod error;
pub mod key;
pub mod limiter;
pub mod noop;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LimiterError;
pub use key::LimitKey;
pub use limiter::RateLimiter;
pub use noop::NoopLimiter;
