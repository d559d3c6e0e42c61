pub mod error;
pub mod flag;
pub mod limit;
pub mod telemetry;
pub mod types;

pub use error::LimitExceeded;
pub use flag::{FlagSource, StaticFlags};
pub use limit::{
    FALLBACK_PER_SECONDS, FALLBACK_QUOTA, LimitDefinition, LimitSource, MAX_PER_SECONDS,
    MIN_PER_SECONDS, MIN_QUOTA, Strategy, scoped_key,
};
pub use telemetry::{EVENT_HIT, EVENT_LOOKUP, MetricsSink, NullSink, RecordedEvent, RecordingSink};
pub use types::{LimitName, TenantId};
