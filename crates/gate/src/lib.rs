pub mod builder;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod registry;

pub use builder::GateBuilder;
pub use config::{BackendKind, GateConfig, RedisSettings};
pub use error::GateError;
pub use gate::{CheckRequest, Gate};
pub use metrics::{GateMetrics, MetricsSnapshot};
pub use registry::LimitRegistry;

pub use weir_core::{
    FlagSource, LimitDefinition, LimitExceeded, LimitName, LimitSource, MetricsSink, StaticFlags,
    Strategy, TenantId,
};
pub use weir_limiter::{LimitKey, LimiterError, RateLimiter};
