use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use weir_core::{FlagSource, MetricsSink, NullSink, Strategy};
use weir_limiter::{NoopLimiter, RateLimiter};
use weir_limiter_memory::{MemoryFixedWindow, MemoryTokenBucket};
use weir_limiter_redis::{RedisFixedWindow, RedisTokenBucket};

use crate::config::{BackendKind, GateConfig};
use crate::gate::Gate;
use crate::metrics::GateMetrics;
use crate::registry::LimitRegistry;

/// Fluent builder for constructing a [`Gate`] instance.
///
/// Nothing is required: missing backends default to the no-op limiter,
/// a missing registry starts empty, and a missing sink drops events.
pub struct GateBuilder {
    fixed_window: Option<Arc<dyn RateLimiter>>,
    token_bucket: Option<Arc<dyn RateLimiter>>,
    registry: Option<Arc<LimitRegistry>>,
    flags: Option<Arc<dyn FlagSource>>,
    sink: Arc<dyn MetricsSink>,
    limits: Option<(Value, Value)>,
    default_strategy: Strategy,
    dark_launch: bool,
    flag_default: bool,
    construction_degraded: bool,
}

impl GateBuilder {
    /// Create a new builder with every field at its default.
    pub fn new() -> Self {
        Self {
            fixed_window: None,
            token_bucket: None,
            registry: None,
            flags: None,
            sink: Arc::new(NullSink),
            limits: None,
            default_strategy: Strategy::default(),
            dark_launch: true,
            flag_default: false,
            construction_degraded: false,
        }
    }

    /// Preconfigure a builder from a parsed configuration document.
    ///
    /// Backend construction failures degrade to the no-op limiter with a
    /// warning instead of failing, so a gate always comes up; the
    /// affected strategy then allows everything.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        let mut builder = Self::new()
            .default_strategy(config.strategy)
            .dark_launch(config.dark_launch)
            .flag_default(config.flag_default);

        match config.backend {
            BackendKind::Noop => {}
            BackendKind::Memory => {
                builder.fixed_window = Some(Arc::new(MemoryFixedWindow::new()));
                builder.token_bucket = Some(Arc::new(MemoryTokenBucket::new()));
            }
            BackendKind::Redis => {
                let limiter_config = config.redis.to_limiter_config();
                match RedisFixedWindow::new(&limiter_config) {
                    Ok(limiter) => builder.fixed_window = Some(Arc::new(limiter)),
                    Err(e) => {
                        warn!(error = %e, "redis fixed-window init failed, degrading to no-op");
                        builder.construction_degraded = true;
                    }
                }
                match RedisTokenBucket::new(&limiter_config) {
                    Ok(limiter) => builder.token_bucket = Some(Arc::new(limiter)),
                    Err(e) => {
                        warn!(error = %e, "redis token-bucket init failed, degrading to no-op");
                        builder.construction_degraded = true;
                    }
                }
            }
        }

        if !config.overrides.is_null() || !config.defaults.is_null() {
            builder.limits = Some((config.overrides.clone(), config.defaults.clone()));
        }

        builder
    }

    /// Set the backend serving fixed-window limits.
    #[must_use]
    pub fn fixed_window(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.fixed_window = Some(limiter);
        self
    }

    /// Set the backend serving token-bucket limits.
    #[must_use]
    pub fn token_bucket(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.token_bucket = Some(limiter);
        self
    }

    /// Set a shared limit registry.
    ///
    /// Use this when the registry outlives the gate or is reloaded by
    /// another component; otherwise [`build`](Self::build) creates one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<LimitRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the feature-flag source consulted for flag-gated call sites.
    #[must_use]
    pub fn flags(mut self, flags: Arc<dyn FlagSource>) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Set the metrics sink receiving lookup and hit events.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Provide raw limit entries, loaded into the registry at build time.
    #[must_use]
    pub fn limits(mut self, overrides: Value, defaults: Value) -> Self {
        self.limits = Some((overrides, defaults));
        self
    }

    /// Set the process-wide default strategy.
    #[must_use]
    pub fn default_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Set the process default for dark-launched call sites.
    #[must_use]
    pub fn dark_launch(mut self, enabled: bool) -> Self {
        self.dark_launch = enabled;
        self
    }

    /// Set the value assumed for flags unknown to the flag source.
    #[must_use]
    pub fn flag_default(mut self, enabled: bool) -> Self {
        self.flag_default = enabled;
        self
    }

    /// Consume the builder and produce a configured [`Gate`].
    pub fn build(self) -> Gate {
        let sink = self.sink;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(LimitRegistry::new(Arc::clone(&sink))));
        if let Some((overrides, defaults)) = self.limits {
            registry.load(&overrides, &defaults);
        }

        let metrics = Arc::new(GateMetrics::default());
        if self.construction_degraded {
            metrics.increment_degraded();
        }

        Gate {
            fixed_window: self.fixed_window.unwrap_or_else(|| Arc::new(NoopLimiter)),
            token_bucket: self.token_bucket.unwrap_or_else(|| Arc::new(NoopLimiter)),
            registry,
            flags: self.flags,
            sink,
            metrics,
            default_strategy: self.default_strategy,
            dark_launch: self.dark_launch,
            flag_default: self.flag_default,
        }
    }
}

impl Default for GateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Build a gate directly from a configuration document.
    ///
    /// Equivalent to [`GateBuilder::from_config`] followed by
    /// [`GateBuilder::build`]; never fails (see the degradation notes on
    /// [`GateBuilder::from_config`]).
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        GateBuilder::from_config(config).build()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use weir_core::TenantId;

    use crate::gate::CheckRequest;

    use super::*;

    #[tokio::test]
    async fn default_build_allows_everything() {
        let gate = GateBuilder::new().build();
        let req = CheckRequest::new("anything").limit(1, 60);
        for _ in 0..50 {
            assert!(gate.check(&req).await.is_ok());
        }
    }

    #[tokio::test]
    async fn from_config_memory_backend_enforces() {
        let config = GateConfig::from_toml_str(
            r#"
backend = "memory"

[defaults.create_order]
quota = 1
per = 60
"#,
        )
        .unwrap();
        let gate = Gate::from_config(&config);

        let req = CheckRequest::new("create_order");
        assert!(gate.check(&req).await.is_ok());
        assert!(gate.check(&req).await.is_err());
    }

    #[tokio::test]
    async fn from_config_bad_redis_url_degrades_to_noop() {
        let config = GateConfig::from_toml_str(
            r#"
backend = "redis"

[redis]
url = "not a url"
"#,
        )
        .unwrap();
        let gate = Gate::from_config(&config);

        // Construction was marked degraded and every call passes.
        assert!(gate.metrics().snapshot().degraded >= 1);
        let req = CheckRequest::new("orders").limit(1, 60);
        for _ in 0..10 {
            assert!(gate.check(&req).await.is_ok());
        }
    }

    #[test]
    fn build_loads_limits_into_registry() {
        let gate = GateBuilder::new()
            .limits(
                json!({"tenant:4:orders": {"quota": 2, "per": 30}}),
                json!({"orders": {"quota": 6, "per": 60}}),
            )
            .build();

        assert_eq!(gate.registry().len(), 2);
        let (definition, _) = gate.registry().resolve(TenantId::new(4), "orders");
        assert_eq!(definition.quota, 2);
    }

    #[test]
    fn shared_registry_is_reused() {
        let registry = Arc::new(LimitRegistry::default());
        registry.load(&json!({}), &json!({"orders": {"quota": 3, "per": 10}}));

        let gate = GateBuilder::new().registry(Arc::clone(&registry)).build();
        assert_eq!(gate.registry().len(), 1);

        // A reload through the original handle is visible to the gate.
        registry.load(&json!({}), &json!({"reports": {"quota": 1, "per": 10}}));
        let (_, source) = gate.registry().resolve(TenantId::ZERO, "reports");
        assert_eq!(source, weir_core::LimitSource::Default);
    }
}
