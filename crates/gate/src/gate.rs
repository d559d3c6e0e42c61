use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use weir_core::{
    EVENT_HIT, FlagSource, LimitDefinition, LimitExceeded, LimitName, MetricsSink, Strategy,
    TenantId,
};
use weir_limiter::{LimitKey, RateLimiter};

use crate::metrics::GateMetrics;
use crate::registry::LimitRegistry;

/// Per-call-site description of a limit check.
///
/// Built once where the limit applies and reused across calls. Only the
/// name is required; everything else defaults to registry-driven
/// resolution for tenant zero with no flag gating.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    name: LimitName,
    partition: String,
    tenant: TenantId,
    quota: Option<u64>,
    per_seconds: Option<u64>,
    burst: Option<u64>,
    strategy: Option<Strategy>,
    flag: Option<String>,
    dark_launch: Option<bool>,
    use_registry: bool,
}

impl CheckRequest {
    /// Describe a check against the named limit.
    pub fn new(name: impl Into<LimitName>) -> Self {
        Self {
            name: name.into(),
            partition: String::new(),
            tenant: TenantId::ZERO,
            quota: None,
            per_seconds: None,
            burst: None,
            strategy: None,
            flag: None,
            dark_launch: None,
            use_registry: true,
        }
    }

    /// The limit's symbolic name.
    #[must_use]
    pub fn name(&self) -> &LimitName {
        &self.name
    }

    /// Set the caller-derived partition (e.g. a user or tenant id).
    /// Distinct partitions count independently.
    #[must_use]
    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Set the tenant whose overrides apply during registry resolution.
    #[must_use]
    pub fn tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = tenant;
        self
    }

    /// Supply an explicit limit, skipping registry resolution. Values are
    /// clamped into their valid ranges.
    #[must_use]
    pub fn limit(mut self, quota: u64, per_seconds: u64) -> Self {
        self.quota = Some(quota);
        self.per_seconds = Some(per_seconds);
        self
    }

    /// Set the burst capacity for token-bucket enforcement.
    #[must_use]
    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Force a strategy for this call site, overriding any configured
    /// hint and the process-wide default.
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Gate this check behind a feature flag.
    #[must_use]
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }

    /// Override the gate's dark-launch default for this call site.
    #[must_use]
    pub fn dark_launch(mut self, enabled: bool) -> Self {
        self.dark_launch = Some(enabled);
        self
    }

    /// Toggle registry resolution. With it off and no explicit limit,
    /// the hard-coded fallback definition applies.
    #[must_use]
    pub fn use_registry(mut self, use_registry: bool) -> Self {
        self.use_registry = use_registry;
        self
    }
}

/// The enforcement facade: decides, per call, whether a named operation
/// may proceed under its effective limit.
///
/// Holds one long-lived backend per strategy, the limit registry, and
/// the wiring to flags and telemetry. Construct through
/// [`GateBuilder`](crate::GateBuilder) or
/// [`Gate::from_config`](Gate::from_config).
pub struct Gate {
    pub(crate) fixed_window: Arc<dyn RateLimiter>,
    pub(crate) token_bucket: Arc<dyn RateLimiter>,
    pub(crate) registry: Arc<LimitRegistry>,
    pub(crate) flags: Option<Arc<dyn FlagSource>>,
    pub(crate) sink: Arc<dyn MetricsSink>,
    pub(crate) metrics: Arc<GateMetrics>,
    pub(crate) default_strategy: Strategy,
    pub(crate) dark_launch: bool,
    pub(crate) flag_default: bool,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("registry", &self.registry)
            .field("default_strategy", &self.default_strategy)
            .field("dark_launch", &self.dark_launch)
            .finish_non_exhaustive()
    }
}

impl Gate {
    /// Decide whether the described call may proceed right now.
    ///
    /// Backend failures never block the caller: the decision fails open
    /// with a warning and a `degraded` count. The only error returned is
    /// the typed rejection when the limit is genuinely exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`LimitExceeded`] carrying the limit name and the delay
    /// after which a retry can succeed.
    #[instrument(name = "gate.check", skip_all)]
    pub async fn check(&self, req: &CheckRequest) -> Result<(), LimitExceeded> {
        // 1. Dark launch: a disabled flag bypasses the check entirely,
        //    letting limits ship ahead of enforcement.
        if let Some(flag) = req.flag.as_deref() {
            let enabled = self
                .flags
                .as_ref()
                .and_then(|source| source.is_enabled(flag))
                .unwrap_or(self.flag_default);
            let dark_launch = req.dark_launch.unwrap_or(self.dark_launch);
            if !enabled && dark_launch {
                self.metrics.increment_bypassed();
                debug!(flag, limit = %req.name, "flag disabled, bypassing check");
                return Ok(());
            }
        }

        // 2. Effective limit: an explicit pair wins, else the registry,
        //    else the fallback definition.
        let definition = match (req.quota, req.per_seconds) {
            (Some(quota), Some(per_seconds)) => LimitDefinition::clamped(quota, per_seconds),
            _ if req.use_registry => self.registry.resolve(req.tenant, req.name.as_str()).0,
            _ => LimitDefinition::fallback(),
        };
        let burst = req.burst.unwrap_or_else(|| definition.capacity());

        // 3. Strategy: call-site hint, then configured hint, then the
        //    process-wide default.
        let strategy = req
            .strategy
            .or(definition.strategy)
            .unwrap_or(self.default_strategy);

        // 4. + 5. Logical key and the long-lived backend for the strategy.
        let key = LimitKey::new(req.name.clone(), req.partition.as_str());
        let backend = match strategy {
            Strategy::Fixed => &self.fixed_window,
            Strategy::TokenBucket => &self.token_bucket,
        };

        // 6. Decision. Backend round-trip errors fail open.
        let allowed = match backend
            .allow_burst(&key, definition.quota, definition.per_seconds, burst)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(error = %e, limit = %req.name, "limiter backend unavailable (fail-open)");
                self.metrics.increment_degraded();
                true
            }
        };

        let window = definition.per_seconds.to_string();
        self.sink.increment(
            EVENT_HIT,
            &[
                ("name", req.name.as_str()),
                ("outcome", if allowed { "allow" } else { "block" }),
                ("window", &window),
                ("strategy", strategy.as_str()),
            ],
        );

        if allowed {
            self.metrics.increment_allowed();
            return Ok(());
        }

        // 7. Blocked: report how long to wait, conservatively a full
        //    window when the backend cannot answer.
        let retry_after = match backend
            .retry_after(&key, definition.quota, definition.per_seconds)
            .await
        {
            Ok(wait) => wait,
            Err(e) => {
                warn!(error = %e, limit = %req.name, "retry_after lookup failed, reporting full window");
                Duration::from_secs(definition.per_seconds)
            }
        };
        self.metrics.increment_blocked();
        info!(
            limit = %req.name,
            retry_after_secs = retry_after.as_secs(),
            %strategy,
            "rate limit exceeded"
        );
        Err(LimitExceeded::new(req.name.clone(), retry_after))
    }

    /// Guard a unit of work: run it only if [`check`](Self::check) allows
    /// the call, passing its output through.
    ///
    /// # Errors
    ///
    /// Returns [`LimitExceeded`] without running `work` when the limit is
    /// exhausted.
    pub async fn enforce<F, Fut, T>(&self, req: &CheckRequest, work: F) -> Result<T, LimitExceeded>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.check(req).await?;
        Ok(work().await)
    }

    /// The registry backing this gate, for runtime reloads.
    #[must_use]
    pub fn registry(&self) -> &LimitRegistry {
        &self.registry
    }

    /// Counters describing enforcement outcomes so far.
    #[must_use]
    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }
}
