//! End-to-end enforcement tests.
//!
//! These tests drive the gate the way a request pipeline would: build it
//! from configuration or the builder, fire checks, and assert on the
//! typed rejections, counters, and emitted events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use weir_core::{EVENT_HIT, EVENT_LOOKUP, RecordingSink};
use weir_gate::{
    CheckRequest, Gate, GateBuilder, GateConfig, LimitKey, LimitSource, LimiterError, MetricsSink,
    RateLimiter, StaticFlags, Strategy, TenantId,
};
use weir_limiter_memory::{MemoryFixedWindow, MemoryTokenBucket};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn memory_gate_with_limits(toml: &str) -> Gate {
    let config = GateConfig::from_toml_str(toml).expect("config should parse");
    Gate::from_config(&config)
}

#[tokio::test]
async fn quota_exhaustion_yields_typed_rejection() {
    init_tracing();
    let gate = memory_gate_with_limits(
        r#"
backend = "memory"

[defaults.create_order]
quota = 3
per = 60
"#,
    );

    let req = CheckRequest::new("create_order").partition("user-1");
    for _ in 0..3 {
        gate.check(&req).await.expect("within quota");
    }

    let err = gate.check(&req).await.expect_err("fourth call should block");
    assert_eq!(err.limit.as_str(), "create_order");
    assert!(err.retry_after > Duration::ZERO);
    assert!(err.retry_after <= Duration::from_secs(60));
    assert!(err.to_string().contains("create_order"));

    let snap = gate.metrics().snapshot();
    assert_eq!(snap.allowed, 3);
    assert_eq!(snap.blocked, 1);
}

#[tokio::test]
async fn tenant_override_beats_global_default() {
    init_tracing();
    let gate = memory_gate_with_limits(
        r#"
backend = "memory"

[defaults.orders]
quota = 5
per = 60

[overrides."tenant:7:orders"]
quota = 1
per = 60
"#,
    );

    // Tenant 7 runs under the tighter override.
    let tight = CheckRequest::new("orders")
        .tenant(TenantId::new(7))
        .partition("tenant-7");
    gate.check(&tight).await.expect("first call within override");
    gate.check(&tight)
        .await
        .expect_err("override quota of 1 should block the second call");

    // Everyone else gets the default.
    let roomy = CheckRequest::new("orders").partition("tenant-0");
    for _ in 0..5 {
        gate.check(&roomy).await.expect("within default quota");
    }
    gate.check(&roomy)
        .await
        .expect_err("default quota of 5 should block the sixth call");
}

#[tokio::test]
async fn dark_launched_flag_bypasses_unbounded() {
    init_tracing();
    let gate = GateBuilder::new()
        .fixed_window(Arc::new(MemoryFixedWindow::new()))
        .flags(Arc::new(StaticFlags::new().with("limit_orders", false)))
        .build();

    let req = CheckRequest::new("orders").limit(1, 60).flag("limit_orders");
    for _ in 0..100 {
        gate.check(&req).await.expect("dark launch should bypass");
    }

    let snap = gate.metrics().snapshot();
    assert_eq!(snap.bypassed, 100);
    assert_eq!(snap.blocked, 0);
}

#[tokio::test]
async fn reload_replaces_limits_and_is_idempotent() {
    init_tracing();
    let gate = memory_gate_with_limits(
        r#"
backend = "memory"

[defaults.orders]
quota = 2
per = 60
"#,
    );

    let before = gate.registry().resolve(TenantId::ZERO, "orders");

    // Reloading the same document changes nothing.
    let config = GateConfig::from_toml_str(
        r#"
[defaults.orders]
quota = 2
per = 60
"#,
    )
    .expect("config should parse");
    gate.registry().load(&config.overrides, &config.defaults);
    assert_eq!(gate.registry().resolve(TenantId::ZERO, "orders"), before);

    // Reloading a different document replaces the table wholesale.
    let config = GateConfig::from_toml_str(
        r#"
[defaults.reports]
quota = 1
per = 10
"#,
    )
    .expect("config should parse");
    gate.registry().load(&config.overrides, &config.defaults);
    let (_, source) = gate.registry().resolve(TenantId::ZERO, "orders");
    assert_eq!(source, LimitSource::Fallback);
    let (_, source) = gate.registry().resolve(TenantId::ZERO, "reports");
    assert_eq!(source, LimitSource::Default);
}

/// Backend stub that fails every call, standing in for a storage outage
/// that begins after construction succeeded.
struct FailingLimiter;

#[async_trait]
impl RateLimiter for FailingLimiter {
    async fn allow(
        &self,
        _key: &LimitKey,
        _quota: u64,
        _per_seconds: u64,
    ) -> Result<bool, LimiterError> {
        Err(LimiterError::Connection("connection refused".into()))
    }

    async fn retry_after(
        &self,
        _key: &LimitKey,
        _quota: u64,
        _per_seconds: u64,
    ) -> Result<Duration, LimiterError> {
        Err(LimiterError::Connection("connection refused".into()))
    }
}

#[tokio::test]
async fn backend_errors_fail_open() {
    init_tracing();
    let gate = GateBuilder::new()
        .fixed_window(Arc::new(FailingLimiter))
        .build();

    let req = CheckRequest::new("orders").limit(1, 60);
    for _ in 0..10 {
        gate.check(&req).await.expect("backend errors should fail open");
    }

    let snap = gate.metrics().snapshot();
    assert_eq!(snap.degraded, 10);
    assert_eq!(snap.allowed, 10);
    assert_eq!(snap.blocked, 0);
}

#[tokio::test]
async fn unreachable_redis_degrades_to_permissive() {
    init_tracing();
    let gate = memory_gate_with_limits(
        r#"
backend = "redis"

[redis]
url = "this is not a redis url"
"#,
    );

    assert!(gate.metrics().snapshot().degraded >= 1);

    let req = CheckRequest::new("orders").limit(1, 60);
    for _ in 0..20 {
        gate.check(&req).await.expect("degraded gate should allow");
    }
}

#[tokio::test]
async fn explicit_limit_skips_registry_resolution() {
    init_tracing();
    let gate = memory_gate_with_limits(
        r#"
backend = "memory"

[defaults.orders]
quota = 100
per = 60
"#,
    );

    let req = CheckRequest::new("orders").limit(1, 60);
    gate.check(&req).await.expect("first call allowed");
    gate.check(&req)
        .await
        .expect_err("explicit quota of 1 should win over the configured 100");
}

#[tokio::test]
async fn hit_events_carry_outcome_window_and_strategy() {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let gate = GateBuilder::new()
        .fixed_window(Arc::new(MemoryFixedWindow::new()))
        .token_bucket(Arc::new(MemoryTokenBucket::new()))
        .sink(Arc::clone(&sink) as Arc<dyn MetricsSink>)
        .build();

    let req = CheckRequest::new("orders")
        .limit(1, 30)
        .strategy(Strategy::TokenBucket);
    gate.check(&req).await.expect("first call allowed");
    gate.check(&req).await.expect_err("second call blocked");

    let hits: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|event| event.name == EVENT_HIT)
        .collect();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].tag("name"), Some("orders"));
    assert_eq!(hits[0].tag("outcome"), Some("allow"));
    assert_eq!(hits[0].tag("window"), Some("30"));
    assert_eq!(hits[0].tag("strategy"), Some("token_bucket"));
    assert_eq!(hits[1].tag("outcome"), Some("block"));
}

#[tokio::test]
async fn registry_resolution_emits_lookup_events() {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let config = GateConfig::from_toml_str(
        r#"
backend = "memory"

[defaults.orders]
quota = 2
per = 60
"#,
    )
    .expect("config should parse");
    let gate = GateBuilder::from_config(&config)
        .sink(Arc::clone(&sink) as Arc<dyn MetricsSink>)
        .build();

    gate.check(&CheckRequest::new("orders")).await.expect("allowed");

    assert_eq!(sink.count(EVENT_LOOKUP), 1);
    let lookup = sink
        .events()
        .into_iter()
        .find(|event| event.name == EVENT_LOOKUP)
        .expect("lookup event should be recorded");
    assert_eq!(lookup.tag("source"), Some("default"));
}

#[tokio::test]
async fn configured_default_strategy_applies_without_hints() {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let config = GateConfig::from_toml_str(
        r#"
backend = "memory"
strategy = "token_bucket"
"#,
    )
    .expect("config should parse");
    let gate = GateBuilder::from_config(&config)
        .sink(Arc::clone(&sink) as Arc<dyn MetricsSink>)
        .build();

    gate.check(&CheckRequest::new("orders").limit(5, 60))
        .await
        .expect("allowed");

    let hit = sink
        .events()
        .into_iter()
        .find(|event| event.name == EVENT_HIT)
        .expect("hit event should be recorded");
    assert_eq!(hit.tag("strategy"), Some("token_bucket"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_single_slot_has_one_winner() {
    init_tracing();
    let gate = Arc::new(
        GateBuilder::new()
            .fixed_window(Arc::new(MemoryFixedWindow::new()))
            .build(),
    );

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let gate = Arc::clone(&gate);
        tasks.push(tokio::spawn(async move {
            let req = CheckRequest::new("orders").limit(1, 60).partition("shared");
            gate.check(&req).await.is_ok()
        }));
    }

    let mut allowed = 0;
    for task in tasks {
        if task.await.expect("task should not panic") {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 1, "exactly one concurrent caller may win the slot");
}
