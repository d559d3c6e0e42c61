use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use weir_core::{
    EVENT_LOOKUP, FALLBACK_PER_SECONDS, FALLBACK_QUOTA, LimitDefinition, LimitSource, MetricsSink,
    NullSink, Strategy, TenantId, scoped_key,
};

/// Key prefix marking a tenant-scoped override entry.
const TENANT_SCOPE_PREFIX: &str = "tenant:";

#[derive(Debug, Default)]
struct LimitTable {
    /// `tenant:<id>:<name>` → definition. Checked first.
    overrides: HashMap<String, LimitDefinition>,
    /// `<name>` → definition. Checked when no override matches.
    defaults: HashMap<String, LimitDefinition>,
}

/// In-memory configuration table resolving `(tenant, name)` to an
/// effective [`LimitDefinition`].
///
/// Resolution walks three tiers: tenant override, then global default,
/// then the hard-coded fallback. Both maps live behind one lock so
/// [`load`](Self::load) swaps them atomically and a concurrent
/// [`resolve`](Self::resolve) never observes a half-replaced table.
pub struct LimitRegistry {
    table: RwLock<LimitTable>,
    sink: Arc<dyn MetricsSink>,
}

impl LimitRegistry {
    /// Create an empty registry emitting lookup events to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            table: RwLock::new(LimitTable::default()),
            sink,
        }
    }

    /// Split a raw configuration object into `(overrides, defaults)`.
    ///
    /// Entries whose key carries the `tenant:` scope prefix become
    /// overrides, the rest defaults, regardless of which source held
    /// them. A value that is not an object is skipped; a missing or
    /// non-numeric `quota`/`per` field falls back to the hard-coded
    /// fallback value for that field; everything is clamped. Parsing
    /// never fails.
    #[must_use]
    pub fn parse(
        raw: &Value,
    ) -> (
        HashMap<String, LimitDefinition>,
        HashMap<String, LimitDefinition>,
    ) {
        let mut overrides = HashMap::new();
        let mut defaults = HashMap::new();
        let Some(entries) = raw.as_object() else {
            return (overrides, defaults);
        };

        for (key, value) in entries {
            let Some(definition) = parse_definition(value) else {
                continue;
            };
            if key.starts_with(TENANT_SCOPE_PREFIX) {
                overrides.insert(key.clone(), definition);
            } else {
                defaults.insert(key.clone(), definition);
            }
        }

        (overrides, defaults)
    }

    /// Replace both maps atomically from the two raw sources.
    ///
    /// Idempotent and safe to call repeatedly, e.g. on configuration
    /// reload. When the same key appears in both sources, the entry from
    /// `overrides_raw` wins.
    pub fn load(&self, overrides_raw: &Value, defaults_raw: &Value) {
        let (mut overrides, mut defaults) = Self::parse(defaults_raw);
        let (scoped, unscoped) = Self::parse(overrides_raw);
        overrides.extend(scoped);
        defaults.extend(unscoped);

        let mut table = self.table.write();
        table.overrides = overrides;
        table.defaults = defaults;
    }

    /// Resolve the effective limit for `(tenant, name)`.
    ///
    /// Checks `tenant:<id>:<name>` in the overrides, then `name` in the
    /// defaults, then falls back to [`LimitDefinition::fallback`]. Emits
    /// one `rate_limit.lookup` event tagged `{name, source}`; resolution
    /// itself never fails.
    pub fn resolve(&self, tenant: TenantId, name: &str) -> (LimitDefinition, LimitSource) {
        let (definition, source) = {
            let table = self.table.read();
            let scoped = scoped_key(tenant, name);
            if let Some(definition) = table.overrides.get(&scoped) {
                (definition.clone(), LimitSource::Tenant)
            } else if let Some(definition) = table.defaults.get(name) {
                (definition.clone(), LimitSource::Default)
            } else {
                (LimitDefinition::fallback(), LimitSource::Fallback)
            }
        };

        self.sink
            .increment(EVENT_LOOKUP, &[("name", name), ("source", source.as_str())]);
        (definition, source)
    }

    /// Total number of configured entries across both maps.
    #[must_use]
    pub fn len(&self) -> usize {
        let table = self.table.read();
        table.overrides.len() + table.defaults.len()
    }

    /// Whether the registry holds no configured entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LimitRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl fmt::Debug for LimitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("LimitRegistry")
            .field("overrides", &table.overrides.len())
            .field("defaults", &table.defaults.len())
            .finish_non_exhaustive()
    }
}

/// Parse one raw entry value into a definition.
///
/// Returns `None` for values that are not objects. Missing or malformed
/// numeric fields take the hard-coded fallback values; out-of-range
/// values are clamped; an unrecognized strategy string drops the hint.
fn parse_definition(value: &Value) -> Option<LimitDefinition> {
    let fields = value.as_object()?;
    let quota = fields
        .get("quota")
        .and_then(Value::as_u64)
        .unwrap_or(FALLBACK_QUOTA);
    let per_seconds = fields
        .get("per")
        .and_then(Value::as_u64)
        .unwrap_or(FALLBACK_PER_SECONDS);

    let mut definition = LimitDefinition::clamped(quota, per_seconds);
    if let Some(burst) = fields.get("burst").and_then(Value::as_u64) {
        definition = definition.with_burst(burst);
    }
    if let Some(strategy) = fields
        .get("strategy")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Strategy>().ok())
    {
        definition = definition.with_strategy(strategy);
    }
    Some(definition)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use weir_core::RecordingSink;

    use super::*;

    #[test]
    fn unconfigured_name_uses_fallback() {
        let registry = LimitRegistry::default();
        let (definition, source) = registry.resolve(TenantId::ZERO, "anything");
        assert_eq!(definition.quota, 5);
        assert_eq!(definition.per_seconds, 60);
        assert_eq!(source, LimitSource::Fallback);
    }

    #[test]
    fn override_beats_same_named_default() {
        let registry = LimitRegistry::default();
        registry.load(
            &json!({"tenant:7:create_order": {"quota": 2, "per": 30}}),
            &json!({"create_order": {"quota": 9, "per": 60}}),
        );

        let (definition, source) = registry.resolve(TenantId::new(7), "create_order");
        assert_eq!(definition.quota, 2);
        assert_eq!(definition.per_seconds, 30);
        assert_eq!(source, LimitSource::Tenant);

        let (definition, source) = registry.resolve(TenantId::ZERO, "create_order");
        assert_eq!(definition.quota, 9);
        assert_eq!(source, LimitSource::Default);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let registry = LimitRegistry::default();
        registry.load(
            &json!({}),
            &json!({"reports": {"quota": 0, "per": 9_999_999}}),
        );

        let (definition, _) = registry.resolve(TenantId::ZERO, "reports");
        assert_eq!(definition.quota, 1);
        assert_eq!(definition.per_seconds, 86_400);
    }

    #[test]
    fn malformed_entries_are_skipped_or_defaulted() {
        let registry = LimitRegistry::default();
        registry.load(
            &json!({}),
            &json!({
                "not_an_object": 42,
                "bad_fields": {"quota": "many", "per": 30},
            }),
        );

        // Entirely malformed entry never lands in the table.
        let (_, source) = registry.resolve(TenantId::ZERO, "not_an_object");
        assert_eq!(source, LimitSource::Fallback);

        // Malformed quota takes the fallback value, valid per survives.
        let (definition, source) = registry.resolve(TenantId::ZERO, "bad_fields");
        assert_eq!(source, LimitSource::Default);
        assert_eq!(definition.quota, 5);
        assert_eq!(definition.per_seconds, 30);

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn scoped_keys_land_in_overrides_from_either_source() {
        let registry = LimitRegistry::default();
        registry.load(
            &json!({"plain_name": {"quota": 3, "per": 10}}),
            &json!({"tenant:3:create_order": {"quota": 1, "per": 5}}),
        );

        let (definition, source) = registry.resolve(TenantId::new(3), "create_order");
        assert_eq!(source, LimitSource::Tenant);
        assert_eq!(definition.quota, 1);

        let (definition, source) = registry.resolve(TenantId::ZERO, "plain_name");
        assert_eq!(source, LimitSource::Default);
        assert_eq!(definition.quota, 3);
    }

    #[test]
    fn load_replaces_previous_entries() {
        let registry = LimitRegistry::default();
        registry.load(&json!({}), &json!({"old": {"quota": 1, "per": 1}}));
        registry.load(&json!({}), &json!({"new": {"quota": 2, "per": 2}}));

        let (_, source) = registry.resolve(TenantId::ZERO, "old");
        assert_eq!(source, LimitSource::Fallback);
        let (_, source) = registry.resolve(TenantId::ZERO, "new");
        assert_eq!(source, LimitSource::Default);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn load_is_idempotent() {
        let overrides = json!({"tenant:1:orders": {"quota": 4, "per": 20}});
        let defaults = json!({"orders": {"quota": 8, "per": 40}});

        let registry = LimitRegistry::default();
        registry.load(&overrides, &defaults);
        let first = registry.resolve(TenantId::new(1), "orders");
        registry.load(&overrides, &defaults);
        let second = registry.resolve(TenantId::new(1), "orders");

        assert_eq!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn burst_and_strategy_hints_are_parsed() {
        let registry = LimitRegistry::default();
        registry.load(
            &json!({}),
            &json!({
                "bursty": {"quota": 4, "per": 60, "burst": 8, "strategy": "token_bucket"},
                "odd": {"quota": 4, "per": 60, "strategy": "sliding_log"},
            }),
        );

        let (definition, _) = registry.resolve(TenantId::ZERO, "bursty");
        assert_eq!(definition.burst, Some(8));
        assert_eq!(definition.strategy, Some(Strategy::TokenBucket));

        // Unrecognized strategy strings drop the hint rather than fail.
        let (definition, _) = registry.resolve(TenantId::ZERO, "odd");
        assert_eq!(definition.strategy, None);
    }

    #[test]
    fn resolution_emits_lookup_event_tagged_with_source() {
        let sink = Arc::new(RecordingSink::new());
        let registry = LimitRegistry::new(Arc::clone(&sink) as Arc<dyn MetricsSink>);
        registry.load(
            &json!({"tenant:2:orders": {"quota": 1, "per": 1}}),
            &json!({"reports": {"quota": 1, "per": 1}}),
        );

        registry.resolve(TenantId::new(2), "orders");
        registry.resolve(TenantId::ZERO, "reports");
        registry.resolve(TenantId::ZERO, "unknown");

        let events = sink.events();
        assert_eq!(sink.count(EVENT_LOOKUP), 3);
        assert_eq!(events[0].tag("name"), Some("orders"));
        assert_eq!(events[0].tag("source"), Some("tenant"));
        assert_eq!(events[1].tag("source"), Some("default"));
        assert_eq!(events[2].tag("source"), Some("fallback"));
    }
}
