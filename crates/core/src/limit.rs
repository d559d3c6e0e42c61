use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::TenantId;

/// Lowest quota a limit may carry after clamping.
pub const MIN_QUOTA: u64 = 1;
/// Shortest window a limit may carry after clamping.
pub const MIN_PER_SECONDS: u64 = 1;
/// Longest window a limit may carry after clamping (one day).
pub const MAX_PER_SECONDS: u64 = 86_400;
/// Quota of the hard-coded fallback definition.
pub const FALLBACK_QUOTA: u64 = 5;
/// Window of the hard-coded fallback definition.
pub const FALLBACK_PER_SECONDS: u64 = 60;

/// Counting algorithm used to enforce a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Counter reset at fixed time boundaries.
    #[default]
    Fixed,
    /// Continuous refill at `quota / per_seconds` tokens per second,
    /// allowing bursts up to capacity.
    TokenBucket,
}

impl Strategy {
    /// Return the string form used in configuration and telemetry tags.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::TokenBucket => "token_bucket",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "token_bucket" => Ok(Self::TokenBucket),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Where a resolved limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitSource {
    /// A tenant-scoped override matched.
    Tenant,
    /// A global default matched.
    Default,
    /// Neither map matched; the hard-coded fallback was used.
    Fallback,
}

impl LimitSource {
    /// Return the string form used in telemetry tags.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Default => "default",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for LimitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved limit: how many units per window, with optional burst
/// capacity and a strategy hint.
///
/// Immutable once resolved for a call. Constructed through
/// [`LimitDefinition::clamped`] so stored values always satisfy the range
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDefinition {
    /// Maximum number of units allowed per window.
    pub quota: u64,
    /// Window length in seconds.
    #[serde(rename = "per")]
    pub per_seconds: u64,
    /// Burst capacity for token-bucket enforcement. Defaults to `quota`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u64>,
    /// Per-limit strategy hint. Overrides the process-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
}

impl LimitDefinition {
    /// Create a definition, clamping values into their valid ranges:
    /// `quota >= 1`, `per_seconds` in `[1, 86400]`, `burst >= 1` when set.
    #[must_use]
    pub fn clamped(quota: u64, per_seconds: u64) -> Self {
        Self {
            quota: quota.max(MIN_QUOTA),
            per_seconds: per_seconds.clamp(MIN_PER_SECONDS, MAX_PER_SECONDS),
            burst: None,
            strategy: None,
        }
    }

    /// The hard-coded safe definition used when nothing is configured.
    #[must_use]
    pub fn fallback() -> Self {
        Self::clamped(FALLBACK_QUOTA, FALLBACK_PER_SECONDS)
    }

    /// Attach a burst capacity hint (clamped to at least 1).
    #[must_use]
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = Some(burst.max(MIN_QUOTA));
        self
    }

    /// Attach a strategy hint.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Effective bucket capacity: the burst hint, or `quota` when unset.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.burst.unwrap_or(self.quota)
    }

    /// Re-apply the range invariants, for definitions built from parsed
    /// configuration rather than through [`LimitDefinition::clamped`].
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            quota: self.quota.max(MIN_QUOTA),
            per_seconds: self.per_seconds.clamp(MIN_PER_SECONDS, MAX_PER_SECONDS),
            burst: self.burst.map(|b| b.max(MIN_QUOTA)),
            strategy: self.strategy,
        }
    }
}

/// Build the override-map key for a tenant-scoped limit: `tenant:<id>:<name>`.
#[must_use]
pub fn scoped_key(tenant: TenantId, name: &str) -> String {
    format!("tenant:{tenant}:{name}")
}
