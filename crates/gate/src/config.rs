use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use weir_core::Strategy;
use weir_limiter_redis::RedisLimiterConfig;

use crate::error::GateError;

/// Schema for the gate's configuration file.
///
/// Every field has a default, so an empty document yields a working gate
/// (no-op backend, fixed-window strategy, dark launch on).
#[derive(Debug, Deserialize)]
pub struct GateConfig {
    /// Which backend family serves both strategies.
    #[serde(default)]
    pub backend: BackendKind,
    /// Connection settings used when `backend = "redis"`.
    #[serde(default)]
    pub redis: RedisSettings,
    /// Process-wide default strategy for limits without a hint.
    #[serde(default)]
    pub strategy: Strategy,
    /// Process default for flag-gated call sites: bypass silently while
    /// the flag is off.
    #[serde(default = "default_dark_launch")]
    pub dark_launch: bool,
    /// Value assumed for flags unknown to the flag source.
    #[serde(default)]
    pub flag_default: bool,
    /// Raw tenant-override entries fed to the registry.
    #[serde(default)]
    pub overrides: Value,
    /// Raw global-default entries fed to the registry.
    #[serde(default)]
    pub defaults: Value,
}

impl GateConfig {
    /// Parse a configuration document from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Configuration`] when the document does not
    /// parse.
    pub fn from_toml_str(raw: &str) -> Result<Self, GateError> {
        toml::from_str(raw).map_err(|e| GateError::Configuration(e.to_string()))
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Configuration`] when the file cannot be read
    /// or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GateError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            redis: RedisSettings::default(),
            strategy: Strategy::default(),
            dark_launch: default_dark_launch(),
            flag_default: false,
            overrides: Value::Null,
            defaults: Value::Null,
        }
    }
}

/// Backend families selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Never blocks. The safe default when nothing is configured.
    #[default]
    Noop,
    /// Single-process in-memory counters.
    Memory,
    /// Shared counters in Redis.
    Redis,
}

/// Redis connection settings, a TOML-friendly mirror of
/// [`RedisLimiterConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prefix applied to every key.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
    /// Maximum pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl RedisSettings {
    /// Convert to the limiter crate's configuration type.
    #[must_use]
    pub fn to_limiter_config(&self) -> RedisLimiterConfig {
        RedisLimiterConfig {
            url: self.url.clone(),
            prefix: self.prefix.clone(),
            pool_size: self.pool_size,
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            prefix: default_redis_prefix(),
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout_secs(),
        }
    }
}

fn default_dark_launch() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_prefix() -> String {
    "weir".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connection_timeout_secs() -> u64 {
    5
}
