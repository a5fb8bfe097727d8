//! Configuration management for rategate.
//!
//! Configuration is read from YAML, either directly or layered with
//! `RATEGATE__*` environment variables (`RATEGATE__DEFAULTS__LIMIT=50`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RateGateError, Result};
use crate::ratelimit::key::DEFAULT_MAX_KEY_LENGTH;
use crate::ratelimit::spec::{self, Algorithm, Backend, LimitSpec};

/// Main configuration for a rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Global kill-switch; when false every decision admits
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Keys longer than this are truncated
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,

    /// Values used when a call site omits a field
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// In-process store settings
    #[serde(default)]
    pub local: LocalConfig,

    /// Shared store connection; absent means no remote backend
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_key_length: default_max_key_length(),
            defaults: DefaultsConfig::default(),
            local: LocalConfig::default(),
            remote: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_key_length() -> usize {
    DEFAULT_MAX_KEY_LENGTH
}

/// Defaults applied to specs built through [`RateLimiterConfig::spec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    #[serde(default = "default_refill_amount")]
    pub refill_amount: i64,
    #[serde(default = "default_refill_interval_seconds")]
    pub refill_interval_seconds: i64,
    #[serde(default = "default_leak_rate")]
    pub leak_rate: i64,
    #[serde(default = "default_sub_windows")]
    pub sub_windows: i64,
    #[serde(default = "default_permits")]
    pub permits: i64,
    #[serde(default = "default_message")]
    pub message: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            backend: default_backend(),
            limit: default_limit(),
            window_seconds: default_window_seconds(),
            capacity: default_capacity(),
            refill_amount: default_refill_amount(),
            refill_interval_seconds: default_refill_interval_seconds(),
            leak_rate: default_leak_rate(),
            sub_windows: default_sub_windows(),
            permits: default_permits(),
            message: default_message(),
        }
    }
}

fn default_algorithm() -> Algorithm {
    Algorithm::TokenBucket
}

fn default_backend() -> Backend {
    Backend::Local
}

fn default_limit() -> i64 {
    spec::DEFAULT_LIMIT
}

fn default_window_seconds() -> i64 {
    spec::DEFAULT_WINDOW_SECONDS
}

fn default_capacity() -> i64 {
    spec::DEFAULT_CAPACITY
}

fn default_refill_amount() -> i64 {
    spec::DEFAULT_REFILL_AMOUNT
}

fn default_refill_interval_seconds() -> i64 {
    spec::DEFAULT_REFILL_INTERVAL_SECONDS
}

fn default_leak_rate() -> i64 {
    spec::DEFAULT_LEAK_RATE
}

fn default_sub_windows() -> i64 {
    spec::DEFAULT_SUB_WINDOWS
}

fn default_permits() -> i64 {
    spec::DEFAULT_PERMITS
}

fn default_message() -> String {
    spec::DEFAULT_MESSAGE.to_string()
}

/// In-process store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Idle entries older than this many idle horizons may be evicted
    #[serde(default = "default_eviction_multiplier")]
    pub eviction_multiplier: i64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            eviction_multiplier: default_eviction_multiplier(),
        }
    }
}

fn default_eviction_multiplier() -> i64 {
    10
}

/// Shared store connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Connection URL; credentials and TLS (`rediss://`) are part of it
    pub url: String,

    /// Bound on one decision round-trip in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

impl RateLimiterConfig {
    /// A spec for `algorithm` seeded from the configured defaults.
    pub fn spec(&self, algorithm: Algorithm) -> LimitSpec {
        let d = &self.defaults;
        LimitSpec::new(algorithm)
            .backend(d.backend)
            .limit(d.limit)
            .window_seconds(d.window_seconds)
            .capacity(d.capacity)
            .refill_amount(d.refill_amount)
            .refill_interval_seconds(d.refill_interval_seconds)
            .leak_rate(d.leak_rate)
            .sub_windows(d.sub_windows)
            .permits(d.permits)
            .message(d.message.clone())
    }

    /// A spec for the configured default algorithm.
    pub fn default_spec(&self) -> LimitSpec {
        self.spec(self.defaults.algorithm)
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateGateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional file overlaid with `RATEGATE__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading rate limiter configuration");
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("RATEGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| RateGateError::Config(format!("Failed to load configuration: {}", e)))
    }
}
