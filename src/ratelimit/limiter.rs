//! Decision dispatcher.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::backend::ScriptExecutor;
use super::key::KeyNormalizer;
use super::local::LocalStore;
use super::remote::RemoteLimiter;
use super::spec::{Backend, LimitSpec};
use crate::clock::{Clock, SystemClock};
use crate::config::RateLimiterConfig;
use crate::error::{RateGateError, Result};

/// Result of one decision, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Admitted,
    /// Carries the spec's user-visible message
    Rejected { message: String },
}

impl RateLimitOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateLimitOutcome::Admitted)
    }

    /// Convert to the error-style shape.
    pub fn into_result(self) -> Result<()> {
        match self {
            RateLimitOutcome::Admitted => Ok(()),
            RateLimitOutcome::Rejected { message } => Err(RateGateError::RateLimited { message }),
        }
    }
}

/// Routes each `(key, spec)` decision to its algorithm and backend.
///
/// This struct is thread-safe and can be shared across tasks and threads.
/// Shared-store failures never escape: they resolve to a rejection and a
/// logged warning. Only an invalid spec surfaces as an error.
pub struct RateLimiter {
    config: RateLimiterConfig,
    normalizer: KeyNormalizer,
    clock: Arc<dyn Clock>,
    local: LocalStore,
    remote: Option<RemoteLimiter>,
}

impl RateLimiter {
    /// Create a limiter on the system clock with no shared store.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            normalizer: KeyNormalizer::new(config.max_key_length),
            config,
            clock,
            local: LocalStore::new(),
            remote: None,
        }
    }

    /// Attach a shared store for `Backend::Remote` specs.
    ///
    /// The timeout comes from `config.remote` when present.
    pub fn with_remote(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        let remote = match &self.config.remote {
            Some(remote) => RemoteLimiter::with_timeout(executor, remote.timeout()),
            None => RemoteLimiter::new(executor),
        };
        self.remote = Some(remote);
        self
    }

    /// Create a limiter and connect the shared store named in `config.remote`.
    ///
    /// A store that cannot be reached is logged and left detached, so remote
    /// decisions fail closed instead of failing construction.
    pub async fn connect(config: RateLimiterConfig) -> Self {
        let remote = config.remote.clone();
        let limiter = Self::new(config);

        let Some(remote) = remote else {
            return limiter;
        };

        match super::remote::redis::RedisScriptExecutor::connect(&remote).await {
            Ok(executor) => limiter.with_remote(Arc::new(executor)),
            Err(e) => {
                warn!(error = %e, "Shared store unavailable; remote limits will reject");
                limiter
            }
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Whether a shared store is attached.
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Decide whether to admit one call on `key`.
    ///
    /// Returns `Ok(false)` on rejection; `Err` only for an invalid spec.
    pub async fn decide(&self, key: &str, spec: &LimitSpec) -> Result<bool> {
        if !self.config.enabled {
            return Ok(true);
        }
        spec.validate()?;

        let key = self.normalizer.normalize(key, &spec.identity);

        trace!(
            key = %key,
            algorithm = %spec.algorithm,
            backend = %spec.backend,
            permits = spec.permits,
            "Checking rate limit"
        );

        let admitted = match spec.backend {
            Backend::Local => self.local.try_acquire(&key, spec, self.clock.now_millis()),
            Backend::Remote => self.decide_remote(&key, spec).await,
        };

        if !admitted {
            debug!(
                key = %key,
                algorithm = %spec.algorithm,
                "Rate limit exceeded"
            );
        }

        Ok(admitted)
    }

    /// Decide and return the outcome as a value.
    pub async fn check(&self, key: &str, spec: &LimitSpec) -> Result<RateLimitOutcome> {
        Ok(if self.decide(key, spec).await? {
            RateLimitOutcome::Admitted
        } else {
            RateLimitOutcome::Rejected {
                message: spec.message.clone(),
            }
        })
    }

    /// Decide, turning a rejection into [`RateGateError::RateLimited`].
    pub async fn decide_or_error(&self, key: &str, spec: &LimitSpec) -> Result<()> {
        self.check(key, spec).await?.into_result()
    }

    async fn decide_remote(&self, key: &str, spec: &LimitSpec) -> bool {
        let Some(remote) = &self.remote else {
            warn!(
                key = %key,
                algorithm = %spec.algorithm,
                "Remote backend selected but no shared store is configured; rejecting"
            );
            return false;
        };

        match remote.try_acquire(key, spec).await {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(
                    key = %key,
                    algorithm = %spec.algorithm,
                    error = %e,
                    "Shared store decision failed; rejecting"
                );
                false
            }
        }
    }

    /// Drop local limiters idle past `local.eviction_multiplier` horizons.
    pub fn evict_idle(&self) -> usize {
        self.local
            .evict_idle(self.clock.now_millis(), self.config.local.eviction_multiplier)
    }

    /// Number of limiters held in process.
    pub fn local_entry_count(&self) -> usize {
        self.local.len()
    }

    /// The in-process store.
    pub fn local_store(&self) -> &LocalStore {
        &self.local
    }

    /// Clear all local state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.local.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.config.enabled)
            .field("local_entries", &self.local.len())
            .field("remote", &self.remote)
            .finish()
    }
}
