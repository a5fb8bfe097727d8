//! Shared-store limiting through atomic scripts.
//!
//! Each algorithm has one fixed script. [`RemoteLimiter`] builds the
//! argument vector for a [`LimitSpec`], runs the script through a
//! [`ScriptExecutor`] under a timeout and interprets the reply.

pub mod memory;
pub mod redis;
mod scripts;

use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::backend::ScriptExecutor;
use super::spec::{Algorithm, LimitSpec};
use crate::error::{RateGateError, Result};

/// Default bound on one shared-store round-trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// A script and the algorithm it implements.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoteScript {
    pub algorithm: Algorithm,
    pub source: &'static str,
}

static FIXED_WINDOW: RemoteScript = RemoteScript {
    algorithm: Algorithm::FixedWindow,
    source: scripts::FIXED_WINDOW,
};

static TOKEN_BUCKET: RemoteScript = RemoteScript {
    algorithm: Algorithm::TokenBucket,
    source: scripts::TOKEN_BUCKET,
};

static LEAKY_BUCKET: RemoteScript = RemoteScript {
    algorithm: Algorithm::LeakyBucket,
    source: scripts::LEAKY_BUCKET,
};

static SLIDING_LOG: RemoteScript = RemoteScript {
    algorithm: Algorithm::SlidingLog,
    source: scripts::SLIDING_LOG,
};

static SLIDING_COUNTER: RemoteScript = RemoteScript {
    algorithm: Algorithm::SlidingCounter,
    source: scripts::SLIDING_COUNTER,
};

impl RemoteScript {
    /// The script implementing `algorithm`.
    pub fn for_algorithm(algorithm: Algorithm) -> &'static RemoteScript {
        match algorithm {
            Algorithm::FixedWindow => &FIXED_WINDOW,
            Algorithm::TokenBucket => &TOKEN_BUCKET,
            Algorithm::LeakyBucket => &LEAKY_BUCKET,
            Algorithm::SlidingLog => &SLIDING_LOG,
            Algorithm::SlidingCounter => &SLIDING_COUNTER,
        }
    }

    /// All scripts, one per algorithm.
    pub fn all() -> impl Iterator<Item = &'static RemoteScript> {
        Algorithm::ALL.into_iter().map(RemoteScript::for_algorithm)
    }
}

/// `ARGV` for `spec`, in the order its script reads them.
pub fn script_args(spec: &LimitSpec) -> Vec<i64> {
    match spec.algorithm {
        Algorithm::FixedWindow | Algorithm::SlidingLog => {
            vec![spec.limit, spec.window_seconds, spec.permits]
        }
        Algorithm::TokenBucket => vec![
            spec.capacity,
            spec.refill_amount,
            spec.refill_interval_seconds,
            spec.permits,
        ],
        Algorithm::LeakyBucket => vec![spec.capacity, spec.leak_rate, spec.permits],
        Algorithm::SlidingCounter => vec![
            spec.limit,
            spec.window_seconds,
            spec.sub_windows,
            spec.permits,
        ],
    }
}

/// Runs decisions against a shared store.
#[derive(Clone)]
pub struct RemoteLimiter {
    executor: Arc<dyn ScriptExecutor>,
    timeout: Duration,
}

impl RemoteLimiter {
    pub fn new(executor: Arc<dyn ScriptExecutor>) -> Self {
        Self::with_timeout(executor, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(executor: Arc<dyn ScriptExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one decision. Any failure to obtain a clean 0/1 reply is an error.
    pub async fn try_acquire(&self, key: &str, spec: &LimitSpec) -> Result<bool> {
        let script = RemoteScript::for_algorithm(spec.algorithm);
        let keys = [key.to_string()];
        let argv = script_args(spec);

        trace!(key = %key, algorithm = %spec.algorithm, argv = ?argv, "Running limiter script");

        let reply = tokio::time::timeout(self.timeout, self.executor.execute(script, &keys, &argv))
            .await
            .map_err(|_| {
                RateGateError::Backend(format!("script timed out after {:?}", self.timeout))
            })??;

        match reply {
            1 => Ok(true),
            0 => Ok(false),
            other => Err(RateGateError::Backend(format!(
                "unexpected script reply {}",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for RemoteLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLimiter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
