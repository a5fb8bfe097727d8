//! Limiter parameter bundles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RateGateError, Result};

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_WINDOW_SECONDS: i64 = 60;
pub const DEFAULT_CAPACITY: i64 = 10;
pub const DEFAULT_REFILL_AMOUNT: i64 = 1;
pub const DEFAULT_REFILL_INTERVAL_SECONDS: i64 = 1;
pub const DEFAULT_LEAK_RATE: i64 = 1;
pub const DEFAULT_SUB_WINDOWS: i64 = 10;
pub const DEFAULT_PERMITS: i64 = 1;
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// The limiting algorithm a call site uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    FixedWindow,
    TokenBucket,
    LeakyBucket,
    SlidingLog,
    SlidingCounter,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::FixedWindow,
        Algorithm::TokenBucket,
        Algorithm::LeakyBucket,
        Algorithm::SlidingLog,
        Algorithm::SlidingCounter,
    ];

    /// The configuration tag for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "FIXED_WINDOW",
            Algorithm::TokenBucket => "TOKEN_BUCKET",
            Algorithm::LeakyBucket => "LEAKY_BUCKET",
            Algorithm::SlidingLog => "SLIDING_LOG",
            Algorithm::SlidingCounter => "SLIDING_COUNTER",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = RateGateError;

    /// Accepts `FIXED_WINDOW`, `fixed_window` and `fixed-window` spellings.
    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().replace('-', "_").to_ascii_uppercase();
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == tag)
            .ok_or_else(|| RateGateError::Config(format!("unknown algorithm '{}'", s)))
    }
}

/// Where limiter state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Backend {
    /// In-process state
    Local,
    /// Shared store with atomic scripts
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => f.write_str("LOCAL"),
            Backend::Remote => f.write_str("REMOTE"),
        }
    }
}

impl FromStr for Backend {
    type Err = RateGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" | "LOCAL_MEMORY" => Ok(Backend::Local),
            "REMOTE" | "REDIS" => Ok(Backend::Remote),
            _ => Err(RateGateError::Config(format!("unknown backend '{}'", s))),
        }
    }
}

/// Immutable parameter bundle describing one limiter configuration.
///
/// Only the fields relevant to `algorithm` are read; the rest keep their
/// defaults. Build one with [`LimitSpec::new`] and the chained setters:
///
/// ```
/// use rategate::ratelimit::{Algorithm, LimitSpec};
///
/// let spec = LimitSpec::new(Algorithm::FixedWindow).limit(5).window_seconds(60);
/// assert!(spec.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSpec {
    pub algorithm: Algorithm,
    pub backend: Backend,
    /// Maximum admissions per window (window algorithms)
    pub limit: i64,
    pub window_seconds: i64,
    /// Bucket size (token and leaky bucket)
    pub capacity: i64,
    pub refill_amount: i64,
    pub refill_interval_seconds: i64,
    /// Permits drained per second (leaky bucket)
    pub leak_rate: i64,
    pub sub_windows: i64,
    /// Cost of one call
    pub permits: i64,
    pub message: String,
    /// Key used when the caller supplies an empty one
    pub identity: String,
}

impl LimitSpec {
    /// Create a spec for `algorithm` with the built-in defaults on the local backend.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            backend: Backend::Local,
            limit: DEFAULT_LIMIT,
            window_seconds: DEFAULT_WINDOW_SECONDS,
            capacity: DEFAULT_CAPACITY,
            refill_amount: DEFAULT_REFILL_AMOUNT,
            refill_interval_seconds: DEFAULT_REFILL_INTERVAL_SECONDS,
            leak_rate: DEFAULT_LEAK_RATE,
            sub_windows: DEFAULT_SUB_WINDOWS,
            permits: DEFAULT_PERMITS,
            message: DEFAULT_MESSAGE.to_string(),
            identity: String::new(),
        }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn window_seconds(mut self, window_seconds: i64) -> Self {
        self.window_seconds = window_seconds;
        self
    }

    pub fn capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn refill_amount(mut self, refill_amount: i64) -> Self {
        self.refill_amount = refill_amount;
        self
    }

    pub fn refill_interval_seconds(mut self, refill_interval_seconds: i64) -> Self {
        self.refill_interval_seconds = refill_interval_seconds;
        self
    }

    pub fn leak_rate(mut self, leak_rate: i64) -> Self {
        self.leak_rate = leak_rate;
        self
    }

    pub fn sub_windows(mut self, sub_windows: i64) -> Self {
        self.sub_windows = sub_windows;
        self
    }

    pub fn permits(mut self, permits: i64) -> Self {
        self.permits = permits;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Check the parameters the selected algorithm reads.
    pub fn validate(&self) -> Result<()> {
        if self.permits <= 0 {
            return Err(self.invalid("permits", self.permits, "must be positive"));
        }

        match self.algorithm {
            Algorithm::FixedWindow | Algorithm::SlidingLog => {
                self.require_positive("limit", self.limit)?;
                self.require_positive("window_seconds", self.window_seconds)?;
            }
            Algorithm::SlidingCounter => {
                self.require_positive("limit", self.limit)?;
                self.require_positive("window_seconds", self.window_seconds)?;
                if self.sub_windows < 1 {
                    let reason = "must be at least 1";
                    return Err(self.invalid("sub_windows", self.sub_windows, reason));
                }
            }
            Algorithm::TokenBucket => {
                self.require_positive("capacity", self.capacity)?;
                self.require_positive("refill_interval_seconds", self.refill_interval_seconds)?;
                if self.refill_amount < 0 {
                    let reason = "must not be negative";
                    return Err(self.invalid("refill_amount", self.refill_amount, reason));
                }
            }
            Algorithm::LeakyBucket => {
                self.require_positive("capacity", self.capacity)?;
                if self.leak_rate < 0 {
                    let reason = "must not be negative";
                    return Err(self.invalid("leak_rate", self.leak_rate, reason));
                }
            }
        }

        Ok(())
    }

    /// Seconds after which an untouched limiter is indistinguishable from a fresh one.
    pub fn idle_horizon_secs(&self) -> i64 {
        match self.algorithm {
            Algorithm::FixedWindow | Algorithm::SlidingLog | Algorithm::SlidingCounter => {
                self.window_seconds
            }
            Algorithm::TokenBucket => {
                let intervals = ceil_div(self.capacity, self.refill_amount.max(1));
                intervals.saturating_mul(self.refill_interval_seconds)
            }
            Algorithm::LeakyBucket => {
                ceil_div(self.capacity, self.leak_rate.max(1))
            }
        }
        .max(1)
    }

    fn require_positive(&self, field: &str, value: i64) -> Result<()> {
        if value <= 0 {
            return Err(self.invalid(field, value, "must be positive"));
        }
        Ok(())
    }

    fn invalid(&self, field: &str, value: i64, reason: &str) -> RateGateError {
        RateGateError::Config(format!(
            "{} limiter: {} = {} {}",
            self.algorithm, field, value, reason
        ))
    }
}

impl Default for LimitSpec {
    fn default() -> Self {
        Self::new(Algorithm::TokenBucket)
    }
}

/// `ceil(value / divisor)` for a positive divisor, without overflowing near `i64::MAX`.
fn ceil_div(value: i64, divisor: i64) -> i64 {
    value / divisor + i64::from(value % divisor > 0)
}
