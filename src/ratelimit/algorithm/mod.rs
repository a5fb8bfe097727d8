//! Pure decision functions, one per algorithm.
//!
//! Each state type owns the numbers one key needs and exposes a
//! `try_acquire` that mutates the state in place and returns whether the
//! call was admitted. None of them read a clock or take a lock; callers
//! supply `now` and guarantee exclusive access.

mod fixed_window;
mod leaky_bucket;
mod sliding_counter;
mod sliding_log;
mod token_bucket;

pub use fixed_window::FixedWindowState;
pub use leaky_bucket::LeakyBucketState;
pub use sliding_counter::{sub_window_index, SlidingCounterState};
pub use sliding_log::SlidingLogState;
pub use token_bucket::TokenBucketState;

use super::spec::{Algorithm, LimitSpec};

/// Ticks per second of the time base used by the local leaky bucket.
pub const LOCAL_LEAKY_TICKS_PER_SECOND: i64 = 1000;

/// Per-key state for whichever algorithm a limiter uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterState {
    FixedWindow(FixedWindowState),
    TokenBucket(TokenBucketState),
    LeakyBucket(LeakyBucketState),
    SlidingLog(SlidingLogState),
    SlidingCounter(SlidingCounterState),
}

impl LimiterState {
    /// Initial state for `spec` first seen at `now_ms`.
    pub fn new(spec: &LimitSpec, now_ms: i64) -> Self {
        let now = now_ms.div_euclid(1000);
        match spec.algorithm {
            Algorithm::FixedWindow => {
                LimiterState::FixedWindow(FixedWindowState::new(spec.window_seconds, now))
            }
            Algorithm::TokenBucket => {
                LimiterState::TokenBucket(TokenBucketState::new(spec.capacity, now))
            }
            Algorithm::LeakyBucket => LimiterState::LeakyBucket(LeakyBucketState::new(now_ms)),
            Algorithm::SlidingLog => LimiterState::SlidingLog(SlidingLogState::new()),
            Algorithm::SlidingCounter => LimiterState::SlidingCounter(SlidingCounterState::new()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            LimiterState::FixedWindow(_) => Algorithm::FixedWindow,
            LimiterState::TokenBucket(_) => Algorithm::TokenBucket,
            LimiterState::LeakyBucket(_) => Algorithm::LeakyBucket,
            LimiterState::SlidingLog(_) => Algorithm::SlidingLog,
            LimiterState::SlidingCounter(_) => Algorithm::SlidingCounter,
        }
    }

    /// Run one decision for `spec.permits` at `now_ms`.
    ///
    /// The leaky bucket runs on milliseconds; every other algorithm on whole seconds.
    pub fn try_acquire(&mut self, spec: &LimitSpec, now_ms: i64) -> bool {
        let now = now_ms.div_euclid(1000);
        match self {
            LimiterState::FixedWindow(state) => {
                state.try_acquire(spec.limit, spec.window_seconds, spec.permits, now)
            }
            LimiterState::TokenBucket(state) => state.try_acquire(
                spec.capacity,
                spec.refill_amount,
                spec.refill_interval_seconds,
                spec.permits,
                now,
            ),
            LimiterState::LeakyBucket(state) => state.try_acquire(
                spec.capacity,
                spec.leak_rate,
                spec.permits,
                now_ms,
                LOCAL_LEAKY_TICKS_PER_SECOND,
            ),
            LimiterState::SlidingLog(state) => {
                state.try_acquire(spec.limit, spec.window_seconds, spec.permits, now)
            }
            LimiterState::SlidingCounter(state) => state.try_acquire(
                spec.limit,
                spec.window_seconds,
                spec.sub_windows,
                spec.permits,
                now,
            ),
        }
    }
}
