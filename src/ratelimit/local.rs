//! In-process limiter state.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::algorithm::LimiterState;
use super::spec::{Algorithm, LimitSpec};

type MapKey = (Algorithm, String);

/// State for one `(algorithm, key)` pair plus its access bookkeeping.
#[derive(Debug)]
struct Entry {
    state: LimiterState,
    last_access_ms: i64,
    idle_horizon_secs: i64,
}

/// Per-key limiter state guarded by a per-key mutex.
///
/// The map itself is only locked long enough to find or create an entry;
/// the decision runs under the entry's own lock, so contention is per key.
/// Keys with different algorithms are independent limiters.
#[derive(Debug, Default)]
pub struct LocalStore {
    entries: DashMap<MapKey, Arc<Mutex<Entry>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one decision for `key` at `now_ms`.
    pub fn try_acquire(&self, key: &str, spec: &LimitSpec, now_ms: i64) -> bool {
        let map_key = (spec.algorithm, key.to_string());
        loop {
            let entry = self.entry(&map_key, spec, now_ms);
            if let Some(admitted) = self.decide_on(&map_key, &entry, spec, now_ms) {
                return admitted;
            }
            debug!(key = %key, "Local limiter state evicted mid-decision, retrying");
        }
    }

    fn entry(&self, map_key: &MapKey, spec: &LimitSpec, now_ms: i64) -> Arc<Mutex<Entry>> {
        if let Some(entry) = self.entries.get(map_key) {
            return Arc::clone(entry.value());
        }

        let entry = self.entries.entry(map_key.clone()).or_insert_with(|| {
            debug!(
                key = %map_key.1,
                algorithm = %spec.algorithm,
                "Creating local limiter state"
            );
            Arc::new(Mutex::new(Entry {
                state: LimiterState::new(spec, now_ms),
                last_access_ms: now_ms,
                idle_horizon_secs: spec.idle_horizon_secs(),
            }))
        });
        Arc::clone(entry.value())
    }

    /// Decide on `entry` unless eviction removed it from the map before its lock was taken.
    ///
    /// Eviction only removes entries it can lock, so once the entry is locked
    /// and still mapped it stays mapped until the decision is done.
    fn decide_on(
        &self,
        map_key: &MapKey,
        entry: &Arc<Mutex<Entry>>,
        spec: &LimitSpec,
        now_ms: i64,
    ) -> Option<bool> {
        let mut locked = entry.lock();
        let mapped = self
            .entries
            .get(map_key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), entry));
        if !mapped {
            return None;
        }

        locked.last_access_ms = locked.last_access_ms.max(now_ms);
        locked.idle_horizon_secs = spec.idle_horizon_secs();
        Some(locked.state.try_acquire(spec, now_ms))
    }

    /// Drop entries untouched for longer than `multiplier` times their idle horizon.
    ///
    /// Entries currently locked by a decision are kept. Returns how many were removed.
    pub fn evict_idle(&self, now_ms: i64, multiplier: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| match entry.try_lock() {
            Some(entry) => {
                let horizon_ms = entry
                    .idle_horizon_secs
                    .saturating_mul(multiplier)
                    .saturating_mul(1000);
                now_ms.saturating_sub(entry.last_access_ms) <= horizon_ms
            }
            None => true,
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed = removed, "Evicted idle local limiters");
        }
        removed
    }

    /// A copy of the state held for `key`, if any.
    pub fn snapshot(&self, key: &str, algorithm: Algorithm) -> Option<LimiterState> {
        let entry = self
            .entries
            .get(&(algorithm, key.to_string()))
            .map(|entry| Arc::clone(entry.value()))?;
        let state = entry.lock().state.clone();
        Some(state)
    }

    /// Number of limiters currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all state.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
