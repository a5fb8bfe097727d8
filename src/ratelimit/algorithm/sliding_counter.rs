//! Sliding window approximated by per-sub-window counters.

use std::collections::BTreeMap;

/// Index of the sub-window containing `now`.
///
/// Equal to `floor(now / (window_seconds / sub_windows))`, computed without
/// fractional sub-window sizes.
pub fn sub_window_index(window_seconds: i64, sub_windows: i64, now: i64) -> i64 {
    (now as i128 * sub_windows as i128).div_euclid(window_seconds as i128) as i64
}

/// Counts per sub-window index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingCounterState {
    buckets: BTreeMap<i64, i64>,
}

impl SlidingCounterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count recorded for sub-window `index`.
    pub fn count(&self, index: i64) -> i64 {
        self.buckets.get(&index).copied().unwrap_or(0)
    }

    /// Number of sub-windows still held.
    pub fn live_sub_windows(&self) -> usize {
        self.buckets.len()
    }

    /// Sum the last `sub_windows` sub-windows and record `permits` in the current one if they fit.
    pub fn try_acquire(
        &mut self,
        limit: i64,
        window_seconds: i64,
        sub_windows: i64,
        permits: i64,
        now: i64,
    ) -> bool {
        let current = sub_window_index(window_seconds, sub_windows, now);
        let oldest = current.saturating_sub(sub_windows - 1);

        // Sub-windows before `oldest` can never be counted again
        self.buckets = self.buckets.split_off(&oldest);

        let total = self
            .buckets
            .range(oldest..=current)
            .fold(0i64, |sum, (_, c)| sum.saturating_add(*c));
        match total.checked_add(permits) {
            Some(next) if next <= limit => {
                *self.buckets.entry(current).or_insert(0) += permits;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_window_index() {
        assert_eq!(sub_window_index(10, 10, 37), 37);
        assert_eq!(sub_window_index(60, 6, 59), 5);
        assert_eq!(sub_window_index(60, 7, 9), 1);
        assert_eq!(sub_window_index(10, 1, 25), 2);
    }

    #[test]
    fn test_blends_sub_windows() {
        let mut counter = SlidingCounterState::new();
        let k = 100;
        for _ in 0..10 {
            assert!(counter.try_acquire(10, 10, 10, 1, k));
        }
        assert!(!counter.try_acquire(10, 10, 10, 1, k + 1));
        assert!(!counter.try_acquire(10, 10, 10, 1, k + 9));
        assert!(counter.try_acquire(10, 10, 10, 1, k + 10));
        assert_eq!(counter.count(k + 10), 1);
    }

    #[test]
    fn test_expired_sub_windows_are_dropped() {
        let mut counter = SlidingCounterState::new();
        for t in 0..5 {
            assert!(counter.try_acquire(100, 5, 5, 1, t));
        }
        assert_eq!(counter.live_sub_windows(), 5);

        assert!(counter.try_acquire(100, 5, 5, 1, 50));
        assert_eq!(counter.live_sub_windows(), 1);
    }

    #[test]
    fn test_reject_records_nothing() {
        let mut counter = SlidingCounterState::new();
        assert!(counter.try_acquire(3, 10, 10, 3, 0));
        assert!(!counter.try_acquire(3, 10, 10, 1, 0));
        assert_eq!(counter.count(0), 3);
    }

    #[test]
    fn test_oversized_permits_at_extreme_limit() {
        let mut counter = SlidingCounterState::new();
        assert!(counter.try_acquire(i64::MAX, 10, 10, 1, 0));
        assert!(!counter.try_acquire(i64::MAX, 10, 10, i64::MAX, 0));
        assert_eq!(counter.count(0), 1);
    }
}
