//! Sliding window log.

use std::collections::VecDeque;

/// Admission timestamps (seconds), oldest first.
///
/// Entries at the same second are kept individually, so the deque is a
/// multiset and needs no tiebreaker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingLogState {
    entries: VecDeque<i64>,
}

impl SlidingLogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged admissions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count admissions in `[now - window, now]` and log `permits` more if they fit.
    pub fn try_acquire(&mut self, limit: i64, window_seconds: i64, permits: i64, now: i64) -> bool {
        let oldest = now.saturating_sub(window_seconds);
        while self.entries.front().is_some_and(|&ts| ts < oldest) {
            self.entries.pop_front();
        }

        let in_window = self.entries.iter().filter(|&&ts| ts <= now).count() as i64;
        match in_window.checked_add(permits) {
            Some(next) if next <= limit => {}
            _ => return false,
        }

        // Keep the deque ordered even if the clock stepped back
        let position = self.entries.partition_point(|&ts| ts <= now);
        for _ in 0..permits {
            self.entries.insert(position, now);
        }
        true
    }
}
