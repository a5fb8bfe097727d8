//! Leaky bucket draining at a fixed rate.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakyBucketState {
    pub current_size: i64,
    /// In the caller's time base (seconds or milliseconds)
    pub last_process_time: i64,
}

impl LeakyBucketState {
    /// An empty bucket.
    pub fn new(now: i64) -> Self {
        Self {
            current_size: 0,
            last_process_time: now,
        }
    }

    /// Drain what leaked since the last call, then add `permits` if they fit.
    ///
    /// `ticks_per_second` is 1 when `now` is in seconds and 1000 when it is
    /// in milliseconds.
    pub fn try_acquire(
        &mut self,
        capacity: i64,
        leak_rate: i64,
        permits: i64,
        now: i64,
        ticks_per_second: i64,
    ) -> bool {
        let elapsed = (now - self.last_process_time).max(0);
        let leaked = elapsed.saturating_mul(leak_rate) / ticks_per_second;
        self.current_size = (self.current_size - leaked).max(0);
        self.last_process_time = self.last_process_time.max(now);

        match self.current_size.checked_add(permits) {
            Some(next) if next <= capacity => {
                self.current_size = next;
                true
            }
            _ => false,
        }
    }
}
