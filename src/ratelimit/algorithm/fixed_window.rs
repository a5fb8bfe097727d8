//! Fixed window counter.

/// Count of permits admitted in the window starting at `window_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowState {
    pub count: i64,
    /// Always a multiple of the window size
    pub window_start: i64,
}

impl FixedWindowState {
    pub fn new(window_seconds: i64, now: i64) -> Self {
        Self {
            count: 0,
            window_start: window_start(window_seconds, now),
        }
    }

    /// Admit `permits` if the current window has room for them.
    pub fn try_acquire(&mut self, limit: i64, window_seconds: i64, permits: i64, now: i64) -> bool {
        let current = window_start(window_seconds, now);
        if current > self.window_start {
            self.count = 0;
            self.window_start = current;
        }

        match self.count.checked_add(permits) {
            Some(next) if next <= limit => {
                self.count = next;
                true
            }
            _ => false,
        }
    }
}

/// `floor(now / window) * window`.
pub fn window_start(window_seconds: i64, now: i64) -> i64 {
    now.div_euclid(window_seconds) * window_seconds
}
