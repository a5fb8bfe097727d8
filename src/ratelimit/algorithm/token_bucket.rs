//! Token bucket with whole-interval refill.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketState {
    /// Always within `[0, capacity]`
    pub tokens: i64,
    pub last_refill_time: i64,
}

impl TokenBucketState {
    /// A full bucket.
    pub fn new(capacity: i64, now: i64) -> Self {
        Self {
            tokens: capacity,
            last_refill_time: now,
        }
    }

    /// Refill by whole elapsed intervals, then take `permits` tokens if present.
    ///
    /// `last_refill_time` advances on rejection too, so a stream of rejected
    /// calls cannot bank refill for later.
    pub fn try_acquire(
        &mut self,
        capacity: i64,
        refill_amount: i64,
        refill_interval_seconds: i64,
        permits: i64,
        now: i64,
    ) -> bool {
        let elapsed = (now - self.last_refill_time).max(0);
        let intervals = elapsed / refill_interval_seconds;
        let refill = intervals.saturating_mul(refill_amount);
        self.tokens = self.tokens.saturating_add(refill).min(capacity).max(0);
        self.last_refill_time = self.last_refill_time.max(now);

        if self.tokens >= permits {
            self.tokens -= permits;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_refill() {
        let mut bucket = TokenBucketState::new(10, 0);
        for _ in 0..10 {
            assert!(bucket.try_acquire(10, 1, 1, 1, 0));
        }
        assert!(!bucket.try_acquire(10, 1, 1, 1, 0));
        assert_eq!(bucket.tokens, 0);

        for _ in 0..3 {
            assert!(bucket.try_acquire(10, 1, 1, 1, 3));
        }
        assert!(!bucket.try_acquire(10, 1, 1, 1, 3));
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let mut bucket = TokenBucketState::new(5, 0);
        assert!(bucket.try_acquire(5, 100, 1, 1, 0));
        assert!(bucket.try_acquire(5, 100, 1, 1, 1_000_000));
        assert_eq!(bucket.tokens, 4);
    }

    #[test]
    fn test_partial_intervals_do_not_refill() {
        let mut bucket = TokenBucketState::new(2, 0);
        assert!(bucket.try_acquire(2, 1, 10, 2, 0));
        assert!(!bucket.try_acquire(2, 1, 10, 1, 9));
        assert_eq!(bucket.tokens, 0);
    }

    #[test]
    fn test_rejection_advances_refill_time() {
        let mut bucket = TokenBucketState::new(1, 0);
        assert!(bucket.try_acquire(1, 1, 2, 1, 0));

        // One second into a two second interval: rejected, clock reset to t=1
        assert!(!bucket.try_acquire(1, 1, 2, 1, 1));
        assert_eq!(bucket.last_refill_time, 1);
        assert_eq!(bucket.tokens, 0);

        // t=2 is only one second after the rejected call
        assert!(!bucket.try_acquire(1, 1, 2, 1, 2));
        assert!(bucket.try_acquire(1, 1, 2, 1, 4));
    }

    #[test]
    fn test_multi_permit_request() {
        let mut bucket = TokenBucketState::new(10, 0);
        assert!(bucket.try_acquire(10, 1, 1, 7, 0));
        assert!(!bucket.try_acquire(10, 1, 1, 4, 0));
        assert_eq!(bucket.tokens, 3);
        assert!(bucket.try_acquire(10, 1, 1, 3, 0));
    }

    #[test]
    fn test_clock_going_backwards_does_not_refill() {
        let mut bucket = TokenBucketState::new(3, 100);
        assert!(bucket.try_acquire(3, 1, 1, 3, 100));
        assert!(!bucket.try_acquire(3, 1, 1, 1, 90));
        assert_eq!(bucket.last_refill_time, 100);
        assert!(bucket.try_acquire(3, 1, 1, 1, 101));
    }
}
