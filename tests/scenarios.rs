//! End-to-end decision scenarios on a virtual clock, run against both backends.

use std::sync::Arc;

use rategate::clock::ManualClock;
use rategate::config::RateLimiterConfig;
use rategate::ratelimit::{Algorithm, Backend, LimitSpec, MemoryScriptExecutor, RateLimiter};

fn limiter_at(secs: i64) -> (Arc<ManualClock>, RateLimiter) {
    let clock = Arc::new(ManualClock::at_secs(secs));
    let store = Arc::new(MemoryScriptExecutor::new(clock.clone()));
    let limiter =
        RateLimiter::with_clock(RateLimiterConfig::default(), clock.clone()).with_remote(store);
    (clock, limiter)
}

async fn admits(limiter: &RateLimiter, key: &str, spec: &LimitSpec, n: usize) -> Vec<bool> {
    let mut outcomes = Vec::with_capacity(n);
    for _ in 0..n {
        outcomes.push(limiter.decide(key, spec).await.unwrap());
    }
    outcomes
}

const BACKENDS: [Backend; 2] = [Backend::Local, Backend::Remote];

#[tokio::test]
async fn fixed_window_admits_exactly_limit_per_window() {
    for backend in BACKENDS {
        let (clock, limiter) = limiter_at(1000);
        let spec = LimitSpec::new(Algorithm::FixedWindow)
            .limit(5)
            .window_seconds(60)
            .backend(backend);

        assert_eq!(admits(&limiter, "fw", &spec, 5).await, vec![true; 5], "{backend}");
        assert!(!limiter.decide("fw", &spec).await.unwrap(), "{backend}");

        clock.set_secs(1060);
        assert!(limiter.decide("fw", &spec).await.unwrap(), "{backend}");
    }
}

#[tokio::test]
async fn token_bucket_burst_then_refill() {
    for backend in BACKENDS {
        let (clock, limiter) = limiter_at(0);
        let spec = LimitSpec::new(Algorithm::TokenBucket)
            .capacity(10)
            .refill_amount(1)
            .refill_interval_seconds(1)
            .permits(1)
            .backend(backend);

        assert_eq!(admits(&limiter, "tb", &spec, 10).await, vec![true; 10], "{backend}");
        assert!(!limiter.decide("tb", &spec).await.unwrap(), "{backend}");

        clock.set_secs(3);
        assert_eq!(admits(&limiter, "tb", &spec, 3).await, vec![true; 3], "{backend}");
        assert!(!limiter.decide("tb", &spec).await.unwrap(), "{backend}");
    }
}

#[tokio::test]
async fn leaky_bucket_saturates_and_drains() {
    for backend in BACKENDS {
        let (clock, limiter) = limiter_at(0);
        let spec = LimitSpec::new(Algorithm::LeakyBucket)
            .capacity(5)
            .leak_rate(1)
            .permits(1)
            .backend(backend);

        assert_eq!(admits(&limiter, "lb", &spec, 5).await, vec![true; 5], "{backend}");
        assert!(!limiter.decide("lb", &spec).await.unwrap(), "{backend}");

        clock.set_secs(2);
        assert_eq!(
            admits(&limiter, "lb", &spec, 3).await,
            vec![true, true, false],
            "{backend}"
        );
    }
}

#[tokio::test]
async fn sliding_log_trims_old_entries() {
    for backend in BACKENDS {
        let (clock, limiter) = limiter_at(0);
        let spec = LimitSpec::new(Algorithm::SlidingLog)
            .limit(3)
            .window_seconds(10)
            .backend(backend);

        for t in 0..3 {
            clock.set_secs(t);
            assert!(limiter.decide("log", &spec).await.unwrap(), "{backend} t={t}");
        }
        clock.set_secs(3);
        assert!(!limiter.decide("log", &spec).await.unwrap(), "{backend}");

        // [1, 11] no longer holds t=0
        clock.set_secs(11);
        assert!(limiter.decide("log", &spec).await.unwrap(), "{backend}");

        // [2, 12] holds t=2 and t=11
        clock.set_secs(12);
        assert!(limiter.decide("log", &spec).await.unwrap(), "{backend}");
        assert!(!limiter.decide("log", &spec).await.unwrap(), "{backend}");
    }
}

#[tokio::test]
async fn sliding_counter_blends_sub_windows() {
    for backend in BACKENDS {
        let k = 500;
        let (clock, limiter) = limiter_at(k);
        let spec = LimitSpec::new(Algorithm::SlidingCounter)
            .limit(10)
            .window_seconds(10)
            .sub_windows(10)
            .backend(backend);

        assert_eq!(admits(&limiter, "sc", &spec, 10).await, vec![true; 10], "{backend}");

        clock.set_secs(k + 1);
        assert!(!limiter.decide("sc", &spec).await.unwrap(), "{backend}");

        clock.set_secs(k + 10);
        assert!(limiter.decide("sc", &spec).await.unwrap(), "{backend}");
    }
}

#[tokio::test]
async fn remote_backend_without_store_rejects() {
    let limiter = RateLimiter::with_clock(
        RateLimiterConfig::default(),
        Arc::new(ManualClock::at_secs(0)),
    );

    for algorithm in Algorithm::ALL {
        let spec = LimitSpec::new(algorithm).backend(Backend::Remote);
        let result = limiter.decide("k", &spec).await;
        assert!(matches!(result, Ok(false)), "{algorithm}: {result:?}");
    }
}

#[tokio::test]
async fn distinct_keys_are_independent() {
    for backend in BACKENDS {
        for algorithm in Algorithm::ALL {
            let (_, limiter) = limiter_at(100);
            let spec = LimitSpec::new(algorithm)
                .limit(2)
                .capacity(2)
                .leak_rate(0)
                .refill_amount(0)
                .backend(backend);

            assert_eq!(admits(&limiter, "a", &spec, 3).await, vec![true, true, false]);
            assert_eq!(admits(&limiter, "b", &spec, 3).await, vec![true, true, false]);
        }
    }
}

#[tokio::test]
async fn rejection_advances_token_bucket_clock() {
    for backend in BACKENDS {
        let (clock, limiter) = limiter_at(0);
        let spec = LimitSpec::new(Algorithm::TokenBucket)
            .capacity(1)
            .refill_amount(1)
            .refill_interval_seconds(3)
            .backend(backend);

        assert!(limiter.decide("tb", &spec).await.unwrap());
        clock.set_secs(2);
        assert!(!limiter.decide("tb", &spec).await.unwrap(), "{backend}");
        // Three seconds after t=0 but only one after the rejected call
        clock.set_secs(3);
        assert!(!limiter.decide("tb", &spec).await.unwrap(), "{backend}");
        clock.set_secs(5);
        assert!(!limiter.decide("tb", &spec).await.unwrap(), "{backend}");
        clock.set_secs(8);
        assert!(limiter.decide("tb", &spec).await.unwrap(), "{backend}");
    }
}
