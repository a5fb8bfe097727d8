//! Rategate - Rate Limiting Decision Engine
//!
//! This crate decides, for each operation identified by a string key, whether
//! to admit or reject it so admissions stay within a configured envelope.
//! State lives either in process or in a shared key-value store updated by
//! atomic server-side scripts.
//!
//! ```
//! use rategate::config::RateLimiterConfig;
//! use rategate::ratelimit::{Algorithm, LimitSpec, RateLimiter};
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiter::new(RateLimiterConfig::default());
//! let spec = LimitSpec::new(Algorithm::FixedWindow).limit(2).window_seconds(60);
//!
//! assert!(limiter.decide("client-a", &spec).await.unwrap());
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
