//! In-process shared-store emulation.
//!
//! [`MemoryScriptExecutor`] keeps a small keyspace (strings, hashes, sorted
//! sets, per-key expiry) and runs each limiter script as the same sequence
//! of store primitives the Lua source issues, under one lock. It reads time
//! from its own clock, the way a real store uses `TIME`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::RemoteScript;
use crate::clock::Clock;
use crate::error::{RateGateError, Result};
use crate::ratelimit::backend::ScriptExecutor;
use crate::ratelimit::spec::Algorithm;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    /// member -> score
    ZSet(HashMap<String, i64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::ZSet(_) => "zset",
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    /// Absolute expiry in seconds
    expires_at: Option<i64>,
}

fn wrong_type(key: &str) -> RateGateError {
    RateGateError::Backend(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {}",
        key
    ))
}

/// Keyspace primitives, each named after the store command it models.
#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
    /// Makes sorted-set members unique even within one microsecond
    member_seq: u64,
}

impl Keyspace {
    fn live(&mut self, key: &str, now: i64) -> Option<&mut Slot> {
        let expired = self
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }

    fn type_of(&mut self, key: &str, now: i64) -> &'static str {
        self.live(key, now).map_or("none", |slot| slot.value.type_name())
    }

    fn del(&mut self, key: &str) {
        self.slots.remove(key);
    }

    fn get(&mut self, key: &str, now: i64) -> Result<Option<String>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Plain SET drops any expiry.
    fn set(&mut self, key: &str, value: String) {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value),
                expires_at: None,
            },
        );
    }

    fn incrby(&mut self, key: &str, by: i64, now: i64) -> Result<i64> {
        match self.live(key, now) {
            None => {
                self.set(key, by.to_string());
                Ok(by)
            }
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => {
                let current: i64 = s.parse().map_err(|_| {
                    RateGateError::Backend("ERR value is not an integer or out of range".into())
                })?;
                let next = current.checked_add(by).ok_or_else(|| {
                    RateGateError::Backend("ERR increment or decrement would overflow".into())
                })?;
                *s = next.to_string();
                Ok(next)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn expire(&mut self, key: &str, seconds: i64, now: i64) {
        if let Some(slot) = self.live(key, now) {
            slot.expires_at = Some(now.saturating_add(seconds));
        }
    }

    fn hmget(&mut self, key: &str, fields: &[&str], now: i64) -> Result<Vec<Option<String>>> {
        match self.live(key, now) {
            None => Ok(vec![None; fields.len()]),
            Some(Slot {
                value: Value::Hash(hash),
                ..
            }) => Ok(fields.iter().map(|f| hash.get(*f).cloned()).collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hmset(&mut self, key: &str, pairs: &[(&str, i64)], now: i64) -> Result<()> {
        if self.live(key, now).is_none() {
            self.slots.insert(
                key.to_string(),
                Slot {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.slots.get_mut(key) {
            Some(Slot {
                value: Value::Hash(hash),
                ..
            }) => {
                for (field, value) in pairs {
                    hash.insert((*field).to_string(), value.to_string());
                }
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    fn zset_mut(&mut self, key: &str, now: i64) -> Result<Option<&mut HashMap<String, i64>>> {
        match self.live(key, now) {
            None => Ok(None),
            Some(Slot {
                value: Value::ZSet(set),
                ..
            }) => Ok(Some(set)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// ZREMRANGEBYSCORE key -inf (below
    fn zremrangebyscore_below(&mut self, key: &str, below: i64, now: i64) -> Result<()> {
        let emptied = match self.zset_mut(key, now)? {
            Some(set) => {
                set.retain(|_, score| *score >= below);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.del(key);
        }
        Ok(())
    }

    /// Length of ZRANGEBYSCORE key min max.
    fn zrangebyscore_len(&mut self, key: &str, min: i64, max: i64, now: i64) -> Result<usize> {
        Ok(self
            .zset_mut(key, now)?
            .map_or(0, |set| set.values().filter(|s| (min..=max).contains(*s)).count()))
    }

    fn zadd(&mut self, key: &str, score: i64, member: String, now: i64) -> Result<()> {
        if self.live(key, now).is_none() {
            self.slots.insert(
                key.to_string(),
                Slot {
                    value: Value::ZSet(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.zset_mut(key, now)? {
            Some(set) => {
                set.insert(member, score);
                Ok(())
            }
            None => Err(wrong_type(key)),
        }
    }
}

/// A [`ScriptExecutor`] backed by an in-process keyspace.
#[derive(Debug)]
pub struct MemoryScriptExecutor {
    keyspace: Mutex<Keyspace>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl MemoryScriptExecutor {
    /// Create an empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The store's `TYPE` for `key`.
    pub fn key_type(&self, key: &str) -> &'static str {
        let now = self.clock.now_secs();
        self.keyspace.lock().type_of(key, now)
    }

    /// String value of `key`, if it holds one.
    pub fn get_string(&self, key: &str) -> Option<String> {
        let now = self.clock.now_secs();
        self.keyspace.lock().get(key, now).ok().flatten()
    }

    /// Overwrite `key` with a string value.
    pub fn set_string(&self, key: &str, value: impl Into<String>) {
        self.keyspace.lock().set(key, value.into());
    }

    /// Integer value of a hash field.
    pub fn hash_field(&self, key: &str, field: &str) -> Option<i64> {
        let now = self.clock.now_secs();
        self.keyspace
            .lock()
            .hmget(key, &[field], now)
            .ok()
            .and_then(|mut values| values.pop().flatten())
            .and_then(|v| v.parse().ok())
    }

    /// Members of the sorted set at `key`.
    pub fn zcard(&self, key: &str) -> usize {
        let now = self.clock.now_secs();
        self.keyspace
            .lock()
            .zset_mut(key, now)
            .ok()
            .flatten()
            .map_or(0, |set| set.len())
    }

    /// Remaining time to live of `key` in seconds, if it has one.
    pub fn ttl(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_secs();
        self.keyspace
            .lock()
            .live(key, now)
            .and_then(|slot| slot.expires_at)
            .map(|at| at - now)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_secs();
        let mut keyspace = self.keyspace.lock();
        keyspace.slots.retain(|_, slot| slot.expires_at.map_or(true, |at| at > now));
        keyspace.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fixed_window(ks: &mut Keyspace, key: &str, argv: &[i64], now: i64) -> Result<i64> {
        let (limit, window_size, permits) = (argv[0], argv[1], argv[2]);
        let window_start = now.div_euclid(window_size) * window_size;

        let (mut count, mut stored_start): (i64, i64) = (0, window_start);
        if let Some(stored) = ks.get(key, now)? {
            if let Some((c, s)) = stored.split_once(':') {
                count = c.parse().unwrap_or(0);
                stored_start = s.parse().unwrap_or(window_start);
            }
        }

        if window_start > stored_start {
            count = 0;
            stored_start = window_start;
        }

        match count.checked_add(permits) {
            Some(next) if next <= limit => {
                ks.set(key, format!("{}:{}", next, stored_start));
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn reset_if_not_hash(ks: &mut Keyspace, key: &str, now: i64) {
        let key_type = ks.type_of(key, now);
        if key_type != "hash" && key_type != "none" {
            warn!(key = %key, key_type = key_type, "Resetting limiter key of unexpected type");
            ks.del(key);
        }
    }

    fn token_bucket(ks: &mut Keyspace, key: &str, argv: &[i64], now: i64) -> Result<i64> {
        let (capacity, refill_amount, refill_interval, permits) =
            (argv[0], argv[1], argv[2], argv[3]);
        Self::reset_if_not_hash(ks, key, now);

        let state = ks.hmget(key, &["tokens", "last_refill_time"], now)?;
        let parsed = (
            state[0].as_deref().and_then(|v| v.parse::<i64>().ok()),
            state[1].as_deref().and_then(|v| v.parse::<i64>().ok()),
        );
        let (mut tokens, mut last_refill_time) = match parsed {
            (Some(tokens), Some(last)) => (tokens, last),
            _ => (capacity, now),
        };

        let elapsed = (now - last_refill_time).max(0);
        let intervals = elapsed.div_euclid(refill_interval);
        tokens = tokens
            .saturating_add(intervals.saturating_mul(refill_amount))
            .min(capacity)
            .max(0);
        last_refill_time = last_refill_time.max(now);

        let mut admitted = 0;
        if tokens >= permits {
            tokens -= permits;
            admitted = 1;
        }

        ks.hmset(
            key,
            &[("tokens", tokens), ("last_refill_time", last_refill_time)],
            now,
        )?;
        Ok(admitted)
    }

    fn leaky_bucket(ks: &mut Keyspace, key: &str, argv: &[i64], now: i64) -> Result<i64> {
        let (capacity, leak_rate, permits) = (argv[0], argv[1], argv[2]);
        Self::reset_if_not_hash(ks, key, now);

        let state = ks.hmget(key, &["current_size", "last_process_time"], now)?;
        let parsed = (
            state[0].as_deref().and_then(|v| v.parse::<i64>().ok()),
            state[1].as_deref().and_then(|v| v.parse::<i64>().ok()),
        );
        let (mut current_size, mut last_process_time) = match parsed {
            (Some(size), Some(last)) => (size, last),
            _ => (0, now),
        };

        let elapsed = (now - last_process_time).max(0);
        let leaked = elapsed.saturating_mul(leak_rate);
        current_size = current_size.saturating_sub(leaked).max(0);
        last_process_time = last_process_time.max(now);

        let mut admitted = 0;
        if let Some(next) = current_size.checked_add(permits).filter(|&n| n <= capacity) {
            current_size = next;
            admitted = 1;
        }

        ks.hmset(
            key,
            &[
                ("current_size", current_size),
                ("last_process_time", last_process_time),
            ],
            now,
        )?;
        Ok(admitted)
    }

    fn sliding_log(
        ks: &mut Keyspace,
        key: &str,
        argv: &[i64],
        now: i64,
        micros: i64,
    ) -> Result<i64> {
        let (limit, window_size, permits) = (argv[0], argv[1], argv[2]);
        let oldest = now.saturating_sub(window_size);

        ks.zremrangebyscore_below(key, oldest, now)?;
        let count = ks.zrangebyscore_len(key, oldest, now, now)? as i64;

        let mut admitted = 0;
        if count.checked_add(permits).is_some_and(|n| n <= limit) {
            let mut rng = rand::thread_rng();
            for i in 1..=permits {
                ks.member_seq += 1;
                let seq = ks.member_seq;
                let nonce = format!("{}-{}-{}-{}", micros, i, seq, rng.gen_range(1..=1_000_000));
                let member = format!("{}:{}", now, nonce);
                ks.zadd(key, now, member, now)?;
            }
            admitted = 1;
        }

        ks.expire(key, window_size.saturating_mul(2), now);
        Ok(admitted)
    }

    fn sliding_counter(ks: &mut Keyspace, key: &str, argv: &[i64], now: i64) -> Result<i64> {
        let (limit, window_size, sub_windows, permits) = (argv[0], argv[1], argv[2], argv[3]);
        let current = crate::ratelimit::algorithm::sub_window_index(window_size, sub_windows, now);

        let mut total: i64 = 0;
        for i in 0..sub_windows {
            let count = ks
                .get(&format!("{}:{}", key, current.saturating_sub(i)), now)?
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            total = total.saturating_add(count);
        }

        if total.checked_add(permits).is_some_and(|n| n <= limit) {
            let current_key = format!("{}:{}", key, current);
            ks.incrby(&current_key, permits, now)?;
            ks.expire(&current_key, window_size.saturating_add(10), now);
            return Ok(1);
        }
        Ok(0)
    }
}

fn expected_args(algorithm: Algorithm) -> usize {
    match algorithm {
        Algorithm::FixedWindow | Algorithm::LeakyBucket | Algorithm::SlidingLog => 3,
        Algorithm::TokenBucket | Algorithm::SlidingCounter => 4,
    }
}

#[async_trait]
impl ScriptExecutor for MemoryScriptExecutor {
    async fn execute(&self, script: &RemoteScript, keys: &[String], argv: &[i64]) -> Result<i64> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(RateGateError::Backend("connection refused".into()));
        }
        let [key] = keys else {
            return Err(RateGateError::Backend(format!(
                "expected exactly one key, got {}",
                keys.len()
            )));
        };
        if argv.len() != expected_args(script.algorithm) {
            return Err(RateGateError::Backend(format!(
                "{} script expects {} arguments, got {}",
                script.algorithm,
                expected_args(script.algorithm),
                argv.len()
            )));
        }

        let now_ms = self.clock.now_millis();
        let now = now_ms.div_euclid(1000);
        let micros = now_ms.rem_euclid(1000) * 1000;

        let mut keyspace = self.keyspace.lock();
        let ks = &mut *keyspace;
        match script.algorithm {
            Algorithm::FixedWindow => Self::fixed_window(ks, key, argv, now),
            Algorithm::TokenBucket => Self::token_bucket(ks, key, argv, now),
            Algorithm::LeakyBucket => Self::leaky_bucket(ks, key, argv, now),
            Algorithm::SlidingLog => Self::sliding_log(ks, key, argv, now, micros),
            Algorithm::SlidingCounter => Self::sliding_counter(ks, key, argv, now),
        }
    }
}
