//! The Lua scripts, run on a live Redis server.
//!
//! Set `REDIS_URL` (for example `redis://127.0.0.1:6379`) to run these.
//! Without it every test returns early.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use rategate::clock::SystemClock;
use rategate::config::RemoteConfig;
use rategate::ratelimit::{
    Algorithm, LimitSpec, MemoryScriptExecutor, RedisScriptExecutor, RemoteLimiter,
};

struct Server {
    limiter: RemoteLimiter,
    connection: MultiplexedConnection,
}

async fn server() -> Option<Server> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping");
        return None;
    };
    let config = RemoteConfig {
        url: url.clone(),
        timeout_ms: 2000,
    };
    let executor = RedisScriptExecutor::connect(&config).await.unwrap();
    let connection = redis::Client::open(url)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    Some(Server {
        limiter: RemoteLimiter::new(Arc::new(executor)),
        connection,
    })
}

fn unique_key(name: &str) -> String {
    format!("rategate-test:{}:{}", name, rand::thread_rng().gen::<u64>())
}

async fn cleanup(connection: &mut MultiplexedConnection, key: &str) {
    let mut keys: Vec<String> = connection.keys(format!("{}:*", key)).await.unwrap();
    keys.push(key.to_string());
    let _: () = connection.del(keys).await.unwrap();
}

async fn run(limiter: &RemoteLimiter, key: &str, spec: &LimitSpec, permits: &[i64]) -> Vec<bool> {
    let mut outcomes = Vec::with_capacity(permits.len());
    for &p in permits {
        let spec = spec.clone().permits(p);
        outcomes.push(limiter.try_acquire(key, &spec).await.unwrap());
    }
    outcomes
}

// Windows and refill intervals long enough that the wall clock cannot move a
// decision while the test runs.
const LONG: i64 = 1_000_000_000;

fn long_specs() -> Vec<LimitSpec> {
    vec![
        LimitSpec::new(Algorithm::FixedWindow)
            .limit(5)
            .window_seconds(LONG),
        LimitSpec::new(Algorithm::TokenBucket)
            .capacity(5)
            .refill_amount(1)
            .refill_interval_seconds(LONG),
        LimitSpec::new(Algorithm::LeakyBucket)
            .capacity(5)
            .leak_rate(0),
        LimitSpec::new(Algorithm::SlidingLog)
            .limit(5)
            .window_seconds(LONG),
        LimitSpec::new(Algorithm::SlidingCounter)
            .limit(5)
            .window_seconds(LONG)
            .sub_windows(10),
    ]
}

#[tokio::test]
async fn scripts_match_the_in_process_store() {
    let Some(mut server) = server().await else {
        return;
    };
    let memory = RemoteLimiter::new(Arc::new(MemoryScriptExecutor::new(Arc::new(SystemClock))));
    let permits = [1, 2, 3, 2, 1, 1];
    let expected = vec![true, true, false, true, false, false];

    for spec in long_specs() {
        let key = unique_key(spec.algorithm.as_str());
        let on_redis = run(&server.limiter, &key, &spec, &permits).await;
        let in_memory = run(&memory, &key, &spec, &permits).await;
        cleanup(&mut server.connection, &key).await;

        assert_eq!(on_redis, expected, "{}", spec.algorithm);
        assert_eq!(in_memory, on_redis, "{}", spec.algorithm);
    }
}

#[tokio::test]
async fn oversized_requests_are_rejected() {
    let Some(mut server) = server().await else {
        return;
    };

    for spec in long_specs() {
        let key = unique_key(spec.algorithm.as_str());
        let outcomes = run(&server.limiter, &key, &spec, &[6, 5]).await;
        cleanup(&mut server.connection, &key).await;

        assert_eq!(outcomes, vec![false, true], "{}", spec.algorithm);
    }
}

#[tokio::test]
async fn hash_scripts_reset_keys_of_another_type() {
    let Some(mut server) = server().await else {
        return;
    };
    let specs = [
        LimitSpec::new(Algorithm::TokenBucket).capacity(1),
        LimitSpec::new(Algorithm::LeakyBucket).capacity(1),
    ];

    for spec in specs {
        let key = unique_key(spec.algorithm.as_str());
        let _: () = server.connection.set(&key, "3:0").await.unwrap();

        let admitted = server.limiter.try_acquire(&key, &spec).await.unwrap();
        let key_type: String = server.connection.key_type(&key).await.unwrap();
        cleanup(&mut server.connection, &key).await;

        assert!(admitted, "{}", spec.algorithm);
        assert_eq!(key_type, "hash", "{}", spec.algorithm);
    }
}

#[tokio::test]
async fn sliding_counter_keys_carry_integer_indexes() {
    let Some(mut server) = server().await else {
        return;
    };
    let spec = LimitSpec::new(Algorithm::SlidingCounter)
        .limit(5)
        .window_seconds(60)
        .sub_windows(6);
    let key = unique_key("counter");

    assert!(server.limiter.try_acquire(&key, &spec).await.unwrap());
    let keys: Vec<String> = server.connection.keys(format!("{}:*", key)).await.unwrap();
    let ttl: i64 = match keys.first() {
        Some(sub_key) => server.connection.ttl(sub_key).await.unwrap(),
        None => -2,
    };
    cleanup(&mut server.connection, &key).await;

    assert_eq!(keys.len(), 1);
    let index = keys[0].rsplit(':').next().unwrap();
    assert!(index.parse::<i64>().is_ok(), "sub-window key {}", keys[0]);
    assert!((1..=70).contains(&ttl), "ttl {}", ttl);
}

#[tokio::test]
async fn sliding_log_members_and_trimming() {
    let Some(mut server) = server().await else {
        return;
    };
    let spec = LimitSpec::new(Algorithm::SlidingLog)
        .limit(1)
        .window_seconds(1);
    let key = unique_key("log");

    assert!(server.limiter.try_acquire(&key, &spec).await.unwrap());
    assert!(!server.limiter.try_acquire(&key, &spec).await.unwrap());

    let members: Vec<String> = server.connection.zrange(&key, 0, -1).await.unwrap();
    assert_eq!(members.len(), 1);
    let (ts, nonce) = members[0].split_once(':').unwrap();
    assert!(ts.parse::<i64>().is_ok(), "member {}", members[0]);
    assert!(!nonce.is_empty() && !nonce.contains(':'), "member {}", members[0]);

    // Two whole seconds later the first entry is below now - window
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(server.limiter.try_acquire(&key, &spec).await.unwrap());
    let remaining: i64 = server.connection.zcard(&key).await.unwrap();
    cleanup(&mut server.connection, &key).await;

    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn token_bucket_refills_on_store_time() {
    let Some(mut server) = server().await else {
        return;
    };
    let spec = LimitSpec::new(Algorithm::TokenBucket)
        .capacity(2)
        .refill_amount(1)
        .refill_interval_seconds(1);
    let key = unique_key("bucket");

    let burst = run(&server.limiter, &key, &spec, &[1, 1, 1]).await;
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let refilled = server.limiter.try_acquire(&key, &spec).await.unwrap();
    cleanup(&mut server.connection, &key).await;

    // The burst may straddle a second boundary and pick up one token
    assert!(burst[0] && burst[1]);
    assert!(refilled);
}
