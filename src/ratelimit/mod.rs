//! Rate limiting decisions and state management.

pub mod algorithm;
pub mod backend;
pub mod key;
mod limiter;
pub mod local;
pub mod remote;
pub mod spec;

pub use backend::ScriptExecutor;
pub use key::KeyNormalizer;
pub use limiter::{RateLimitOutcome, RateLimiter};
pub use local::LocalStore;
pub use remote::memory::MemoryScriptExecutor;
pub use remote::redis::RedisScriptExecutor;
pub use remote::{RemoteLimiter, RemoteScript};
pub use spec::{Algorithm, Backend, LimitSpec};
