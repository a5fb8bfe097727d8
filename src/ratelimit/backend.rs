//! Script executor trait for abstracting the shared store.

use async_trait::async_trait;

use super::remote::RemoteScript;
use crate::error::Result;

/// An external key-value store that runs scripts atomically.
///
/// Implementations run `script` with `KEYS = keys` and `ARGV = argv` as one
/// indivisible server-side operation and return its integer reply. Time read
/// inside the script comes from the store's own clock.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script: &RemoteScript, keys: &[String], argv: &[i64]) -> Result<i64>;
}
