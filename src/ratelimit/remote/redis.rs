//! Redis-backed script executor.

use ::redis::aio::ConnectionManager;
use ::redis::{Client, Script};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use super::RemoteScript;
use crate::config::RemoteConfig;
use crate::error::{RateGateError, Result};
use crate::ratelimit::backend::ScriptExecutor;
use crate::ratelimit::spec::Algorithm;

/// Runs limiter scripts on a Redis server.
///
/// Scripts are sent by SHA (`EVALSHA`) and reloaded transparently when the
/// server reports `NOSCRIPT`. The connection manager multiplexes all callers
/// over one connection and reconnects after failures.
#[derive(Clone)]
pub struct RedisScriptExecutor {
    connection: ConnectionManager,
    scripts: HashMap<Algorithm, Script>,
}

impl RedisScriptExecutor {
    /// Connect to the server named by `config.url`.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        info!(addr = %client.get_connection_info().addr, "Connecting to Redis");

        let connection = ConnectionManager::new(client).await?;
        let scripts = RemoteScript::all()
            .map(|script| (script.algorithm, Script::new(script.source)))
            .collect();

        info!("Redis script executor ready");
        Ok(Self {
            connection,
            scripts,
        })
    }
}

#[async_trait]
impl ScriptExecutor for RedisScriptExecutor {
    async fn execute(&self, script: &RemoteScript, keys: &[String], argv: &[i64]) -> Result<i64> {
        let compiled = self.scripts.get(&script.algorithm).ok_or_else(|| {
            RateGateError::Backend(format!("no script loaded for {}", script.algorithm))
        })?;

        debug!(algorithm = %script.algorithm, sha = compiled.get_hash(), "EVALSHA");

        let mut invocation = compiled.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in argv {
            invocation.arg(*arg);
        }

        let mut connection = self.connection.clone();
        let reply: i64 = invocation.invoke_async(&mut connection).await?;
        Ok(reply)
    }
}

impl std::fmt::Debug for RedisScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisScriptExecutor")
            .field("scripts", &self.scripts.len())
            .finish_non_exhaustive()
    }
}
