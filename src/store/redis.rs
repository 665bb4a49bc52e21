//! Redis-backed store for multi-instance deployments.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};

use super::{SharedStore, StoreError, StoreResult};
use crate::config::StoreConfig;

/// INCR, and set the expiry only when this call created the key.
const INCR_WITH_TTL: &str = r#"
local n = redis.call('INCR', KEYS[1])
if n == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    op_timeout: Duration,
    incr_script: Script,
}

impl RedisStore {
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let op_timeout = Duration::from_millis(config.op_timeout_ms);
        let client = Client::open(config.redis_url.as_str())?;
        let conn = tokio::time::timeout(op_timeout * 10, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(op_timeout * 10))??;

        tracing::info!(url = %config.redis_url, "Redis shared store connected");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            op_timeout,
            incr_script: Script::new(INCR_WITH_TTL),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = self.full_key(key);
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get::<_, Option<String>>(&key).await })
            .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let key = self.full_key(key);
        let mut conn = self.conn.clone();
        let millis = ttl.as_millis().max(1) as u64;
        self.bounded(async move { conn.pset_ex::<_, _, ()>(&key, value, millis).await })
            .await
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let key = self.full_key(key);
        let mut conn = self.conn.clone();
        let millis = ttl.as_millis().max(1) as u64;
        let mut invocation = self.incr_script.key(key);
        invocation.arg(millis);
        self.bounded(async move {
            let count: u64 = invocation.invoke_async(&mut conn).await?;
            Ok(count)
        })
        .await
    }
}
