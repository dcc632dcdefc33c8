use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

use super::backend::{BackendError, KeyValueBackend};
use crate::config::RedisConfig;

/// Redis-backed store. The connection manager reconnects on its own; every
/// command runs under a bounded timeout so an outage degrades the request
/// instead of hanging it.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisBackend {
    pub async fn connect(config: &RedisConfig) -> Result<Self, BackendError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        tracing::info!(url = %config.url, "connected to redis");

        Ok(Self {
            conn,
            timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.kind() == redis::ErrorKind::TypeError => {
                Err(BackendError::InvalidValue(e.to_string()))
            }
            Ok(Err(e)) => Err(BackendError::Unavailable(e.to_string())),
            Err(_) => Err(BackendError::Unavailable("redis command timed out".to_string())),
        }
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.bounded(async move {
            let value: Option<String> = conn.get(&key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        // SETEX rejects a zero expiry
        let secs = ttl.as_secs().max(1);
        self.bounded(async move {
            let _: () = conn.set_ex(&key, &value, secs).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let keys = keys.to_vec();
        self.bounded(async move {
            let removed: u64 = conn.del(&keys).await?;
            Ok(removed)
        })
        .await
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64, BackendError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.bounded(async move {
            let next: i64 = conn.incr(&key, amount).await?;
            Ok(next)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let secs = ttl.as_secs().max(1) as i64;
        self.bounded(async move {
            let applied: bool = conn.expire(&key, secs).await?;
            Ok(applied)
        })
        .await
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64, BackendError> {
        let mut conn = self.conn.clone();
        let pattern = pattern.to_string();
        self.bounded(async move {
            let keys: Vec<String> = {
                let mut iter = conn.scan_match(&pattern).await?;
                let mut keys = Vec::new();
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
                keys
            };
            if keys.is_empty() {
                return Ok(0);
            }
            let removed: u64 = conn.del(&keys).await?;
            Ok(removed)
        })
        .await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}
