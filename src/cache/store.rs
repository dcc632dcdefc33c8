use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::backend::{BackendError, KeyValueBackend};

/// Errors surfaced to cache-store callers
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backing store unreachable or timing out. Non-fatal: callers treat this
    /// as "act as if absent".
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The stored value cannot be used for the requested operation (e.g.
    /// incrementing a non-numeric value).
    #[error("invalid cached value: {0}")]
    InvalidValue(String),
}

impl From<BackendError> for CacheError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => CacheError::Unavailable(msg),
            BackendError::InvalidValue(msg) => CacheError::InvalidValue(msg),
        }
    }
}

/// High-level cache operations over a pluggable key-value backend.
///
/// Structured values are stored as canonical JSON strings; primitives pass
/// through. Cheap to clone and share across request handlers.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueBackend>,
    prefix: String,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>, prefix: &str, default_ttl_secs: u64) -> Self {
        Self {
            backend,
            prefix: prefix.to_string(),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build a namespaced key from parts: `{prefix}:{part}:{part}...`
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    /// Fetch and deserialize a value. A stored string that is not valid JSON
    /// comes back as the raw string rather than failing.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw = self.backend.get(key).await?;
        Ok(raw.map(|raw| match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(_) => Value::String(raw),
        }))
    }

    /// Store a value with the given TTL. Failures are logged and reported as
    /// `false`; the computation already happened, the result is simply not
    /// cached this time.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        let serialized = match value {
            Value::String(s) => s.clone(),
            other => match serde_json::to_string(other) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(key, "failed to serialize cache value: {}", e);
                    return false;
                }
            },
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.backend.set(key, &serialized, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, "cache set failed: {}", e);
                false
            }
        }
    }

    /// Delete keys, returning how many existed.
    pub async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        Ok(self.backend.delete(keys).await?)
    }

    /// Atomic add-and-return on a counter key.
    pub async fn increment(&self, key: &str, amount: i64) -> Result<i64, CacheError> {
        Ok(self.backend.incr_by(key, amount).await?)
    }

    /// Apply a TTL to an existing key.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        Ok(self.backend.expire(key, ttl).await?)
    }

    /// Delete every key under a prefix, returning the count removed.
    pub async fn scan_delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        Ok(self.backend.scan_delete(&format!("{}*", prefix)).await?)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        Ok(self.backend.ping().await?)
    }
}
