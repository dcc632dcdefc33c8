use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from a key-value backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored value is not usable here: {0}")]
    InvalidValue(String),
}

/// Minimal atomic key-value surface the gateway needs from its backing store.
///
/// Atomicity for `incr_by` is the store's responsibility; the gateway performs
/// no client-side locking. Implementations must bound their own I/O so a store
/// outage degrades a request instead of hanging it.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError>;

    /// Atomic add-and-return. A missing key counts from zero.
    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64, BackendError>;

    /// Set a TTL on an existing key; false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

    /// Delete every key matching a glob-style pattern (trailing `*`),
    /// returning how many were removed.
    async fn scan_delete(&self, pattern: &str) -> Result<u64, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}
