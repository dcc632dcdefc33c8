use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::backend::{BackendError, KeyValueBackend};
use super::clock::Clock;

struct Entry {
    value: String,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-memory stand-in for the Redis backend, used by tests and local runs
/// without a store. Expiry is evaluated lazily against the injected clock.
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn deadline(&self, ttl: Duration) -> Option<u64> {
        Some(self.clock.now_unix() + ttl.as_secs())
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = self.clock.now_unix();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: self.deadline(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, BackendError> {
        let now = self.clock.now_unix();
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64, BackendError> {
        let now = self.clock.now_unix();
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            entries.remove(key);
        }
        match entries.get_mut(key) {
            Some(entry) => {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| BackendError::InvalidValue(format!("key '{}' is not an integer", key)))?;
                let next = current + amount;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: amount.to_string(),
                        expires_at: None,
                    },
                );
                Ok(amount)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let now = self.clock.now_unix();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl.as_secs());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64, BackendError> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let now = self.clock.now_unix();
        let mut entries = self.entries.write().await;
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
