use super::StorageBackend;
use crate::core::{CacheError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Process-local `StorageBackend`, used by tests and ephemeral sessions.
///
/// Reads and writes can be made to fail on demand to exercise the
/// storage-failure paths of callers.
#[derive(Default)]
pub struct InMemoryBackend {
    blobs: RwLock<HashMap<String, Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob directly, bypassing failure injection
    pub async fn seed(&self, key: &str, value: Value) {
        self.blobs.write().await.insert(key.to_string(), value);
    }

    /// Current raw blob under `key`
    pub async fn raw(&self, key: &str) -> Option<Value> {
        self.blobs.read().await.get(key).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::StorageFailure(format!(
                "read of '{}' rejected",
                key
            )));
        }
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::StorageFailure(format!(
                "write of '{}' rejected",
                key
            )));
        }
        self.blobs.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::StorageFailure(format!(
                "remove of '{}' rejected",
                key
            )));
        }
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_and_remove() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.read("k").await.unwrap(), None);
        backend.write("k", json!({"a": 1})).await.unwrap();
        assert_eq!(backend.read("k").await.unwrap(), Some(json!({"a": 1})));
        backend.remove("k").await.unwrap();
        backend.remove("k").await.unwrap();
        assert_eq!(backend.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let backend = InMemoryBackend::new();
        backend.set_fail_writes(true);
        let err = backend.write("k", json!(1)).await.unwrap_err();
        assert!(matches!(err, CacheError::StorageFailure(_)));
        backend.set_fail_writes(false);
        backend.set_fail_reads(true);
        assert!(backend.read("k").await.is_err());
    }
}
