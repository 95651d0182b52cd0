use crate::core::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Durable key-value storage - allows pluggable storage backends
///
/// Every key holds one JSON blob that is read and rewritten as a unit. There
/// is no partial-key durability and no isolation between concurrent writers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the blob stored under `key`, `None` when the key was never written
    async fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the blob stored under `key`
    async fn write(&self, key: &str, value: Value) -> Result<()>;

    /// Delete `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}
