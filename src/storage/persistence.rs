//! File-backed key-value persistence for the location cache

use super::StorageBackend;
use crate::core::{CacheError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::task;

// ============================================================================
// File Backend
// ============================================================================

/// Stores each key as `<root>/<key>.json`.
///
/// Writes go to a temporary file in the same directory which is synced and then
/// renamed over the target, so a crash never leaves a torn blob behind.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CacheError::StorageFailure(format!(
                "Invalid storage key '{}'",
                key
            )));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(CacheError::StorageFailure(format!(
                    "Failed to read '{}': {}",
                    path.display(),
                    err
                )));
            }
        };

        let value = serde_json::from_slice::<Value>(&bytes).map_err(|err| {
            CacheError::StorageFailure(format!("Failed to parse '{}': {}", path.display(), err))
        })?;
        Ok(Some(value))
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        let root = self.root.clone();
        let serialized = serde_json::to_vec_pretty(&value).map_err(|err| {
            CacheError::StorageFailure(format!("Failed to serialize '{}': {}", key, err))
        })?;

        task::spawn_blocking(move || write_atomically(&root, &path, &serialized))
            .await
            .map_err(|err| CacheError::StorageFailure(format!("Write task failed: {}", err)))?
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::StorageFailure(format!(
                "Failed to remove '{}': {}",
                path.display(),
                err
            ))),
        }
    }
}

fn write_atomically(root: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    fs::create_dir_all(root).map_err(|e| {
        CacheError::StorageFailure(format!("Failed to create data directory: {}", e))
    })?;
    let mut temp = NamedTempFile::new_in(root)
        .map_err(|e| CacheError::StorageFailure(format!("Failed to create temp file: {}", e)))?;
    temp.write_all(bytes)
        .map_err(|e| CacheError::StorageFailure(format!("Failed to write blob: {}", e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| CacheError::StorageFailure(format!("Failed to sync blob: {}", e)))?;
    temp.persist(path)
        .map_err(|e| CacheError::StorageFailure(format!("Failed to rename blob: {}", e)))?;
    Ok(())
}
