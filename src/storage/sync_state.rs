use super::StorageBackend;
use crate::core::{CacheError, Result, SyncState};
use std::sync::Arc;
use tracing::{error, warn};

/// Storage key of the persisted [`SyncState`].
pub const SYNC_STATE_KEY: &str = "xbuddySignatureVersion";

/// Persists the highest remote snapshot version applied locally.
#[derive(Clone)]
pub struct SyncStateStore {
    backend: Arc<dyn StorageBackend>,
}

impl SyncStateStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Reads the state; unreadable or missing state starts over at version 0.
    pub async fn read(&self) -> SyncState {
        match self.try_read().await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "sync state read failed, starting from version 0");
                SyncState::default()
            }
        }
    }

    pub async fn try_read(&self) -> Result<SyncState> {
        let Some(value) = self.backend.read(SYNC_STATE_KEY).await? else {
            return Ok(SyncState::default());
        };
        if value.is_null() {
            return Ok(SyncState::default());
        }
        serde_json::from_value::<SyncState>(value)
            .map_err(|err| CacheError::StorageFailure(format!("parse sync state: {}", err)))
    }

    /// Writes the state. A failed write is logged and otherwise ignored; the
    /// next session simply re-fetches from the last persisted version.
    pub async fn write(&self, state: SyncState) -> bool {
        let value = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(err) => {
                error!(error = %err, "sync state serialization failed");
                return false;
            }
        };
        match self.backend.write(SYNC_STATE_KEY, value).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, version = state.version, "sync state write failed");
                false
            }
        }
    }

    pub async fn reset(&self) -> Result<()> {
        self.backend.remove(SYNC_STATE_KEY).await
    }
}
