use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid snapshot payload: {0}")]
    InvalidSnapshotPayload(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Invalid location history data: {0}")]
    InvalidImport(String),

    #[error("Not logged in")]
    NotAuthenticated,
}

impl CacheError {
    /// True when the remote rejected the stored credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// True when a later sync trigger can pick up where this failure left off
    /// without any user action.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::StorageFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl<T> From<std::sync::PoisonError<T>> for CacheError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::StorageFailure(err.to_string())
    }
}
