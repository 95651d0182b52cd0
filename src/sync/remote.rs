use super::wire::ExportDocument;
use crate::core::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Remote signature repository.
///
/// Implementations map rejected credentials to `CacheError::Unauthorized` and
/// transport or decoding problems to `CacheError::NetworkFailure`. Shape
/// validation of the returned JSON is left to the caller.
#[async_trait]
pub trait SignatureRemote: Send + Sync {
    /// Fetches the manifest describing how to get from `current_version` to
    /// the latest snapshot version.
    async fn fetch_manifest(&self, current_version: u64, token: &str) -> Result<Value>;

    /// Fetches a base or delta snapshot named by the manifest. `url` may be
    /// relative to the service base.
    async fn fetch_snapshot(&self, url: &str, token: &str, description: &str) -> Result<Value>;

    /// Uploads the full merged store as the current observation set.
    async fn upload(&self, document: &ExportDocument, token: &str) -> Result<()>;
}
