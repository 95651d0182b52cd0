use super::remote::SignatureRemote;
use super::wire::ExportDocument;
use crate::core::{CacheError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Failure target naming the manifest endpoint.
pub const MANIFEST_TARGET: &str = "manifest";
/// Failure target naming the upload endpoint.
pub const UPLOAD_TARGET: &str = "upload";

/// Failure the in-memory remote injects for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailure {
    Unauthorized,
    Network,
}

#[derive(Default)]
struct RemoteState {
    manifest: Option<Value>,
    snapshots: HashMap<String, Value>,
    failures: HashMap<String, RemoteFailure>,
    required_token: Option<String>,
    uploads: Vec<ExportDocument>,
    requests: Vec<String>,
    manifest_versions: Vec<u64>,
    latency: Option<Duration>,
}

/// An in-memory implementation of `SignatureRemote` for testing.
///
/// Serves a fixed manifest and snapshots keyed by url, records every request
/// and upload, and can be told to fail specific targets.
#[derive(Clone, Default)]
pub struct InMemorySignatureRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemorySignatureRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_manifest(&self, manifest: Value) {
        self.state.lock().await.manifest = Some(manifest);
    }

    pub async fn put_snapshot(&self, url: impl Into<String>, payload: Value) {
        self.state.lock().await.snapshots.insert(url.into(), payload);
    }

    /// Makes every request to `target` (a snapshot url, [`MANIFEST_TARGET`] or
    /// [`UPLOAD_TARGET`]) fail.
    pub async fn fail(&self, target: impl Into<String>, failure: RemoteFailure) {
        self.state.lock().await.failures.insert(target.into(), failure);
    }

    pub async fn clear_failure(&self, target: &str) {
        self.state.lock().await.failures.remove(target);
    }

    /// Rejects any bearer token other than `token` as unauthorized.
    pub async fn require_token(&self, token: impl Into<String>) {
        self.state.lock().await.required_token = Some(token.into());
    }

    /// Delays every request, so tests can overlap sessions.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = Some(latency);
    }

    pub async fn uploads(&self) -> Vec<ExportDocument> {
        self.state.lock().await.uploads.clone()
    }

    /// Targets requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.state.lock().await.requests.clone()
    }

    pub async fn manifest_versions(&self) -> Vec<u64> {
        self.state.lock().await.manifest_versions.clone()
    }

    async fn admit(&self, target: &str, token: &str) -> Result<()> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.requests.push(target.to_string());
        match state.failures.get(target) {
            Some(RemoteFailure::Unauthorized) => {
                return Err(CacheError::Unauthorized(format!("{} rejected the session token", target)));
            }
            Some(RemoteFailure::Network) => {
                return Err(CacheError::NetworkFailure(format!("{} is unreachable", target)));
            }
            None => {}
        }
        if let Some(required) = state.required_token.as_deref() {
            if required != token {
                return Err(CacheError::Unauthorized(format!("{} rejected the session token", target)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SignatureRemote for InMemorySignatureRemote {
    async fn fetch_manifest(&self, current_version: u64, token: &str) -> Result<Value> {
        self.admit(MANIFEST_TARGET, token).await?;
        let mut state = self.state.lock().await;
        state.manifest_versions.push(current_version);
        Ok(state.manifest.clone().unwrap_or(Value::Null))
    }

    async fn fetch_snapshot(&self, url: &str, token: &str, description: &str) -> Result<Value> {
        self.admit(url, token).await?;
        self.state
            .lock()
            .await
            .snapshots
            .get(url)
            .cloned()
            .ok_or_else(|| CacheError::NetworkFailure(format!("{} failed with status 404", description)))
    }

    async fn upload(&self, document: &ExportDocument, token: &str) -> Result<()> {
        self.admit(UPLOAD_TARGET, token).await?;
        self.state.lock().await.uploads.push(document.clone());
        Ok(())
    }
}
