use super::remote::SignatureRemote;
use super::wire::ExportDocument;
use crate::connection::{AppConfig, mask_token};
use crate::core::{CacheError, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::io::Read;
use tracing::{debug, info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// `SignatureRemote` speaking JSON over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpSignatureRemote {
    client: Client,
    api_base: Url,
    manifest_url: Url,
    payload_url: Url,
}

impl HttpSignatureRemote {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| CacheError::NetworkFailure(format!("build http client: {}", err)))?;
        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            manifest_url: config.manifest_url(),
            payload_url: config.payload_url(),
        })
    }

    /// Resolves a manifest-provided url against the service base.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        self.api_base.join(url).map_err(|err| {
            CacheError::InvalidSnapshotPayload(format!("unusable snapshot url '{}': {}", url, err))
        })
    }

    async fn fetch_json(
        &self,
        url: Url,
        token: &str,
        description: &str,
        expect_compressed: bool,
    ) -> Result<Value> {
        debug!(description, url = %url, "remote request start");
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| CacheError::NetworkFailure(format!("{} request failed: {}", description, err)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CacheError::NetworkFailure(format!("{} body read failed: {}", description, err)))?;
        let text = decode_body(&bytes, expect_compressed, description);
        debug!(description, status = status.as_u16(), "remote request complete");

        check_status(status, &text, description)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str::<Value>(&text).map_err(|err| {
            CacheError::NetworkFailure(format!("{} response was not JSON: {}", description, err))
        })
    }
}

#[async_trait]
impl SignatureRemote for HttpSignatureRemote {
    async fn fetch_manifest(&self, current_version: u64, token: &str) -> Result<Value> {
        let mut url = self.manifest_url.clone();
        url.query_pairs_mut()
            .append_pair("currentVersion", &current_version.to_string());
        self.fetch_json(url, token, "signature manifest", false).await
    }

    async fn fetch_snapshot(&self, url: &str, token: &str, description: &str) -> Result<Value> {
        let url = self.resolve(url)?;
        self.fetch_json(url, token, description, true).await
    }

    async fn upload(&self, document: &ExportDocument, token: &str) -> Result<()> {
        let body = serde_json::to_string(document)
            .map_err(|err| CacheError::StorageFailure(format!("serialize upload payload: {}", err)))?;
        info!(
            endpoint = %self.payload_url,
            records = document.record_count(),
            exported_at = %document.exported_at,
            token = %mask_token(token),
            "uploading location cache"
        );

        let response = self
            .client
            .post(self.payload_url.clone())
            .bearer_auth(token)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|err| CacheError::NetworkFailure(format!("upload request failed: {}", err)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| CacheError::NetworkFailure(format!("upload body read failed: {}", err)))?;
        debug!(status = status.as_u16(), "upload response");
        check_status(status, &text, "Upload")
    }
}

/// Inflates gzip bodies that arrive without a matching `Content-Encoding`.
fn decode_body(bytes: &[u8], expect_compressed: bool, description: &str) -> String {
    if expect_compressed && bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = String::new();
        match GzDecoder::new(bytes).read_to_string(&mut decoded) {
            Ok(_) => return decoded,
            Err(err) => warn!(description, error = %err, "gzip decode failed"),
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn check_status(status: StatusCode, body: &str, description: &str) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(CacheError::Unauthorized(format!(
            "{} rejected the session token",
            description
        )));
    }
    if !status.is_success() {
        return Err(CacheError::NetworkFailure(error_message(status, body, description)));
    }
    Ok(())
}

/// Prefers a server-provided `error`/`message`, then the raw body.
fn error_message(status: StatusCode, body: &str, description: &str) -> String {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(message) = object.get(key).and_then(Value::as_str) {
                if !message.trim().is_empty() {
                    return message.to_string();
                }
            }
        }
    }
    if !body.trim().is_empty() {
        return body.to_string();
    }
    format!("{} failed with status {}", description, status.as_u16())
}
