use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// Default remote signature service
pub const DEFAULT_API_BASE: &str = "https://xbuddy.local";

const MANIFEST_PATH: &str = "/api/signatures/manifest";
const PAYLOAD_PATH: &str = "/api/payload";

/// Location cache configuration
///
/// Loaded from the environment by the binary, or assembled with the fluent
/// setters in tests and embedders.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the persisted blobs
    pub data_dir: PathBuf,

    /// Base URL of the remote signature service
    pub api_base: Url,

    /// Transport timeout for every remote request
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn new(data_dir: impl Into<PathBuf>, api_base: Url) -> Self {
        Self {
            data_dir: data_dir.into(),
            api_base,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(env_string("LOCATION_CACHE_DATA_DIR", ".location-cache"));

        let api_base = Url::parse(&env_string("LOCATION_CACHE_API_BASE", DEFAULT_API_BASE))
            .context("LOCATION_CACHE_API_BASE must be an absolute URL")?;

        let timeout_secs = env_string("LOCATION_CACHE_HTTP_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .context("LOCATION_CACHE_HTTP_TIMEOUT_SECS must be a whole number of seconds")?;
        if timeout_secs == 0 {
            return Err(anyhow!("LOCATION_CACHE_HTTP_TIMEOUT_SECS must be positive"));
        }

        Ok(Self {
            data_dir,
            api_base,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the remote base URL
    pub fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }

    /// Set the transport timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn manifest_url(&self) -> Url {
        self.endpoint(MANIFEST_PATH)
    }

    pub fn payload_url(&self) -> Url {
        self.endpoint(PAYLOAD_PATH)
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.api_base.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
