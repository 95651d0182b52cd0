use crate::core::{CacheError, Result, now_ms};
use crate::storage::StorageBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

/// Storage key of the current auth state
pub const AUTH_STORAGE_KEY: &str = "xbuddyAuth";

/// Storage key written by older builds, read as a fallback only
pub const LEGACY_AUTH_KEY: &str = "xbuddyUser";

/// Account details returned by the remote service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Opaque bearer credentials for the remote signature service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub stored_at: i64,
}

impl AuthState {
    pub fn new(token: impl Into<String>, user: AuthUser) -> Self {
        Self {
            token: Some(token.into()),
            user: Some(user),
            logged_in: true,
            stored_at: now_ms(),
        }
    }

    /// Bearer token, if one is present and non-empty
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn display_name(&self) -> String {
        self.user
            .as_ref()
            .and_then(|user| user.name.clone().or_else(|| user.email.clone()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAuth {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    logged_in: bool,
}

impl From<LegacyAuth> for AuthState {
    fn from(legacy: LegacyAuth) -> Self {
        let user = legacy.user.unwrap_or(AuthUser {
            name: legacy.username,
            email: legacy.email,
        });
        Self {
            token: legacy.token,
            user: Some(user),
            logged_in: legacy.logged_in,
            stored_at: now_ms(),
        }
    }
}

/// Shortened token for log output
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 12 {
        return token.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Persists the auth state next to the location cache
#[derive(Clone)]
pub struct AuthStore {
    backend: Arc<dyn StorageBackend>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Current auth state; failures to read are logged and treated as signed out
    pub async fn read(&self) -> Option<AuthState> {
        match self.try_read().await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "auth state read failed");
                None
            }
        }
    }

    async fn try_read(&self) -> Result<Option<AuthState>> {
        if let Some(value) = self.backend.read(AUTH_STORAGE_KEY).await? {
            if !value.is_null() {
                let state = serde_json::from_value::<AuthState>(value)
                    .map_err(|err| CacheError::StorageFailure(format!("parse auth state: {}", err)))?;
                return Ok(Some(state));
            }
        }

        match self.backend.read(LEGACY_AUTH_KEY).await? {
            Some(value) if !value.is_null() => {
                let legacy = serde_json::from_value::<LegacyAuth>(value).map_err(|err| {
                    CacheError::StorageFailure(format!("parse legacy auth state: {}", err))
                })?;
                Ok(Some(legacy.into()))
            }
            _ => Ok(None),
        }
    }

    /// Bearer token of a signed-in session
    pub async fn token(&self) -> Option<String> {
        self.read()
            .await
            .and_then(|state| state.bearer().map(str::to_string))
    }

    pub async fn write(&self, state: &AuthState) -> Result<()> {
        let value = serde_json::to_value(state)
            .map_err(|err| CacheError::StorageFailure(format!("serialize auth state: {}", err)))?;
        self.backend.write(AUTH_STORAGE_KEY, value).await
    }

    /// Drops the stored credentials under both keys; failures are logged only
    pub async fn clear(&self) {
        for key in [AUTH_STORAGE_KEY, LEGACY_AUTH_KEY] {
            if let Err(err) = self.backend.remove(key).await {
                error!(key, error = %err, "auth state clear failed");
            }
        }
    }
}
