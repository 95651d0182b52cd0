pub mod auth;
pub mod config;

pub use auth::{AUTH_STORAGE_KEY, AuthState, AuthStore, AuthUser, LEGACY_AUTH_KEY, mask_token};
pub use config::{AppConfig, DEFAULT_API_BASE};
