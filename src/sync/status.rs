use std::sync::Mutex;
use tracing::{info, warn};

pub const SYNC_STARTED: &str = "Syncing signature repository...";
pub const SIGNATURES_SYNCED: &str = "Signatures synced. Uploading observations...";
pub const SYNC_COMPLETE: &str = "Sync complete.";
pub const SESSION_EXPIRED: &str = "Session expired. Please log in again.";
pub const NOT_LOGGED_IN: &str = "Not logged in.";
pub const UPLOAD_STARTED: &str = "Uploading locations...";
pub const UPLOAD_COMPLETE: &str = "Locations uploaded successfully.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Human-facing progress channel for actions a user started.
///
/// Background triggers only reach the reporter when the session expired;
/// their other failures go to the log.
pub trait StatusReporter: Send + Sync {
    fn report(&self, level: StatusLevel, message: &str);
}

/// Forwards status messages to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, level: StatusLevel, message: &str) {
        match level {
            StatusLevel::Info | StatusLevel::Success => info!(?level, "{}", message),
            StatusLevel::Error => warn!(?level, "{}", message),
        }
    }
}

/// Keeps every reported message in order. Used by tests and by callers that
/// render the history themselves.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<(StatusLevel, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(StatusLevel, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|(_, text)| text).collect()
    }
}

impl StatusReporter for CollectingReporter {
    fn report(&self, level: StatusLevel, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}
