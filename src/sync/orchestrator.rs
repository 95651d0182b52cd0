use super::reconciler::SnapshotReconciler;
use super::remote::SignatureRemote;
use super::status::{
    NOT_LOGGED_IN, SESSION_EXPIRED, SIGNATURES_SYNCED, SYNC_COMPLETE, SYNC_STARTED, StatusLevel,
    StatusReporter, UPLOAD_COMPLETE, UPLOAD_STARTED,
};
use super::wire::{ExportDocument, Manifest};
use crate::connection::AuthStore;
use crate::core::{CacheError, Result, SyncState, now_ms};
use crate::storage::{RecordStore, SyncStateStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// What started a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// A user pressed a sync button; progress is reported.
    Manual,
    /// Started automatically after sign-in; failures are only logged.
    Login,
}

impl SyncTrigger {
    pub fn is_silent(self) -> bool {
        matches!(self, Self::Login)
    }
}

/// Step the orchestrator is currently in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchingManifest,
    ApplyingBase { version: u64 },
    ApplyingDeltas { to_version: u64 },
    Uploading,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub starting_version: u64,
    pub base_version: Option<u64>,
    pub applied_deltas: usize,
    pub final_version: u64,
    pub uploaded_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another session held the in-progress flag; nothing was done.
    AlreadyRunning,
    /// No stored token; nothing was requested.
    NotSignedIn,
}

/// Clears the in-progress flag when a session ends, however it ends.
struct SessionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SessionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives manifest fetch, snapshot application and upload for one session
/// at a time.
///
/// `SyncState` is persisted after the base and after every delta, so a
/// session that stops early resumes from the last applied version. Nothing
/// already applied is rolled back on failure.
pub struct SyncOrchestrator {
    records: RecordStore,
    sync_state: SyncStateStore,
    auth: AuthStore,
    reconciler: SnapshotReconciler,
    remote: Arc<dyn SignatureRemote>,
    reporter: Arc<dyn StatusReporter>,
    in_progress: AtomicBool,
    phase: watch::Sender<SyncPhase>,
}

impl SyncOrchestrator {
    pub fn new(
        records: RecordStore,
        sync_state: SyncStateStore,
        auth: AuthStore,
        remote: Arc<dyn SignatureRemote>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            reconciler: SnapshotReconciler::new(records.clone()),
            records,
            sync_state,
            auth,
            remote,
            reporter,
            in_progress: AtomicBool::new(false),
            phase,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Runs one sync session. A trigger arriving while a session is active
    /// returns [`SyncOutcome::AlreadyRunning`] without queueing.
    pub async fn run(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        let Some(_guard) = SessionGuard::acquire(&self.in_progress) else {
            debug!(?trigger, "sync session already in progress");
            return Ok(SyncOutcome::AlreadyRunning);
        };
        let silent = trigger.is_silent();

        let Some(token) = self.auth.token().await else {
            self.report(silent, StatusLevel::Error, NOT_LOGGED_IN);
            debug!(?trigger, "sync skipped without a session token");
            return Ok(SyncOutcome::NotSignedIn);
        };

        let span = info_span!("sync.session", session_id = %Uuid::new_v4(), trigger = ?trigger);
        match self.run_session(&token, silent).instrument(span.clone()).await {
            Ok(report) => {
                self.phase.send_replace(SyncPhase::Idle);
                self.report(silent, StatusLevel::Success, SYNC_COMPLETE);
                Ok(SyncOutcome::Completed(report))
            }
            Err(err) => {
                self.phase.send_replace(SyncPhase::Failed {
                    reason: err.to_string(),
                });
                self.handle_failure(&err, silent).instrument(span).await;
                Err(err)
            }
        }
    }

    async fn run_session(&self, token: &str, silent: bool) -> Result<SyncReport> {
        self.report(silent, StatusLevel::Info, SYNC_STARTED);
        let starting_version = self.sync_state.read().await.version;
        let mut version = starting_version;

        self.phase.send_replace(SyncPhase::FetchingManifest);
        let manifest = Manifest::from_value(&self.remote.fetch_manifest(version, token).await?)?;
        let plan = manifest.plan(version)?;
        info!(
            current_version = version,
            base = ?plan.base.as_ref().map(|base| base.version),
            deltas = plan.deltas.len(),
            "manifest received"
        );

        let mut base_version = None;
        if let Some(base) = &plan.base {
            self.phase
                .send_replace(SyncPhase::ApplyingBase { version: base.version });
            let description = format!("base snapshot {}", base.version);
            let payload = self.remote.fetch_snapshot(&base.url, token, &description).await?;
            self.reconciler.apply_base(&payload, base.version).await?;
            version = base.version;
            self.sync_state
                .write(SyncState::at_version(version, now_ms()))
                .await;
            base_version = Some(version);
        }

        let mut applied_deltas = 0;
        for delta in &plan.deltas {
            self.phase.send_replace(SyncPhase::ApplyingDeltas {
                to_version: delta.to_version,
            });
            let description = format!(
                "delta {}->{}",
                delta.from_version.unwrap_or(version),
                delta.to_version
            );
            let payload = self.remote.fetch_snapshot(&delta.url, token, &description).await?;
            self.reconciler
                .apply_delta(&payload, None, Some(delta.to_version))
                .await?;
            version = delta.to_version;
            self.sync_state
                .write(SyncState::at_version(version, now_ms()))
                .await;
            applied_deltas += 1;
        }

        self.report(silent, StatusLevel::Info, SIGNATURES_SYNCED);
        self.phase.send_replace(SyncPhase::Uploading);
        let uploaded_records = self.push_store(token).await?;

        info!(
            starting_version,
            final_version = version,
            applied_deltas,
            uploaded_records,
            "sync session complete"
        );
        Ok(SyncReport {
            starting_version,
            base_version,
            applied_deltas,
            final_version: version,
            uploaded_records,
        })
    }

    /// Uploads the current store outside of a sync session.
    ///
    /// Returns the number of uploaded records.
    pub async fn upload_location_cache(&self, silent: bool) -> Result<usize> {
        let Some(token) = self.auth.token().await else {
            self.report(silent, StatusLevel::Error, NOT_LOGGED_IN);
            return Err(CacheError::NotAuthenticated);
        };

        self.report(silent, StatusLevel::Info, UPLOAD_STARTED);
        match self.push_store(&token).await {
            Ok(count) => {
                self.report(silent, StatusLevel::Success, UPLOAD_COMPLETE);
                Ok(count)
            }
            Err(err) => {
                self.handle_failure(&err, silent).await;
                Err(err)
            }
        }
    }

    async fn push_store(&self, token: &str) -> Result<usize> {
        let document = ExportDocument::new(self.records.load().await?);
        self.remote.upload(&document, token).await?;
        Ok(document.record_count())
    }

    async fn handle_failure(&self, err: &CacheError, silent: bool) {
        // An expired session is surfaced even for background triggers.
        if err.is_unauthorized() {
            warn!(error = %err, "remote rejected credentials, clearing auth state");
            self.auth.clear().await;
            self.reporter.report(StatusLevel::Error, SESSION_EXPIRED);
            return;
        }
        if silent {
            warn!(error = %err, resumable = err.is_resumable(), "background sync failed");
        } else {
            warn!(error = %err, resumable = err.is_resumable(), "sync failed");
            self.report(silent, StatusLevel::Error, &err.to_string());
        }
    }

    fn report(&self, silent: bool, level: StatusLevel, message: &str) {
        if !silent {
            self.reporter.report(level, message);
        }
    }
}
