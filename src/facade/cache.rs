use super::transfer::{ImportSummary, parse_import, render_export};
use crate::connection::{AppConfig, AuthState, AuthStore};
use crate::core::{CachedLocation, LocationRecord, LocationStore, Result, SyncState};
use crate::observation::{ConsumerId, LocationWaiters, LookupSource, ObservationWriter};
use crate::storage::{FileBackend, RecordStore, StorageBackend, SyncStateStore};
use crate::sync::{
    ExportDocument, HttpSignatureRemote, SignatureRemote, StatusReporter, SyncOrchestrator,
    SyncOutcome, SyncPhase, SyncTrigger, TracingReporter,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Snapshot of the controller's state for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub signed_in_as: Option<String>,
    pub sync_state: SyncState,
    pub records: usize,
    pub phase: SyncPhase,
}

/// Process-wide controller tying the record store, observation writer,
/// auth state and sync orchestrator together.
///
/// Construct one per process with [`LocationCache::open`], or inject the
/// backend and remote with [`LocationCache::new`] in tests.
pub struct LocationCache {
    records: RecordStore,
    sync_state: SyncStateStore,
    auth: AuthStore,
    writer: ObservationWriter,
    orchestrator: Arc<SyncOrchestrator>,
    auto_sync_triggered: AtomicBool,
}

impl LocationCache {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        remote: Arc<dyn SignatureRemote>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let records = RecordStore::new(backend.clone());
        let sync_state = SyncStateStore::new(backend.clone());
        let auth = AuthStore::new(backend);
        let writer = ObservationWriter::new(records.clone(), Arc::new(LocationWaiters::new()));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            records.clone(),
            sync_state.clone(),
            auth.clone(),
            remote,
            reporter,
        ));
        Self {
            records,
            sync_state,
            auth,
            writer,
            orchestrator,
            auto_sync_triggered: AtomicBool::new(false),
        }
    }

    /// File-backed cache talking to the configured service, reporting
    /// status through `tracing`.
    pub fn open(config: &AppConfig) -> Result<Self> {
        Self::open_with(config, Arc::new(TracingReporter))
    }

    /// Like [`LocationCache::open`] with a caller-supplied status channel.
    pub fn open_with(config: &AppConfig, reporter: Arc<dyn StatusReporter>) -> Result<Self> {
        let backend = Arc::new(FileBackend::new(&config.data_dir));
        let remote = Arc::new(HttpSignatureRemote::new(config)?);
        info!(data_dir = %config.data_dir.display(), api_base = %config.api_base, "location cache opened");
        Ok(Self::new(backend, remote, reporter))
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn waiters(&self) -> &Arc<LocationWaiters> {
        self.writer.waiters()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Stores credentials and starts the one silent post-login sync.
    pub async fn sign_in(&self, auth: AuthState) -> Result<Option<SyncOutcome>> {
        self.auth.write(&auth).await?;
        self.auto_sync_triggered.store(false, Ordering::Release);
        info!(user = %auth.display_name(), "signed in");
        match self.ensure_auto_sync().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                debug!(error = %err, "post-login sync did not complete");
                Ok(None)
            }
        }
    }

    pub async fn sign_out(&self) {
        self.auth.clear().await;
        self.auto_sync_triggered.store(false, Ordering::Release);
        info!("signed out");
    }

    pub async fn auth_state(&self) -> Option<AuthState> {
        self.auth.read().await
    }

    /// Runs the automatic sync unless it already ran for this sign-in.
    ///
    /// Returns `Ok(None)` when it already ran. The trigger re-arms when
    /// there was no session to sync with or the remote rejected it.
    pub async fn ensure_auto_sync(&self) -> Result<Option<SyncOutcome>> {
        if self
            .auto_sync_triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        let result = self.orchestrator.run(SyncTrigger::Login).await;
        match &result {
            Ok(SyncOutcome::NotSignedIn) => self.rearm_auto_sync(),
            Err(err) if err.is_unauthorized() => self.rearm_auto_sync(),
            _ => {}
        }
        result.map(Some)
    }

    pub async fn sync(&self) -> Result<SyncOutcome> {
        let result = self.orchestrator.run(SyncTrigger::Manual).await;
        if matches!(&result, Err(err) if err.is_unauthorized()) {
            self.rearm_auto_sync();
        }
        result
    }

    pub async fn upload(&self) -> Result<usize> {
        let result = self.orchestrator.upload_location_cache(false).await;
        if matches!(&result, Err(err) if err.is_unauthorized()) {
            self.rearm_auto_sync();
        }
        result
    }

    fn rearm_auto_sync(&self) {
        self.auto_sync_triggered.store(false, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub async fn record_observation(
        &self,
        identity: &str,
        location: Option<&str>,
    ) -> Result<Option<LocationRecord>> {
        self.writer.record_observation(identity, location).await
    }

    pub async fn request_location(&self, identity: &str, consumer: ConsumerId) -> Result<LookupSource> {
        self.writer.request_location(identity, consumer).await
    }

    pub async fn cached_location(&self, identity: &str) -> Result<Option<CachedLocation>> {
        self.writer.cached_location(identity).await
    }

    pub async fn get(&self, identity: &str) -> Result<Option<LocationRecord>> {
        self.records.get(identity).await
    }

    pub async fn list(&self) -> Result<Vec<(String, LocationRecord)>> {
        self.records.list_all().await
    }

    pub async fn remove(&self, identity: &str) -> Result<()> {
        self.records.remove(identity).await
    }

    pub async fn status(&self) -> Result<CacheStatus> {
        Ok(CacheStatus {
            signed_in_as: self
                .auth
                .read()
                .await
                .filter(|state| state.bearer().is_some())
                .map(|state| state.display_name()),
            sync_state: self.sync_state.read().await,
            records: self.records.load().await?.len(),
            phase: self.orchestrator.phase(),
        })
    }

    // ------------------------------------------------------------------
    // Import / export
    // ------------------------------------------------------------------

    pub async fn export_document(&self) -> Result<ExportDocument> {
        Ok(ExportDocument::new(self.records.load().await?))
    }

    pub async fn export_json(&self) -> Result<String> {
        render_export(&self.export_document().await?)
    }

    /// Replaces the whole store with the contents of a backup file.
    pub async fn import_json(&self, text: &str) -> Result<ImportSummary> {
        let (store, report) = parse_import(text)?;
        self.write_location_cache(&store).await?;
        info!(
            records = store.len(),
            migrated = report.migrated,
            skipped = report.skipped,
            "location history imported"
        );
        Ok(ImportSummary {
            records: store.len(),
            migrated: report.migrated,
            skipped: report.skipped,
        })
    }

    pub async fn write_location_cache(&self, store: &LocationStore) -> Result<()> {
        self.records.save(store).await
    }
}
