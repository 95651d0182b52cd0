// ============================================================================
// Location cache library
// ============================================================================
//
// Locally persisted identity -> location history store, kept in step with a
// remote signature repository through versioned base and delta snapshots.

pub mod connection;
pub mod core;
pub mod facade;
pub mod observation;
pub mod prelude;
pub mod storage;
pub mod sync;

pub use connection::{AppConfig, AuthState, AuthStore, AuthUser};
pub use core::{
    CacheError, CachedLocation, LocationObservation, LocationRecord, LocationStore, Result,
    SyncState,
};
pub use facade::{CacheStatus, ImportSummary, LocationCache};
pub use observation::{LocationWaiters, LookupSource, ObservationWriter};
pub use storage::{FileBackend, InMemoryBackend, RecordStore, StorageBackend, SyncStateStore};
pub use sync::{
    ExportDocument, HttpSignatureRemote, InMemorySignatureRemote, SignatureRemote,
    SnapshotReconciler, StatusLevel, StatusReporter, SyncOrchestrator, SyncOutcome, SyncPhase,
    SyncTrigger,
};
