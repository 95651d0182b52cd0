pub mod http;
pub mod in_memory_remote;
pub mod orchestrator;
pub mod reconciler;
pub mod remote;
pub mod status;
pub mod wire;

pub use http::HttpSignatureRemote;
pub use in_memory_remote::{InMemorySignatureRemote, MANIFEST_TARGET, RemoteFailure, UPLOAD_TARGET};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncPhase, SyncReport, SyncTrigger};
pub use reconciler::{AppliedSnapshot, DeltaSummary, SnapshotReconciler, merge_delta, reconcile_base};
pub use remote::SignatureRemote;
pub use status::{CollectingReporter, StatusLevel, StatusReporter, TracingReporter};
pub use wire::{
    BaseSnapshot, DeltaSnapshot, EXPORT_FORMAT_VERSION, ExportDocument, Manifest, SnapshotEntry,
    SyncPlan,
};
