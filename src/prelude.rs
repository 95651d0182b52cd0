//! Common imports grouped by how an application uses the cache.
//!
//! `app` covers embedding the controller. `testing` adds the in-memory
//! doubles used to exercise it without disk or network.

pub mod app {
    pub use crate::{
        AppConfig, AuthState, AuthUser, CacheError, LocationCache, LookupSource, Result,
        SyncOutcome, SyncTrigger,
    };
    pub use crate::sync::{StatusLevel, StatusReporter, TracingReporter};
}

pub mod testing {
    pub use crate::storage::InMemoryBackend;
    pub use crate::sync::{
        CollectingReporter, InMemorySignatureRemote, MANIFEST_TARGET, RemoteFailure,
        UPLOAD_TARGET,
    };
}
