pub mod error;
pub mod types;

pub use error::{CacheError, Result};
pub use types::{
    CachedLocation, LocationObservation, LocationRecord, LocationStore, SyncState,
    normalize_location, now_ms,
};
