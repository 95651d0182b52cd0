pub mod engine;
pub mod memory;
pub mod persistence;
pub mod record_store;
pub mod schema;
pub mod sync_state;

pub use engine::StorageBackend;
pub use memory::InMemoryBackend;
pub use persistence::FileBackend;
pub use record_store::{LOCATION_CACHE_KEY, RecordStore, upsert_into};
pub use schema::{LegacyRecord, NormalizeReport, StoredRecord, normalize_store};
pub use sync_state::{SYNC_STATE_KEY, SyncStateStore};
