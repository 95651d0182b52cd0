use super::StorageBackend;
use super::schema::normalize_store;
use crate::core::{
    CacheError, CachedLocation, LocationObservation, LocationRecord, LocationStore, Result,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Storage key of the identity -> record map.
pub const LOCATION_CACHE_KEY: &str = "xbuddyLocationCache";

/// Durable mapping from identity to its location history.
///
/// Every mutation reads the whole store, changes it in memory and writes it
/// back as one blob. Two interleaved mutations therefore resolve as
/// last-write-wins.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Loads and normalizes the whole store.
    ///
    /// Legacy single-location records are upgraded here; the upgraded form is
    /// written back by the next mutation.
    pub async fn load(&self) -> Result<LocationStore> {
        let raw = match self.backend.read(LOCATION_CACHE_KEY).await? {
            None | Some(Value::Null) => return Ok(LocationStore::new()),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(CacheError::StorageFailure(format!(
                    "location cache must be an object, found {}",
                    json_kind(&other)
                )));
            }
        };

        let (store, report) = normalize_store(&raw);
        if report.migrated > 0 || report.skipped > 0 {
            info!(
                migrated = report.migrated,
                skipped = report.skipped,
                "normalized persisted location cache"
            );
        }
        Ok(store)
    }

    /// Replaces the whole store.
    pub async fn save(&self, store: &LocationStore) -> Result<()> {
        let value = serde_json::to_value(store).map_err(|err| {
            CacheError::StorageFailure(format!("serialize location cache: {}", err))
        })?;
        self.backend.write(LOCATION_CACHE_KEY, value).await
    }

    pub async fn get(&self, identity: &str) -> Result<Option<LocationRecord>> {
        Ok(self.load().await?.remove(identity))
    }

    /// Merges an observation into the identity's history and persists the store.
    pub async fn upsert(
        &self,
        identity: &str,
        observation: LocationObservation,
    ) -> Result<LocationRecord> {
        let mut store = self.load().await?;
        let record = upsert_into(&mut store, identity, observation).clone();
        self.save(&store).await?;
        debug!(identity, current = ?record.current, entries = record.locations.len(), "location upserted");
        Ok(record)
    }

    pub async fn remove(&self, identity: &str) -> Result<()> {
        let mut store = self.load().await?;
        if store.remove(identity).is_some() {
            self.save(&store).await?;
        }
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<(String, LocationRecord)>> {
        Ok(self.load().await?.into_iter().collect())
    }

    pub async fn cached_location(&self, identity: &str) -> Result<Option<CachedLocation>> {
        Ok(self
            .load()
            .await?
            .get(identity)
            .map(CachedLocation::from))
    }
}

/// In-memory form of [`RecordStore::upsert`].
pub fn upsert_into<'a>(
    store: &'a mut LocationStore,
    identity: &str,
    observation: LocationObservation,
) -> &'a LocationRecord {
    match store.entry(identity.to_string()) {
        std::collections::btree_map::Entry::Vacant(slot) => {
            slot.insert(LocationRecord::from_observation(observation))
        }
        std::collections::btree_map::Entry::Occupied(slot) => {
            let record = slot.into_mut();
            record.observe(observation);
            record
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
