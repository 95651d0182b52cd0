use super::waiters::{ConsumerId, LocationWaiters};
use crate::core::{CachedLocation, LocationObservation, LocationRecord, Result, normalize_location, now_ms};
use crate::storage::RecordStore;
use std::sync::Arc;
use tracing::{debug, error};

/// Where a requested location will come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupSource {
    /// Known locally; no scrape needed.
    Cache(CachedLocation),
    /// Unknown; the consumer now waits for the next observation.
    Lookup,
}

/// Writes scraped observations and resolves consumers waiting on them.
#[derive(Clone)]
pub struct ObservationWriter {
    records: RecordStore,
    waiters: Arc<LocationWaiters>,
}

impl ObservationWriter {
    pub fn new(records: RecordStore, waiters: Arc<LocationWaiters>) -> Self {
        Self { records, waiters }
    }

    pub fn waiters(&self) -> &Arc<LocationWaiters> {
        &self.waiters
    }

    /// Merges one completed scrape into the store.
    ///
    /// The identity is used as given, so it matches the key callers pass to
    /// `request_location` and the store lookups. Waiters on `identity` are
    /// resolved whether or not the write succeeded. Returns `Ok(None)` for a
    /// blank identity, which is ignored.
    pub async fn record_observation(
        &self,
        identity: &str,
        location: Option<&str>,
    ) -> Result<Option<LocationRecord>> {
        if identity.trim().is_empty() {
            debug!("ignoring observation without identity");
            return Ok(None);
        }

        let location = normalize_location(location);
        let written = self
            .records
            .upsert(identity, LocationObservation::local(location.as_deref(), now_ms()))
            .await;
        if let Err(err) = &written {
            error!(identity, error = %err, "failed to persist observation");
        }

        match self.waiters.notify(identity, location.as_deref()) {
            Ok(delivered) if delivered > 0 => debug!(identity, delivered, "waiters notified"),
            Ok(_) => {}
            Err(err) => error!(identity, error = %err, "waiter notification failed"),
        }

        written.map(Some)
    }

    /// Returns the cached location when one is known, otherwise registers
    /// `consumer` to be told about the next observation of `identity`.
    pub async fn request_location(&self, identity: &str, consumer: ConsumerId) -> Result<LookupSource> {
        if let Some(cached) = self.records.cached_location(identity).await? {
            if cached.location.is_some() {
                return Ok(LookupSource::Cache(cached));
            }
        }
        self.waiters.wait_for(identity, consumer)?;
        Ok(LookupSource::Lookup)
    }

    pub async fn cached_location(&self, identity: &str) -> Result<Option<CachedLocation>> {
        self.records.cached_location(identity).await
    }
}
