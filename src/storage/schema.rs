//! On-disk record schemas and load-time normalization.
//!
//! Older builds persisted `{location, timestamp}` per identity. Current builds
//! persist a full history under `locations`. The presence of that field picks
//! the schema; both shapes are decoded into [`StoredRecord`] and normalized
//! once, for the whole store, by [`normalize_store`].

use crate::core::{LocationObservation, LocationRecord, LocationStore, normalize_location};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Single-observation record written before history tracking existed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyRecord {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Any record shape that can be found in a persisted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRecord {
    Current(LocationRecord),
    Legacy(LegacyRecord),
}

/// Counters describing what a normalization pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub migrated: usize,
    pub skipped: usize,
}

impl StoredRecord {
    /// Decodes one persisted record. Objects carrying `locations` use the
    /// history schema; everything else is read as a legacy record, ignoring
    /// keys it does not know.
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        let has_history = value
            .as_object()
            .is_some_and(|fields| fields.contains_key("locations"));
        if has_history {
            LocationRecord::deserialize(value).map(Self::Current)
        } else {
            LegacyRecord::deserialize(value).map(Self::Legacy)
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// Converts any stored shape into a record satisfying the history invariants.
    pub fn normalize(self) -> LocationRecord {
        match self {
            Self::Legacy(legacy) => {
                let location = normalize_location(legacy.location.as_deref());
                LocationRecord {
                    current: location.clone(),
                    locations: vec![LocationObservation {
                        location,
                        timestamp: legacy.timestamp.unwrap_or(0),
                        version: None,
                    }],
                    last_version: None,
                    version_added: None,
                }
            }
            Self::Current(record) => normalize_current(record),
        }
    }
}

fn normalize_current(record: LocationRecord) -> LocationRecord {
    let LocationRecord {
        current,
        locations,
        last_version,
        version_added,
    } = record;

    let mut history: Vec<LocationObservation> = Vec::with_capacity(locations.len());
    for mut entry in locations {
        entry.location = normalize_location(entry.location.as_deref());
        match history.last_mut() {
            Some(last) if last.location == entry.location => {
                last.timestamp = last.timestamp.max(entry.timestamp);
            }
            _ => history.push(entry),
        }
    }

    let current = normalize_location(current.as_deref());
    if history.is_empty() {
        if let Some(location) = current {
            history.push(LocationObservation {
                location: Some(location),
                timestamp: 0,
                version: last_version,
            });
        }
    }

    LocationRecord {
        current: history.last().and_then(|entry| entry.location.clone()),
        locations: history,
        last_version,
        version_added,
    }
}

/// Normalizes a raw persisted store object.
///
/// Entries that match neither schema are dropped with a warning rather than
/// failing the whole load.
pub fn normalize_store(raw: &Map<String, Value>) -> (LocationStore, NormalizeReport) {
    let mut store = LocationStore::new();
    let mut report = NormalizeReport::default();

    for (identity, value) in raw {
        match StoredRecord::from_value(value) {
            Ok(stored) => {
                if stored.is_legacy() {
                    report.migrated += 1;
                }
                store.insert(identity.clone(), stored.normalize());
            }
            Err(err) => {
                warn!(identity = %identity, error = %err, "dropping unreadable location record");
                report.skipped += 1;
            }
        }
    }

    (store, report)
}
