use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whole-store mapping from identity to its location history.
///
/// Ordered so that listing and export are deterministic.
pub type LocationStore = BTreeMap<String, LocationRecord>;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Canonical form of a scraped or remote location string.
///
/// Surrounding whitespace is trimmed and an empty result means "no location
/// set", which is always represented as `None`.
pub fn normalize_location(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// A single timestamped location value seen for an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationObservation {
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    /// Remote snapshot version that produced this observation; absent for
    /// locally scraped observations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl LocationObservation {
    pub fn local(location: Option<&str>, timestamp: i64) -> Self {
        Self {
            location: normalize_location(location),
            timestamp,
            version: None,
        }
    }

    pub fn remote(location: Option<&str>, timestamp: i64, version: u64) -> Self {
        Self {
            location: normalize_location(location),
            timestamp,
            version: Some(version),
        }
    }
}

/// Location history of one identity.
///
/// `locations` is append-only and never holds two consecutive entries with the
/// same `location`; `current` mirrors the last entry (or `None` when empty).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    #[serde(default)]
    pub current: Option<String>,
    pub locations: Vec<LocationObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_added: Option<u64>,
}

impl LocationRecord {
    pub fn from_observation(observation: LocationObservation) -> Self {
        Self {
            current: observation.location.clone(),
            locations: vec![observation],
            last_version: None,
            version_added: None,
        }
    }

    /// Merges an observation into the history.
    ///
    /// A location different from `current` is appended; an identical one only
    /// refreshes the last entry's timestamp. Returns true if a new history
    /// entry was appended.
    pub fn observe(&mut self, observation: LocationObservation) -> bool {
        if let Some(last) = self.locations.last_mut() {
            if last.location == observation.location {
                last.timestamp = observation.timestamp;
                self.current = last.location.clone();
                return false;
            }
        } else if observation.location.is_none() && self.current.is_none() {
            return false;
        }

        self.current = observation.location.clone();
        self.locations.push(observation);
        true
    }

    /// Timestamp of the most recent history entry, 0 when there is none.
    pub fn last_seen(&self) -> i64 {
        self.locations.last().map(|entry| entry.timestamp).unwrap_or(0)
    }

    pub fn has_location(&self) -> bool {
        self.current.is_some()
    }
}

/// Highest remote snapshot version fully applied locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

impl SyncState {
    pub fn at_version(version: u64, synced_at: i64) -> Self {
        Self {
            version,
            last_synced_at: Some(synced_at),
        }
    }
}

/// Read-side view of a cached identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedLocation {
    pub location: Option<String>,
    pub timestamp: i64,
    pub history: Vec<LocationObservation>,
}

impl From<&LocationRecord> for CachedLocation {
    fn from(record: &LocationRecord) -> Self {
        Self {
            location: record.current.clone(),
            timestamp: record.last_seen(),
            history: record.locations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_location_treats_blank_as_absent() {
        assert_eq!(normalize_location(Some("  usa ")), Some("usa".to_string()));
        assert_eq!(normalize_location(Some("   ")), None);
        assert_eq!(normalize_location(Some("")), None);
        assert_eq!(normalize_location(None), None);
    }

    #[test]
    fn test_observe_appends_only_on_change() {
        let mut record = LocationRecord::from_observation(LocationObservation::local(Some("usa"), 1));
        assert!(!record.observe(LocationObservation::local(Some("usa"), 5)));
        assert_eq!(record.locations.len(), 1);
        assert_eq!(record.locations[0].timestamp, 5);

        assert!(record.observe(LocationObservation::local(Some("canada"), 9)));
        assert_eq!(record.current.as_deref(), Some("canada"));
        assert_eq!(record.locations.len(), 2);

        assert!(record.observe(LocationObservation::local(None, 12)));
        assert_eq!(record.current, None);
        assert_eq!(record.locations.len(), 3);
    }

    #[test]
    fn test_observe_absent_on_empty_history_is_noop() {
        let mut record = LocationRecord::default();
        assert!(!record.observe(LocationObservation::local(None, 3)));
        assert!(record.locations.is_empty());
        assert_eq!(record.last_seen(), 0);
    }

    #[test]
    fn test_sync_state_defaults() {
        let state: SyncState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, SyncState::default());
        let json = serde_json::to_value(SyncState::at_version(4, 10)).unwrap();
        assert_eq!(json, serde_json::json!({"version": 4, "lastSyncedAt": 10}));
    }
}
