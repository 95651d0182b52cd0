use super::wire::{BaseSnapshot, DeltaSnapshot};
use crate::core::{LocationObservation, LocationRecord, LocationStore, Result, now_ms};
use crate::storage::RecordStore;
use serde_json::Value;
use tracing::info;

/// Store produced by applying one snapshot, with the version it reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSnapshot {
    pub version: u64,
    pub store: LocationStore,
}

/// Counts of what a delta changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaSummary {
    pub appended: usize,
    pub refreshed: usize,
    pub created: usize,
    pub removed: usize,
}

/// Builds a fresh store from a base snapshot.
///
/// Every identity gets a single-entry history (or an empty one when its
/// location is blank), stamped with the snapshot version.
pub fn reconcile_base(snapshot: &BaseSnapshot, timestamp: i64) -> LocationStore {
    let version = snapshot.version;
    snapshot
        .entries
        .iter()
        .map(|entry| {
            let locations = entry
                .location
                .as_deref()
                .map(|location| vec![LocationObservation::remote(Some(location), timestamp, version)])
                .unwrap_or_default();
            let record = LocationRecord {
                current: entry.location.clone(),
                locations,
                last_version: Some(version),
                version_added: Some(version),
            };
            (entry.identity.clone(), record)
        })
        .collect()
}

/// Merges a delta into an existing store in place.
///
/// Added identities go through the same de-duplicating merge as local
/// observations, so re-applying a delta never grows a history. Removed
/// identities are dropped unconditionally.
pub fn merge_delta(snapshot: &DeltaSnapshot, store: &mut LocationStore, timestamp: i64) -> DeltaSummary {
    let version = snapshot.to_version;
    let mut summary = DeltaSummary::default();

    for entry in &snapshot.added {
        let observation = LocationObservation::remote(entry.location.as_deref(), timestamp, version);
        let record = store.entry(entry.identity.clone()).or_insert_with(|| {
            summary.created += 1;
            LocationRecord {
                version_added: Some(version),
                ..LocationRecord::default()
            }
        });

        if record.observe(observation) {
            summary.appended += 1;
        } else {
            if let Some(last) = record.locations.last_mut() {
                last.version = Some(version);
            }
            summary.refreshed += 1;
        }
        record.last_version = Some(version);
        if record.version_added.is_none() {
            record.version_added = Some(version);
        }
    }

    for identity in &snapshot.removed {
        if store.remove(identity).is_some() {
            summary.removed += 1;
        }
    }

    summary
}

/// Applies remote snapshots and persists the resulting store.
///
/// Payloads are validated completely before anything is written, so a
/// rejected snapshot leaves the persisted store untouched.
#[derive(Clone)]
pub struct SnapshotReconciler {
    records: RecordStore,
}

impl SnapshotReconciler {
    pub fn new(records: RecordStore) -> Self {
        Self { records }
    }

    /// Replaces the whole store with the contents of a base snapshot.
    pub async fn apply_base(&self, payload: &Value, expected_version: u64) -> Result<AppliedSnapshot> {
        let snapshot = BaseSnapshot::from_value(payload, expected_version)?;
        let store = reconcile_base(&snapshot, now_ms());
        self.records.save(&store).await?;
        info!(version = snapshot.version, records = store.len(), "base snapshot applied");
        Ok(AppliedSnapshot {
            version: snapshot.version,
            store,
        })
    }

    /// Merges a delta snapshot into `existing`, or into the persisted store
    /// when no working copy is supplied.
    pub async fn apply_delta(
        &self,
        payload: &Value,
        existing: Option<LocationStore>,
        fallback_to_version: Option<u64>,
    ) -> Result<AppliedSnapshot> {
        let snapshot = DeltaSnapshot::from_value(payload, fallback_to_version)?;
        let mut store = match existing {
            Some(store) => store,
            None => self.records.load().await?,
        };
        let summary = merge_delta(&snapshot, &mut store, now_ms());
        self.records.save(&store).await?;
        info!(
            to_version = snapshot.to_version,
            appended = summary.appended,
            refreshed = summary.refreshed,
            created = summary.created,
            removed = summary.removed,
            "delta snapshot applied"
        );
        Ok(AppliedSnapshot {
            version: snapshot.to_version,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::wire::SnapshotEntry;

    fn entry(identity: &str, location: Option<&str>) -> SnapshotEntry {
        SnapshotEntry {
            identity: identity.to_string(),
            location: location.map(str::to_string),
        }
    }

    #[test]
    fn test_reconcile_base_resets_history() {
        let store = reconcile_base(
            &BaseSnapshot {
                version: 5,
                entries: vec![entry("alice", Some("usa")), entry("bob", None)],
            },
            100,
        );
        let alice = &store["alice"];
        assert_eq!(alice.current.as_deref(), Some("usa"));
        assert_eq!(alice.locations.len(), 1);
        assert_eq!(alice.locations[0].version, Some(5));
        let bob = &store["bob"];
        assert_eq!(bob.current, None);
        assert!(bob.locations.is_empty());
        assert_eq!(bob.last_version, Some(5));
        assert_eq!(bob.version_added, Some(5));
    }

    #[test]
    fn test_merge_delta_creates_and_preserves_version_added() {
        let mut store = reconcile_base(
            &BaseSnapshot {
                version: 5,
                entries: vec![entry("alice", Some("usa"))],
            },
            100,
        );
        let delta = DeltaSnapshot {
            to_version: 6,
            from_version: Some(5),
            added: vec![entry("alice", Some("canada")), entry("dave", Some("peru")), entry("erin", None)],
            removed: vec!["ghost".to_string()],
        };
        let summary = merge_delta(&delta, &mut store, 200);
        assert_eq!(
            summary,
            DeltaSummary {
                appended: 2,
                refreshed: 1,
                created: 2,
                removed: 0
            }
        );
        assert_eq!(store["alice"].version_added, Some(5));
        assert_eq!(store["alice"].last_version, Some(6));
        assert_eq!(store["dave"].version_added, Some(6));
        assert!(store["erin"].locations.is_empty());
    }

    #[test]
    fn test_merge_delta_clears_location_with_absent_entry() {
        let mut store = reconcile_base(
            &BaseSnapshot {
                version: 1,
                entries: vec![entry("alice", Some("usa"))],
            },
            1,
        );
        let delta = DeltaSnapshot {
            to_version: 2,
            from_version: None,
            added: vec![entry("alice", None)],
            removed: vec![],
        };
        merge_delta(&delta, &mut store, 2);
        let alice = &store["alice"];
        assert_eq!(alice.current, None);
        assert_eq!(alice.locations.len(), 2);
        assert_eq!(alice.locations[1].location, None);
    }

    #[test]
    fn test_refresh_stamps_delta_version_on_local_entry() {
        let mut store = LocationStore::new();
        let mut alice = LocationRecord::default();
        alice.observe(LocationObservation::local(Some("usa"), 10));
        store.insert("alice".to_string(), alice);

        let delta = DeltaSnapshot {
            to_version: 9,
            from_version: Some(8),
            added: vec![entry("alice", Some("usa"))],
            removed: vec![],
        };
        let summary = merge_delta(&delta, &mut store, 20);
        assert_eq!(summary.refreshed, 1);

        let alice = &store["alice"];
        assert_eq!(alice.locations.len(), 1);
        assert_eq!(alice.locations[0].version, Some(9));
        assert_eq!(alice.locations[0].timestamp, 20);
        assert_eq!(alice.last_version, Some(9));
    }
}
