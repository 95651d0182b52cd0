//! Integration tests for the file-backed record store and its legacy migration

use location_cache::core::LocationObservation;
use location_cache::storage::{FileBackend, LOCATION_CACHE_KEY, RecordStore, StorageBackend};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> (RecordStore, Arc<FileBackend>) {
    let backend = Arc::new(FileBackend::new(dir.path()));
    (RecordStore::new(backend.clone()), backend)
}

#[tokio::test]
async fn test_upsert_sequence_keeps_history_invariants() {
    let dir = TempDir::new().unwrap();
    let (store, _) = open(&dir);

    let sequence = [
        Some("usa"),
        Some("usa"),
        Some("canada"),
        None,
        None,
        Some("canada"),
        Some("peru"),
        Some("peru"),
    ];
    for (i, location) in sequence.iter().enumerate() {
        store
            .upsert("alice", LocationObservation::local(*location, i as i64 * 10))
            .await
            .unwrap();
    }

    let record = store.get("alice").await.unwrap().unwrap();
    assert_eq!(record.current.as_deref(), Some("peru"));
    let history: Vec<_> = record
        .locations
        .iter()
        .map(|entry| entry.location.as_deref())
        .collect();
    assert_eq!(
        history,
        vec![Some("usa"), Some("canada"), None, Some("canada"), Some("peru")]
    );
    for pair in record.locations.windows(2) {
        assert_ne!(pair[0].location, pair[1].location);
    }
    assert_eq!(record.locations.last().unwrap().timestamp, 70);
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (store, _) = open(&dir);
        store
            .upsert("bob", LocationObservation::local(Some("spain"), 5))
            .await
            .unwrap();
    }

    let (store, _) = open(&dir);
    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].0, "bob");
    assert_eq!(all[0].1.current.as_deref(), Some("spain"));
    assert!(dir.path().join(format!("{}.json", LOCATION_CACHE_KEY)).exists());
}

#[tokio::test]
async fn test_legacy_file_is_migrated_on_read() {
    let dir = TempDir::new().unwrap();
    let (store, backend) = open(&dir);
    backend
        .write(
            LOCATION_CACHE_KEY,
            json!({
                "x": {"location": "x", "timestamp": 100},
                "y": {"current": "y", "locations": [{"location": "y", "timestamp": 7}]}
            }),
        )
        .await
        .unwrap();

    let migrated = store.get("x").await.unwrap().unwrap();
    assert_eq!(migrated.current.as_deref(), Some("x"));
    assert_eq!(migrated.locations.len(), 1);
    assert_eq!(migrated.locations[0].location.as_deref(), Some("x"));
    assert_eq!(migrated.locations[0].timestamp, 100);
    assert_eq!(migrated.locations[0].version, None);

    // Migrating again yields the same record.
    let raw = serde_json::to_value(store.load().await.unwrap()).unwrap();
    backend.write(LOCATION_CACHE_KEY, raw).await.unwrap();
    assert_eq!(store.get("x").await.unwrap().unwrap(), migrated);
}

#[tokio::test]
async fn test_loose_records_survive_load_and_upsert() {
    let dir = TempDir::new().unwrap();
    let (store, backend) = open(&dir);
    backend
        .write(
            LOCATION_CACHE_KEY,
            json!({
                "alice": {"location": "x", "timestamp": 100, "flagged": true},
                "bob": {"current": "y", "locations": [{"location": "y"}]}
            }),
        )
        .await
        .unwrap();

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded["alice"].current.as_deref(), Some("x"));
    assert_eq!(loaded["bob"].locations[0].timestamp, 0);

    store
        .upsert("carol", LocationObservation::local(Some("chile"), 1))
        .await
        .unwrap();
    let reopened = open(&dir).0.load().await.unwrap();
    let mut keys: Vec<_> = reopened.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["alice", "bob", "carol"]);
}

#[tokio::test]
async fn test_remove_and_cached_location() {
    let dir = TempDir::new().unwrap();
    let (store, _) = open(&dir);
    store
        .upsert("carol", LocationObservation::local(Some("chile"), 11))
        .await
        .unwrap();

    let cached = store.cached_location("carol").await.unwrap().unwrap();
    assert_eq!(cached.location.as_deref(), Some("chile"));
    assert_eq!(cached.timestamp, 11);
    assert_eq!(cached.history.len(), 1);

    store.remove("carol").await.unwrap();
    assert!(store.get("carol").await.unwrap().is_none());
    assert!(store.cached_location("carol").await.unwrap().is_none());
    store.remove("nobody").await.unwrap();
}

#[tokio::test]
async fn test_unreadable_store_is_storage_failure() {
    let dir = TempDir::new().unwrap();
    let (store, _) = open(&dir);
    tokio::fs::write(
        dir.path().join(format!("{}.json", LOCATION_CACHE_KEY)),
        "{not json",
    )
    .await
    .unwrap();

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, location_cache::CacheError::StorageFailure(_)));
}
