//! Integration tests for the controller: observations, waiters, auto sync and backups

use location_cache::prelude::testing::{
    CollectingReporter, InMemoryBackend, InMemorySignatureRemote, MANIFEST_TARGET, RemoteFailure,
};
use location_cache::storage::{FileBackend, LOCATION_CACHE_KEY};
use location_cache::sync::StatusLevel;
use location_cache::sync::status::SESSION_EXPIRED;
use location_cache::{
    AppConfig, AuthState, AuthUser, CacheError, LocationCache, LookupSource, SyncOutcome,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn cache_with(remote: &InMemorySignatureRemote) -> (LocationCache, Arc<CollectingReporter>) {
    let reporter = Arc::new(CollectingReporter::new());
    let cache = LocationCache::new(
        Arc::new(InMemoryBackend::new()),
        Arc::new(remote.clone()),
        reporter.clone(),
    );
    (cache, reporter)
}

fn user() -> AuthState {
    AuthState::new(
        "token-abcdefghijkl",
        AuthUser {
            name: Some("Ada".to_string()),
            email: None,
        },
    )
}

#[tokio::test]
async fn test_waiting_consumers_are_resolved_once() {
    let remote = InMemorySignatureRemote::new();
    let (cache, _) = cache_with(&remote);
    let mut first = cache.waiters().subscribe(1).unwrap();
    let mut second = cache.waiters().subscribe(2).unwrap();

    assert_eq!(cache.request_location("alice", 1).await.unwrap(), LookupSource::Lookup);
    assert_eq!(cache.request_location("alice", 2).await.unwrap(), LookupSource::Lookup);
    cache.record_observation("alice", Some("usa")).await.unwrap();

    assert_eq!(first.recv().await.unwrap().location.as_deref(), Some("usa"));
    assert_eq!(second.recv().await.unwrap().location.as_deref(), Some("usa"));
    assert_eq!(cache.waiters().waiting_on("alice").unwrap(), 0);

    cache.record_observation("alice", Some("peru")).await.unwrap();
    assert!(first.try_recv().is_err());
}

#[tokio::test]
async fn test_padded_identity_is_kept_as_given() {
    let remote = InMemorySignatureRemote::new();
    let (cache, _) = cache_with(&remote);
    let mut rx = cache.waiters().subscribe(1).unwrap();

    assert_eq!(cache.request_location("alice ", 1).await.unwrap(), LookupSource::Lookup);
    cache.record_observation("alice ", Some("usa")).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().location.as_deref(), Some("usa"));
    assert_eq!(cache.waiters().waiting_on("alice ").unwrap(), 0);
    assert!(cache.get("alice ").await.unwrap().is_some());

    assert_eq!(cache.record_observation("  ", Some("usa")).await.unwrap(), None);
    assert_eq!(cache.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_known_location_is_served_from_cache() {
    let remote = InMemorySignatureRemote::new();
    let (cache, _) = cache_with(&remote);
    cache.record_observation("bob", Some("chile")).await.unwrap();
    cache.record_observation("carol", None).await.unwrap();

    match cache.request_location("bob", 4).await.unwrap() {
        LookupSource::Cache(cached) => {
            assert_eq!(cached.location.as_deref(), Some("chile"));
            assert_eq!(cached.history.len(), 1);
        }
        LookupSource::Lookup => panic!("expected a cache hit"),
    }
    // Known to have no location: scrape again.
    assert_eq!(cache.request_location("carol", 4).await.unwrap(), LookupSource::Lookup);
    assert_eq!(cache.waiters().waiting_on("carol").unwrap(), 1);

    cache.waiters().remove_consumer(4).unwrap();
    assert_eq!(cache.waiters().waiting_on("carol").unwrap(), 0);
}

#[tokio::test]
async fn test_sign_in_runs_one_silent_sync() {
    let remote = InMemorySignatureRemote::new();
    remote.set_manifest(json!({"deltas": []})).await;
    let (cache, reporter) = cache_with(&remote);

    let outcome = cache.sign_in(user()).await.unwrap();
    assert!(matches!(outcome, Some(SyncOutcome::Completed(_))));
    assert!(reporter.messages().is_empty());
    assert_eq!(remote.uploads().await.len(), 1);

    assert_eq!(cache.ensure_auto_sync().await.unwrap(), None);
    assert_eq!(remote.manifest_versions().await.len(), 1);

    let status = cache.status().await.unwrap();
    assert_eq!(status.signed_in_as.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_unauthorized_sync_rearms_auto_sync() {
    let remote = InMemorySignatureRemote::new();
    remote.set_manifest(json!({"deltas": []})).await;
    remote.fail(MANIFEST_TARGET, RemoteFailure::Unauthorized).await;
    let (cache, reporter) = cache_with(&remote);

    assert_eq!(cache.sign_in(user()).await.unwrap(), None);
    assert!(cache.auth_state().await.is_none());
    assert_eq!(
        reporter.messages(),
        vec![(StatusLevel::Error, SESSION_EXPIRED.to_string())]
    );

    remote.clear_failure(MANIFEST_TARGET).await;
    cache.sign_in(user()).await.unwrap();
    let err = {
        remote.fail(MANIFEST_TARGET, RemoteFailure::Unauthorized).await;
        cache.sync().await.unwrap_err()
    };
    assert!(err.is_unauthorized());
    assert!(cache.status().await.unwrap().signed_in_as.is_none());

    remote.clear_failure(MANIFEST_TARGET).await;
    cache.sign_in(user()).await.unwrap();
    assert_eq!(remote.uploads().await.len(), 2);
}

#[tokio::test]
async fn test_sign_out_blocks_manual_actions() {
    let remote = InMemorySignatureRemote::new();
    remote.set_manifest(json!({"deltas": []})).await;
    let (cache, reporter) = cache_with(&remote);
    cache.sign_in(user()).await.unwrap();
    cache.sign_out().await;

    assert_eq!(cache.sync().await.unwrap(), SyncOutcome::NotSignedIn);
    assert!(matches!(cache.upload().await.unwrap_err(), CacheError::NotAuthenticated));
    assert_eq!(reporter.texts(), vec!["Not logged in.", "Not logged in."]);
}

#[tokio::test]
async fn test_import_rejects_invalid_files_without_touching_store() {
    let remote = InMemorySignatureRemote::new();
    let (cache, _) = cache_with(&remote);
    cache.record_observation("alice", Some("usa")).await.unwrap();

    let err = cache.import_json("{").await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidImport(ref m) if m == "Invalid JSON file."));
    let err = cache.import_json(r#"{"locations": 3}"#).await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidImport(ref m) if m == "Invalid location history data."));

    assert_eq!(cache.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_backed_cache_round_trip() {
    let dir = tempdir().unwrap();
    let remote = InMemorySignatureRemote::new();
    let backup;
    {
        let cache = LocationCache::new(
            Arc::new(FileBackend::new(dir.path())),
            Arc::new(remote.clone()),
            Arc::new(CollectingReporter::new()),
        );
        cache.record_observation("alice", Some("usa")).await.unwrap();
        cache.record_observation("alice", Some("canada")).await.unwrap();
        backup = cache.export_json().await.unwrap();
        cache.remove("alice").await.unwrap();
    }

    let cache = LocationCache::new(
        Arc::new(FileBackend::new(dir.path())),
        Arc::new(remote),
        Arc::new(CollectingReporter::new()),
    );
    assert!(cache.get("alice").await.unwrap().is_none());
    let summary = cache.import_json(&backup).await.unwrap();
    assert_eq!(summary.records, 1);
    let alice = cache.get("alice").await.unwrap().unwrap();
    assert_eq!(alice.locations.len(), 2);
    assert_eq!(alice.current.as_deref(), Some("canada"));
}

#[tokio::test]
async fn test_open_with_uses_data_dir_and_reporter() {
    let dir = tempdir().unwrap();
    let config = AppConfig::new(dir.path(), "http://127.0.0.1:9/".parse::<reqwest::Url>().unwrap());
    let reporter = Arc::new(CollectingReporter::new());
    let cache = LocationCache::open_with(&config, reporter.clone()).unwrap();

    cache.record_observation("alice", Some("usa")).await.unwrap();
    assert!(dir.path().join(format!("{}.json", LOCATION_CACHE_KEY)).exists());

    assert!(matches!(cache.upload().await.unwrap_err(), CacheError::NotAuthenticated));
    assert_eq!(reporter.texts(), vec!["Not logged in."]);
}
