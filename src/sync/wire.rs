//! JSON shapes exchanged with the remote signature service.
//!
//! Manifests and snapshots are decoded leniently from `serde_json::Value`:
//! malformed individual entries are skipped, while a payload missing its
//! required top-level shape is rejected as `InvalidSnapshotPayload`.

use crate::core::{CacheError, LocationStore, Result, normalize_location};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Manifest strategy that requires a fresh base snapshot.
pub const BASE_DELTA_STRATEGY: &str = "base+delta";

/// Format tag of upload payloads and export files.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Reads a JSON number as a snapshot version. Integral floats are accepted.
pub fn as_version(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    if let Some(version) = value.as_u64() {
        return Some(version);
    }
    value
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64)
        .map(|v| v as u64)
}

fn as_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Manifest
// ============================================================================

/// Base snapshot reference as declared by the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRef {
    pub url: Option<String>,
    pub version: Option<u64>,
}

/// Delta snapshot reference as declared by the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRef {
    pub url: Option<String>,
    pub from_version: Option<u64>,
    pub to_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub strategy: Option<String>,
    pub current_base: Option<BaseRef>,
    pub deltas: Vec<DeltaRef>,
}

/// Validated base step of a sync plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseStep {
    pub url: String,
    pub version: u64,
}

/// Validated delta step of a sync plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaStep {
    pub url: String,
    pub from_version: Option<u64>,
    pub to_version: u64,
}

/// Snapshots to fetch, in application order, to reach the latest version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncPlan {
    pub base: Option<BaseStep>,
    pub deltas: Vec<DeltaStep>,
}

impl Manifest {
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(CacheError::InvalidSnapshotPayload(
                "Manifest response was empty.".to_string(),
            ));
        };

        let current_base = object
            .get("currentBase")
            .and_then(Value::as_object)
            .map(|base| BaseRef {
                url: as_string(base.get("url")),
                version: as_version(base.get("version")),
            });

        let deltas = object
            .get("deltas")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| DeltaRef {
                        url: as_string(entry.get("url")),
                        from_version: as_version(entry.get("fromVersion")),
                        to_version: as_version(entry.get("toVersion")),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            strategy: object
                .get("strategy")
                .and_then(Value::as_str)
                .map(str::to_string),
            current_base,
            deltas,
        })
    }

    /// True when the manifest demands replacing the local store with a base.
    pub fn requires_base(&self, current_version: u64) -> bool {
        self.strategy.as_deref() == Some(BASE_DELTA_STRATEGY)
            || (current_version == 0 && self.current_base.is_some())
    }

    /// Orders the work needed to move from `current_version` to the latest.
    ///
    /// Deltas without a url or numeric `toVersion` are skipped, the rest are
    /// applied in ascending `toVersion`, and deltas at or below the version
    /// already reached are dropped so the local version never regresses.
    pub fn plan(&self, current_version: u64) -> Result<SyncPlan> {
        let base = if self.requires_base(current_version) {
            let step = self.current_base.as_ref().and_then(|base| {
                Some(BaseStep {
                    url: base.url.clone()?,
                    version: base.version?,
                })
            });
            match step {
                Some(step) => Some(step),
                None => {
                    return Err(CacheError::InvalidSnapshotPayload(
                        "Manifest missing base snapshot information.".to_string(),
                    ));
                }
            }
        } else {
            None
        };

        let mut reached = base.as_ref().map(|b| b.version).unwrap_or(current_version);
        let mut candidates: Vec<DeltaStep> = self
            .deltas
            .iter()
            .filter_map(|delta| match (&delta.url, delta.to_version) {
                (Some(url), Some(to_version)) => Some(DeltaStep {
                    url: url.clone(),
                    from_version: delta.from_version,
                    to_version,
                }),
                _ => {
                    debug!(?delta, "skipping malformed manifest delta");
                    None
                }
            })
            .collect();
        candidates.sort_by_key(|delta| delta.to_version);

        let mut deltas = Vec::with_capacity(candidates.len());
        for delta in candidates {
            if delta.to_version <= reached {
                debug!(to_version = delta.to_version, reached, "skipping delta already covered");
                continue;
            }
            reached = delta.to_version;
            deltas.push(delta);
        }

        Ok(SyncPlan { base, deltas })
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// One `{u, l}` entry of a base snapshot or a delta's `added` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub identity: String,
    pub location: Option<String>,
}

impl SnapshotEntry {
    /// Entries without a usable identity yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let identity = as_string(value.get("u"))?;
        let location = normalize_location(value.get("l").and_then(Value::as_str));
        Some(Self { identity, location })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseSnapshot {
    pub version: u64,
    pub entries: Vec<SnapshotEntry>,
}

impl BaseSnapshot {
    /// `expected_version` applies unless the payload declares its own
    /// non-zero numeric version.
    pub fn from_value(value: &Value, expected_version: u64) -> Result<Self> {
        let Some(data) = value.get("data").and_then(Value::as_array) else {
            return Err(CacheError::InvalidSnapshotPayload(
                "Invalid base snapshot payload.".to_string(),
            ));
        };

        let version = as_version(value.get("version"))
            .filter(|v| *v > 0)
            .unwrap_or(expected_version);
        let entries = data.iter().filter_map(SnapshotEntry::from_value).collect();
        Ok(Self { version, entries })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaSnapshot {
    pub to_version: u64,
    pub from_version: Option<u64>,
    pub added: Vec<SnapshotEntry>,
    pub removed: Vec<String>,
}

impl DeltaSnapshot {
    /// `fallback_to_version` is used when the payload omits `toVersion`,
    /// typically the version named by the manifest.
    pub fn from_value(value: &Value, fallback_to_version: Option<u64>) -> Result<Self> {
        if !value.is_object() {
            return Err(CacheError::InvalidSnapshotPayload(
                "Invalid delta snapshot payload.".to_string(),
            ));
        }

        let to_version = as_version(value.get("toVersion"))
            .or(fallback_to_version)
            .ok_or_else(|| {
                CacheError::InvalidSnapshotPayload("Delta snapshot missing toVersion.".to_string())
            })?;

        let added = value
            .get("added")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(SnapshotEntry::from_value).collect())
            .unwrap_or_default();

        let removed = value
            .get("removed")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| as_string(entry.get("u")))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            to_version,
            from_version: as_version(value.get("fromVersion")),
            added,
            removed,
        })
    }
}

// ============================================================================
// Upload / Export
// ============================================================================

/// Full-store document used both for uploads and for backup files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub locations: LocationStore,
}

impl ExportDocument {
    pub fn new(locations: LocationStore) -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION.to_string(),
            exported_at: Utc::now(),
            locations,
        }
    }

    pub fn record_count(&self) -> usize {
        self.locations.len()
    }
}
