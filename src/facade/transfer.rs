use crate::core::{CacheError, LocationStore, Result};
use crate::storage::{NormalizeReport, normalize_store};
use crate::sync::ExportDocument;
use serde_json::Value;

/// Outcome of importing a backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub records: usize,
    pub migrated: usize,
    pub skipped: usize,
}

/// Parses a backup file into a normalized store.
///
/// Only the `locations` object is consulted; `version` and `exportedAt` are
/// informational. Legacy records inside it are upgraded like on load.
pub fn parse_import(text: &str) -> Result<(LocationStore, NormalizeReport)> {
    let document: Value = serde_json::from_str(text)
        .map_err(|_| CacheError::InvalidImport("Invalid JSON file.".to_string()))?;
    let Some(locations) = document
        .as_object()
        .and_then(|object| object.get("locations"))
        .and_then(Value::as_object)
    else {
        return Err(CacheError::InvalidImport(
            "Invalid location history data.".to_string(),
        ));
    };
    Ok(normalize_store(locations))
}

pub fn render_export(document: &ExportDocument) -> Result<String> {
    serde_json::to_string_pretty(document)
        .map_err(|err| CacheError::StorageFailure(format!("serialize export: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_rejects_bad_input() {
        let err = parse_import("not json").unwrap_err();
        assert_eq!(err.to_string(), "Invalid location history data: Invalid JSON file.");

        let err = parse_import(r#"{"version":"1.0"}"#).unwrap_err();
        assert!(matches!(err, CacheError::InvalidImport(ref m) if m == "Invalid location history data."));

        assert!(parse_import(r#"{"locations":[]}"#).is_err());
        assert!(parse_import("[]").is_err());
    }

    #[test]
    fn test_parse_import_migrates_legacy_entries() {
        let (store, report) = parse_import(
            r#"{"locations":{"x":{"location":"spain","timestamp":100},"y":{"current":null,"locations":[]}}}"#,
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(report.migrated, 1);
        assert_eq!(store["x"].current.as_deref(), Some("spain"));
        assert_eq!(store["x"].locations[0].timestamp, 100);
    }
}
