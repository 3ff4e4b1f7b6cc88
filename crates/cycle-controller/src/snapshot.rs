use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use market_core::{AssetStore, EngineError, SignalRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Version tag written by interactive exports.
pub const EXPORT_VERSION: &str = "v4-full-history";
/// Version tag written by the one-shot `sync` job.
pub const SYNC_VERSION: &str = "v4-actions-sync";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    pub symbols: Vec<String>,
    pub max_history_points: usize,
}

/// Portable backup document: the raw store plus the rows derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub asset_store: AssetStore,
    #[serde(default)]
    pub strategy_results: Vec<SignalRow>,
    pub config: SnapshotConfig,
}

impl Snapshot {
    pub fn new(
        version: &str,
        asset_store: AssetStore,
        strategy_results: Vec<SignalRow>,
        config: SnapshotConfig,
    ) -> Self {
        Self {
            version: version.to_string(),
            timestamp: Utc::now(),
            asset_store,
            strategy_results,
            config,
        }
    }
}

/// Extract and validate the store from an import document.
///
/// Accepts either a full snapshot (`{assetStore: ...}`) or a bare store. The
/// anchor series must be present and non-empty.
pub fn parse_snapshot_value(document: Value, anchor: &str) -> Result<AssetStore, EngineError> {
    let store_value = match document {
        Value::Object(mut map) if map.contains_key("assetStore") => map.remove("assetStore").unwrap_or(Value::Null),
        other => other,
    };

    if !store_value.is_object() {
        return Err(EngineError::InvalidSnapshot("document is not an asset store".to_string()));
    }

    let store: AssetStore =
        serde_json::from_value(store_value).map_err(|e| EngineError::InvalidSnapshot(e.to_string()))?;

    if !store.has_series(anchor) {
        return Err(EngineError::InvalidSnapshot(format!("no {} series in snapshot", anchor)));
    }
    Ok(store)
}

pub fn parse_snapshot(raw: &str, anchor: &str) -> Result<AssetStore, EngineError> {
    let document: Value = serde_json::from_str(raw).map_err(|e| EngineError::InvalidSnapshot(e.to_string()))?;
    parse_snapshot_value(document, anchor)
}

pub fn default_export_name(date: NaiveDate) -> String {
    format!("tqqq_system_backup_{}.json", date.format("%Y-%m-%d"))
}

pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write snapshot to {}", path.display()))
}

pub async fn read_snapshot_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read snapshot from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{PricePoint, SymbolSeries};

    fn store_with_anchor() -> AssetStore {
        let mut store = AssetStore::new();
        store.insert_series(
            "QQQ",
            SymbolSeries::from_points(vec![PricePoint::new(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), 420.0)]),
        );
        store
    }

    fn snapshot() -> Snapshot {
        Snapshot::new(
            EXPORT_VERSION,
            store_with_anchor(),
            Vec::new(),
            SnapshotConfig { symbols: vec!["QQQ".into()], max_history_points: 5000 },
        )
    }

    #[test]
    fn test_document_field_names() {
        let value = serde_json::to_value(snapshot()).unwrap();

        assert_eq!(value["version"], "v4-full-history");
        assert!(value["assetStore"]["data"]["QQQ"].is_array());
        assert!(value["strategyResults"].is_array());
        assert_eq!(value["config"]["maxHistoryPoints"], 5000);
    }

    #[test]
    fn test_full_document_and_bare_store_are_accepted() {
        let full = serde_json::to_string(&snapshot()).unwrap();
        let bare = serde_json::to_string(&store_with_anchor()).unwrap();

        assert_eq!(parse_snapshot(&full, "QQQ").unwrap(), store_with_anchor());
        assert_eq!(parse_snapshot(&bare, "QQQ").unwrap(), store_with_anchor());
    }

    #[test]
    fn test_unsorted_import_is_normalised() {
        let raw = r#"{"data":{"QQQ":[
            {"date":"2024-02-02","close":2.0},
            {"date":"2024-02-01","close":1.0},
            {"date":"2024-02-02","close":3.0}
        ]}}"#;

        let store = parse_snapshot(raw, "QQQ").unwrap();
        let closes = store.series("QQQ").unwrap().closes();
        assert_eq!(closes, vec![1.0, 3.0]);
    }

    #[test]
    fn test_missing_anchor_is_rejected() {
        let raw = r#"{"assetStore":{"data":{"SPY":[{"date":"2024-02-01","close":500.0}]}}}"#;
        assert!(matches!(parse_snapshot(raw, "QQQ"), Err(EngineError::InvalidSnapshot(_))));

        let empty_anchor = r#"{"data":{"QQQ":[]}}"#;
        assert!(matches!(parse_snapshot(empty_anchor, "QQQ"), Err(EngineError::InvalidSnapshot(_))));

        assert!(parse_snapshot("[1,2,3]", "QQQ").is_err());
        assert!(parse_snapshot("not json", "QQQ").is_err());
    }

    #[test]
    fn test_export_name() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 9).unwrap();
        assert_eq!(default_export_name(date), "tqqq_system_backup_2024-07-09.json");
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");

        write_snapshot(&path, &snapshot()).await.unwrap();
        let raw = read_snapshot_file(&path).await.unwrap();

        assert_eq!(parse_snapshot(&raw, "QQQ").unwrap(), store_with_anchor());
        assert!(read_snapshot_file(&dir.path().join("missing.json")).await.is_err());
    }
}
