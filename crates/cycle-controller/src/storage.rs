use anyhow::Result;
use async_trait::async_trait;
use market_core::{AssetStore, EngineError, StoreBackend};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Key the asset store snapshot lives under.
pub const STORE_KEY: &str = "tqqq_system_data_v4";

/// Key/value persistence backed by a single `app_state` table.
pub struct SqliteStateStore {
    pub(crate) db_pool: sqlx::AnyPool,
    key: String,
}

impl SqliteStateStore {
    pub fn new(db_pool: sqlx::AnyPool) -> Self {
        Self { db_pool, key: STORE_KEY.to_string() }
    }

    /// Connect, create the table if needed and return a ready store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let db_pool = sqlx::AnyPool::connect(database_url).await?;
        let store = Self::new(db_pool);
        store.init_tables().await?;
        Ok(store)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Save a state value (upsert).
    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Load a state value by key.
    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM app_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }
}

#[async_trait]
impl StoreBackend for SqliteStateStore {
    async fn save(&self, store: &AssetStore) -> Result<(), EngineError> {
        let json = serde_json::to_string(store).map_err(|e| EngineError::Storage(e.to_string()))?;
        self.save_state(&self.key, &json)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    async fn load(&self) -> Result<Option<AssetStore>, EngineError> {
        let Some(json) = self
            .load_state(&self.key)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| EngineError::Storage(format!("corrupt {} snapshot: {}", self.key, e)))
    }
}

/// In-process backend. Keeps the serialized form so loads behave like the
/// database round trip.
#[derive(Default)]
pub struct MemoryStore {
    json: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn save(&self, store: &AssetStore) -> Result<(), EngineError> {
        let json = serde_json::to_string(store).map_err(|e| EngineError::Storage(e.to_string()))?;
        *self.json.lock().await = Some(json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<AssetStore>, EngineError> {
        match self.json.lock().await.as_deref() {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| EngineError::Storage(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_core::{PricePoint, SentimentReading, SymbolSeries};

    async fn setup_test_db() -> SqliteStateStore {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let store = SqliteStateStore::new(pool);
        store.init_tables().await.unwrap();
        store
    }

    fn sample_store() -> AssetStore {
        let mut store = AssetStore::new();
        store.insert_series(
            "QQQ",
            SymbolSeries::from_points(vec![
                PricePoint::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 440.5),
                PricePoint::new(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), 442.0),
            ]),
        );
        store.sentiment.insert(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), 61);
        store.current_sentiment = Some(SentimentReading { value: 61, status: "GREED".into(), date: None });
        store.last_update = Some(chrono::Utc::now());
        store
    }

    #[tokio::test]
    async fn test_state_upsert() {
        let db = setup_test_db().await;

        assert_eq!(db.load_state("k").await.unwrap(), None);
        db.save_state("k", "one").await.unwrap();
        db.save_state("k", "two").await.unwrap();
        assert_eq!(db.load_state("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let db = setup_test_db().await;
        assert!(db.load().await.unwrap().is_none());

        let store = sample_store();
        db.save(&store).await.unwrap();

        assert_eq!(db.load().await.unwrap(), Some(store));
        assert!(db.load_state(STORE_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_a_storage_error() {
        let db = setup_test_db().await;
        db.save_state(STORE_KEY, "{not json").await.unwrap();

        assert!(matches!(db.load().await, Err(EngineError::Storage(_))));
    }

    #[tokio::test]
    async fn test_memory_store_counts_saves() {
        let mem = MemoryStore::new();
        assert!(mem.load().await.unwrap().is_none());

        let store = sample_store();
        mem.save(&store).await.unwrap();
        mem.save(&store).await.unwrap();

        assert_eq!(mem.save_count(), 2);
        assert_eq!(mem.load().await.unwrap(), Some(store));
    }
}
