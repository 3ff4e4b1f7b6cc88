use chrono::{DateTime, Utc};
use market_core::{
    AssetStore, EngineError, PriceSource, QuoteBatch, Renderer, SentimentSource, SignalRow, StoreBackend,
};
use serde_json::Value;
use signal_engine::{RuleSet, SignalEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::DEFAULT_DAILY_REQUEST_BUDGET;
use crate::interval::smart_interval;
use crate::snapshot::{parse_snapshot, parse_snapshot_value, Snapshot, SnapshotConfig};

/// What one cycle did and everything that went wrong along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub loaded: Vec<String>,
    pub quotes_applied: usize,
    pub sentiment_refreshed: bool,
    pub rows: usize,
    pub errors: Vec<EngineError>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line cycle summary.
    pub fn status_message(&self) -> String {
        if self.errors.is_empty() {
            return format!(
                "OK: {} rows, {} symbols loaded, {} quotes applied{}",
                self.rows,
                self.loaded.len(),
                self.quotes_applied,
                if self.sentiment_refreshed { ", sentiment refreshed" } else { "" }
            );
        }

        let details: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        format!(
            "Completed with {} issue(s) ({} rows): {}",
            self.errors.len(),
            self.rows,
            details.join("; ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle held the loading flag; nothing was touched.
    Skipped,
    FullLoad(CycleReport),
    LiveUpdate(CycleReport),
    /// Data is fresh; cached rows were rendered without fetching.
    UpToDate,
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::FullLoad(report) | CycleOutcome::LiveUpdate(report) => Some(report),
            CycleOutcome::Skipped | CycleOutcome::UpToDate => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::FullLoad(_) => "full load",
            CycleOutcome::LiveUpdate(_) => "live update",
            CycleOutcome::UpToDate => "up to date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Skipped,
    Imported { symbols: usize, rows: usize },
}

/// Floor for the wait between scheduled cycles.
const MIN_CYCLE_SPACING: Duration = Duration::from_secs(1);

/// Clears the loading flag on drop, including on early return or panic.
struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns the asset store and decides, per trigger, between a full historical
/// reload, a live refresh, or nothing.
pub struct CycleController {
    engine: SignalEngine,
    prices: Arc<dyn PriceSource>,
    sentiment: Arc<dyn SentimentSource>,
    backend: Arc<dyn StoreBackend>,
    renderer: Arc<dyn Renderer>,
    store: RwLock<AssetStore>,
    loading: AtomicBool,
    daily_budget: u32,
    interval: Duration,
    inter_symbol_pause: Duration,
    max_history_points: usize,
}

impl CycleController {
    pub fn new(
        rules: RuleSet,
        prices: Arc<dyn PriceSource>,
        sentiment: Arc<dyn SentimentSource>,
        backend: Arc<dyn StoreBackend>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let interval = smart_interval(rules.symbols.len(), DEFAULT_DAILY_REQUEST_BUDGET);
        Self {
            engine: SignalEngine::new(rules),
            prices,
            sentiment,
            backend,
            renderer,
            store: RwLock::new(AssetStore::new()),
            loading: AtomicBool::new(false),
            daily_budget: DEFAULT_DAILY_REQUEST_BUDGET,
            interval,
            inter_symbol_pause: Duration::ZERO,
            max_history_points: price_client::DEFAULT_MAX_HISTORY_POINTS,
        }
    }

    pub fn with_daily_budget(mut self, budget: u32) -> Self {
        self.set_daily_budget(budget);
        self
    }

    /// Pause between consecutive history requests during a full load.
    pub fn with_inter_symbol_pause(mut self, pause: Duration) -> Self {
        self.inter_symbol_pause = pause;
        self
    }

    pub fn with_max_history_points(mut self, max_history_points: usize) -> Self {
        self.max_history_points = max_history_points;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        self.engine.rules()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn daily_budget(&self) -> u32 {
        self.daily_budget
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn set_symbols(&mut self, symbols: Vec<String>) {
        let mut rules = self.engine.rules().clone();
        rules.symbols = symbols;
        self.engine = SignalEngine::new(rules);
        self.recompute_interval();
    }

    pub fn set_daily_budget(&mut self, budget: u32) {
        self.daily_budget = budget;
        self.recompute_interval();
    }

    fn recompute_interval(&mut self) {
        self.interval = smart_interval(self.engine.rules().symbols.len(), self.daily_budget);
        tracing::info!(
            "Update interval {}s ({} symbols, {} requests/day)",
            self.interval.as_secs(),
            self.engine.rules().symbols.len(),
            self.daily_budget
        );
    }

    fn try_begin(&self) -> Option<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard { flag: &self.loading })
    }

    /// Replace the in-memory store with the persisted one, if any.
    pub async fn restore(&self) -> Result<bool, EngineError> {
        match self.backend.load().await? {
            Some(saved) => {
                tracing::info!(
                    "Restored {} cached series (last update {})",
                    saved.data.len(),
                    saved
                        .last_update
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
                *self.store.write().await = saved;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn store(&self) -> AssetStore {
        self.store.read().await.clone()
    }

    pub async fn signals(&self) -> Vec<SignalRow> {
        self.engine.compute(&*self.store.read().await)
    }

    fn is_stale(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_update {
            None => true,
            Some(at) => now
                .signed_duration_since(at)
                .to_std()
                .map(|elapsed| elapsed > self.interval)
                .unwrap_or(false),
        }
    }

    /// One scheduler tick.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Cycle already in progress, skipping trigger");
            return CycleOutcome::Skipped;
        };

        let (missing, stale) = {
            let store = self.store.read().await;
            (
                store.missing_symbols(&self.engine.rules().symbols),
                self.is_stale(store.last_update, Utc::now()),
            )
        };

        if !missing.is_empty() {
            CycleOutcome::FullLoad(self.full_load(&missing, false).await)
        } else if stale {
            CycleOutcome::LiveUpdate(self.live_update().await)
        } else {
            self.render_cached().await;
            CycleOutcome::UpToDate
        }
    }

    /// Manual refresh: live quotes and sentiment now, whatever the cache age.
    pub async fn run_live_update(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Cycle already in progress, skipping manual update");
            return CycleOutcome::Skipped;
        };
        CycleOutcome::LiveUpdate(self.live_update().await)
    }

    /// Run cycles until `shutdown` resolves and return how many ran.
    ///
    /// Each wait starts when the previous cycle has finished, so the store is
    /// already one full interval old when the next cycle checks it.
    pub async fn run_scheduled<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles: u64 = 0;

        loop {
            cycles += 1;
            let outcome = self.run_cycle().await;
            match &outcome {
                CycleOutcome::Skipped => tracing::debug!("Cycle #{} skipped", cycles),
                CycleOutcome::UpToDate => tracing::debug!("Cycle #{}: data is up to date", cycles),
                CycleOutcome::FullLoad(report) | CycleOutcome::LiveUpdate(report) => {
                    tracing::info!("Cycle #{} ({}): {}", cycles, outcome.label(), report.status_message());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval.max(MIN_CYCLE_SPACING)) => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, exiting gracefully...");
                    break;
                }
            }
        }

        cycles
    }

    /// Reload every symbol and the sentiment history regardless of cache state.
    pub async fn run_full_sync(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            return CycleOutcome::Skipped;
        };

        let symbols = self.engine.rules().symbols.clone();
        CycleOutcome::FullLoad(self.full_load(&symbols, true).await)
    }

    async fn full_load(&self, symbols: &[String], refresh_sentiment: bool) -> CycleReport {
        tracing::info!("Full load of {} symbols: {}", symbols.len(), symbols.join(", "));
        let mut report = CycleReport::default();

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !self.inter_symbol_pause.is_zero() {
                tokio::time::sleep(self.inter_symbol_pause).await;
            }
            tracing::info!("[{}] Loading history ({}/{})", symbol, i + 1, symbols.len());

            match self.prices.load_history(symbol).await {
                Ok(series) => {
                    let mut store = self.store.write().await;
                    store.insert_series(symbol, series);
                    report.loaded.push(symbol.clone());
                    if let Err(e) = self.backend.save(&store).await {
                        tracing::warn!("Failed to persist after {}: {}", symbol, e);
                        report.errors.push(e);
                    }
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.errors.push(e);
                }
            }
        }

        let wants_sentiment = refresh_sentiment || self.store.read().await.sentiment.is_empty();
        if wants_sentiment {
            match self.sentiment.resolve().await {
                Some(resolution) => {
                    self.store.write().await.merge_sentiment(&resolution);
                    report.sentiment_refreshed = true;
                }
                None => report.errors.push(EngineError::SentimentUnavailable),
            }
        }

        self.finish(report, None).await
    }

    async fn live_update(&self) -> CycleReport {
        let symbols = self.engine.rules().symbols.clone();
        tracing::info!("Live update for {} symbols", symbols.len());

        let (quotes, resolution) = tokio::join!(self.prices.fetch_quotes(&symbols), self.sentiment.resolve());

        let mut report = CycleReport::default();
        let quotes = {
            let mut store = self.store.write().await;

            let quotes = match quotes {
                Ok(batch) => {
                    for quote in batch.values() {
                        if store.apply_quote(&quote.symbol, quote.close) {
                            report.quotes_applied += 1;
                        }
                    }
                    Some(batch)
                }
                Err(e) => {
                    tracing::warn!("Quote refresh failed: {}", e);
                    report.errors.push(EngineError::Quotes(e));
                    None
                }
            };

            match resolution {
                Some(resolution) => {
                    store.merge_sentiment(&resolution);
                    report.sentiment_refreshed = true;
                }
                None => report.errors.push(EngineError::SentimentUnavailable),
            }

            quotes
        };

        self.finish(report, quotes).await
    }

    /// Stamp, persist once, recompute and render.
    async fn finish(&self, mut report: CycleReport, quotes: Option<QuoteBatch>) -> CycleReport {
        let (rows, sentiment) = {
            let mut store = self.store.write().await;
            store.last_update = Some(Utc::now());
            if let Err(e) = self.backend.save(&store).await {
                tracing::warn!("Failed to persist asset store: {}", e);
                report.errors.push(e);
            }
            (self.engine.compute(&store), store.current_sentiment.clone())
        };

        report.rows = rows.len();
        self.renderer.present(&rows, quotes.as_ref(), sentiment.as_ref());

        if report.is_clean() {
            tracing::info!("{}", report.status_message());
        } else {
            tracing::warn!("{}", report.status_message());
        }
        report
    }

    async fn render_cached(&self) {
        let (rows, sentiment) = {
            let store = self.store.read().await;
            (self.engine.compute(&store), store.current_sentiment.clone())
        };
        tracing::debug!("Data is fresh, rendering {} cached rows", rows.len());
        self.renderer.present(&rows, None, sentiment.as_ref());
    }

    /// Import a backup document, replacing the live store and persisting it.
    ///
    /// Validation happens before anything is replaced.
    pub async fn import_snapshot(&self, raw: &str) -> Result<ImportOutcome, EngineError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(ImportOutcome::Skipped);
        };
        let imported = parse_snapshot(raw, &self.engine.rules().anchor)?;
        self.install(imported, true).await
    }

    /// Show a published snapshot without persisting it (read-only mode).
    pub async fn present_public(&self, document: Value) -> Result<ImportOutcome, EngineError> {
        let Some(_guard) = self.try_begin() else {
            return Ok(ImportOutcome::Skipped);
        };
        let imported = parse_snapshot_value(document, &self.engine.rules().anchor)?;
        self.install(imported, false).await
    }

    async fn install(&self, imported: AssetStore, persist: bool) -> Result<ImportOutcome, EngineError> {
        let symbols = imported.data.len();
        let (rows, sentiment) = {
            let mut store = self.store.write().await;
            *store = imported;
            if persist {
                self.backend.save(&store).await?;
            }
            (self.engine.compute(&store), store.current_sentiment.clone())
        };

        tracing::info!("Imported {} series, {} signal rows", symbols, rows.len());
        self.renderer.present(&rows, None, sentiment.as_ref());
        Ok(ImportOutcome::Imported { symbols, rows: rows.len() })
    }

    pub async fn export_snapshot(&self, version: &str) -> Snapshot {
        let store = self.store.read().await.clone();
        let rows = self.engine.compute(&store);
        Snapshot::new(
            version,
            store,
            rows,
            SnapshotConfig {
                symbols: self.engine.rules().symbols.clone(),
                max_history_points: self.max_history_points,
            },
        )
    }
}
