use async_trait::async_trait;
use crate::{AssetStore, EngineError, FetchError, QuoteBatch, SentimentReading, SentimentResolution, SignalRow, SymbolSeries};

/// Upstream price provider: bulk daily history and batched live quotes.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn load_history(&self, symbol: &str) -> Result<SymbolSeries, EngineError>;

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<QuoteBatch, FetchError>;
}

/// Market-mood source. `None` means "unavailable this cycle", never a fatal condition.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn resolve(&self) -> Option<SentimentResolution>;
}

/// Opaque key/value persistence for the asset store.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn save(&self, store: &AssetStore) -> Result<(), EngineError>;

    async fn load(&self) -> Result<Option<AssetStore>, EngineError>;
}

/// Presentation collaborator invoked at the end of every cycle.
pub trait Renderer: Send + Sync {
    fn present(
        &self,
        rows: &[SignalRow],
        quotes: Option<&QuoteBatch>,
        sentiment: Option<&SentimentReading>,
    );
}
