pub mod executor;

pub use executor::{check_error_envelope, FetchExecutor, HttpResponse, HttpTransport, ReqwestTransport, RetryPolicy};

use async_trait::async_trait;
use chrono::NaiveDate;
use market_core::{EngineError, FetchError, PricePoint, PriceSource, Quote, QuoteBatch, SymbolSeries};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";
pub const DEFAULT_MAX_HISTORY_POINTS: usize = 5000;

/// Twelve Data client: daily history for the full load, batched quotes for live updates.
#[derive(Clone)]
pub struct TwelveDataClient {
    api_key: String,
    base_url: String,
    executor: FetchExecutor,
    max_history_points: usize,
    quote_retries: u32,
    quote_timeout: Duration,
}

impl TwelveDataClient {
    pub fn new(api_key: String, executor: FetchExecutor) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            executor,
            max_history_points: DEFAULT_MAX_HISTORY_POINTS,
            quote_retries: 1,
            quote_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_history_points(mut self, max_history_points: usize) -> Self {
        self.max_history_points = max_history_points;
        self
    }

    /// Live quotes are fetched with a shorter, separate budget.
    pub fn with_quote_budget(mut self, retries: u32, timeout: Duration) -> Self {
        self.quote_retries = retries;
        self.quote_timeout = timeout;
        self
    }

    fn time_series_url(&self, symbol: &str) -> String {
        format!(
            "{}/time_series?symbol={}&interval=1day&outputsize={}&apikey={}",
            self.base_url, symbol, self.max_history_points, self.api_key
        )
    }

    fn quote_url(&self, symbols: &[String]) -> String {
        format!("{}/quote?symbol={}&apikey={}", self.base_url, symbols.join(","), self.api_key)
    }
}

#[async_trait]
impl PriceSource for TwelveDataClient {
    async fn load_history(&self, symbol: &str) -> Result<SymbolSeries, EngineError> {
        let payload = self
            .executor
            .fetch(&self.time_series_url(symbol))
            .await
            .map_err(|e| EngineError::symbol_load(symbol, e))?;

        let series = parse_history(symbol, &payload)?;
        tracing::info!("[{}] {} daily closes loaded", symbol, series.len());
        Ok(series)
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<QuoteBatch, FetchError> {
        let payload = self
            .executor
            .execute(&self.quote_url(symbols), self.quote_retries, self.quote_timeout)
            .await?;

        Ok(parse_quotes(symbols, &payload))
    }
}

/// Parse a `time_series` payload into an oldest-first series.
///
/// The provider lists newest-first; the series constructor re-sorts, so the
/// result does not depend on that convention.
pub fn parse_history(symbol: &str, payload: &Value) -> Result<SymbolSeries, EngineError> {
    let values = payload
        .get("values")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::symbol_load(symbol, "No values returned"))?;

    let points: Vec<PricePoint> = values
        .iter()
        .filter_map(|row| {
            let date = row.get("datetime").and_then(|d| d.as_str()).and_then(parse_day)?;
            let close = row.get("close").and_then(parse_decimal)?;
            (close > 0.0).then_some(PricePoint::new(date, close))
        })
        .collect();

    if points.is_empty() {
        return Err(EngineError::symbol_load(symbol, "No values returned"));
    }

    Ok(SymbolSeries::from_points(points))
}

/// Parse a `quote` payload. Batched requests come back keyed by symbol; a
/// single-symbol request returns the quote object itself.
pub fn parse_quotes(symbols: &[String], payload: &Value) -> QuoteBatch {
    let mut batch = QuoteBatch::new();

    if let Some(symbol) = payload.get("symbol").and_then(|s| s.as_str()) {
        if let Some(quote) = parse_quote(symbol, payload) {
            batch.insert(quote.symbol.clone(), quote);
        }
        return batch;
    }

    for symbol in symbols {
        match payload.get(symbol.as_str()).and_then(|q| parse_quote(symbol, q)) {
            Some(quote) => {
                batch.insert(symbol.clone(), quote);
            }
            None => tracing::debug!("[{}] no usable quote in batch response", symbol),
        }
    }
    batch
}

fn parse_quote(symbol: &str, value: &Value) -> Option<Quote> {
    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        return None;
    }
    let close = value.get("close").and_then(parse_decimal).filter(|c| *c > 0.0)?;
    Some(Quote {
        symbol: symbol.to_string(),
        close,
        percent_change: value.get("percent_change").and_then(parse_decimal),
    })
}

/// Twelve Data sends decimals as strings; accept plain numbers too.
fn parse_decimal(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_day(datetime: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(datetime.get(..10)?, "%Y-%m-%d").ok()
}
