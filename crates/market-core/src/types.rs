use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily close for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Oldest-first daily closes with strictly increasing dates.
///
/// Every constructor (including deserialization) sorts the input and keeps
/// the last point seen for a duplicated date, so callers never depend on the
/// provider's ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct SymbolSeries {
    points: Vec<PricePoint>,
}

impl SymbolSeries {
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        // Stable sort keeps input order among equal dates, so the later one wins below
        points.sort_by_key(|p| p.date);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        Self { points: deduped }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Overwrite the close of the most recent point in place. A live quote
    /// never appends a new date. Returns false when the series is empty.
    pub fn overwrite_last_close(&mut self, close: f64) -> bool {
        match self.points.last_mut() {
            Some(last) => {
                last.close = close;
                true
            }
            None => false,
        }
    }

    /// Date → close lookup table for exact-date joins.
    pub fn close_map(&self) -> BTreeMap<NaiveDate, f64> {
        self.points.iter().map(|p| (p.date, p.close)).collect()
    }
}

impl From<Vec<PricePoint>> for SymbolSeries {
    fn from(points: Vec<PricePoint>) -> Self {
        Self::from_points(points)
    }
}

impl From<SymbolSeries> for Vec<PricePoint> {
    fn from(series: SymbolSeries) -> Self {
        series.points
    }
}

/// Single day of the Fear & Greed index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentPoint {
    pub date: NaiveDate,
    pub value: u8,
}

/// Date → sentiment value (0-100)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentimentHistory(BTreeMap<NaiveDate, u8>);

impl SentimentHistory {
    pub fn get(&self, date: &NaiveDate) -> Option<u8> {
        self.0.get(date).copied()
    }

    pub fn insert(&mut self, date: NaiveDate, value: u8) {
        self.0.insert(date, value);
    }

    /// Merge freshly resolved points; newer values overwrite existing dates.
    pub fn merge(&mut self, points: &[SentimentPoint]) {
        for p in points {
            self.0.insert(p.date, p.value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Current sentiment snapshot as reported by the upstream source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub value: u8,
    /// Upper-cased rating, e.g. "EXTREME FEAR", "NEUTRAL"
    pub status: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResolution {
    pub current: SentimentReading,
    pub history: Vec<SentimentPoint>,
}

/// Live quote for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub close: f64,
    pub percent_change: Option<f64>,
}

pub type QuoteBatch = BTreeMap<String, Quote>;

/// Root aggregate: everything fetched so far. Persisted as an opaque snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStore {
    #[serde(default, deserialize_with = "last_update_stamp::deserialize")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: BTreeMap<String, SymbolSeries>,
    #[serde(default)]
    pub sentiment: SentimentHistory,
    #[serde(default)]
    pub current_sentiment: Option<SentimentReading>,
}

/// `lastUpdate` is written as RFC 3339, but older snapshots carry epoch
/// milliseconds with `0` meaning never updated.
mod last_update_stamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stamp {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Stamp>::deserialize(deserializer)? {
            None | Some(Stamp::Millis(0)) => Ok(None),
            Some(Stamp::Millis(ms)) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("lastUpdate {} out of range", ms))),
            Some(Stamp::Text(at)) => Ok(Some(at)),
        }
    }
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.data.get(symbol)
    }

    pub fn has_series(&self, symbol: &str) -> bool {
        self.data.get(symbol).is_some_and(|s| !s.is_empty())
    }

    pub fn insert_series(&mut self, symbol: &str, series: SymbolSeries) {
        self.data.insert(symbol.to_string(), series);
    }

    /// Symbols with no cached series (or an empty one), in the given order.
    pub fn missing_symbols(&self, symbols: &[String]) -> Vec<String> {
        symbols
            .iter()
            .filter(|s| !self.has_series(s))
            .cloned()
            .collect()
    }

    /// Apply a live quote to the last point of a symbol's series.
    pub fn apply_quote(&mut self, symbol: &str, close: f64) -> bool {
        self.data
            .get_mut(symbol)
            .map(|series| series.overwrite_last_close(close))
            .unwrap_or(false)
    }

    pub fn merge_sentiment(&mut self, resolution: &SentimentResolution) {
        self.sentiment.merge(&resolution.history);
        self.current_sentiment = Some(resolution.current.clone());
    }
}

/// Trading regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Long,
    Hedge,
}

impl Phase {
    pub fn to_label(&self) -> &'static str {
        match self {
            Phase::Long => "LONG",
            Phase::Hedge => "HEDGE",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_label())
    }
}

/// Phase change marker on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSignal {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSignal::Buy => f.write_str("BUY"),
            TradeSignal::Sell => f.write_str("SELL"),
        }
    }
}

/// One row of the derived signal table, keyed by an anchor trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRow {
    pub date: NaiveDate,
    pub phase: Phase,
    pub signal: Option<TradeSignal>,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    /// `None` renders as "no data"; never carried forward
    pub sentiment: Option<u8>,
    pub closes: BTreeMap<String, Option<f64>>,
}
