use chrono::{DateTime, NaiveDate};
use market_core::{SentimentPoint, SentimentReading, SentimentResolution};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// One way of turning an unwrapped payload into a sentiment result.
pub trait SentimentParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap shape check; only accepting parsers are asked to parse.
    fn accepts(&self, payload: &str) -> bool;

    fn parse(&self, payload: &str) -> Option<SentimentResolution>;
}

pub fn default_parsers() -> Vec<Box<dyn SentimentParser>> {
    vec![Box::new(JsonSentimentParser), Box::new(HtmlSentimentParser)]
}

/// Round to the nearest integer and clamp to the 0-100 index range.
pub fn to_index_value(raw: f64) -> Option<u8> {
    raw.is_finite().then(|| raw.round().clamp(0.0, 100.0) as u8)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn date_from_millis(ms: f64) -> Option<NaiveDate> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(ms as i64).map(|dt| dt.date_naive())
}

fn date_from_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_f64().and_then(date_from_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.naive_utc().date())
            .ok()
            .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())),
        _ => None,
    }
}

/// Structured payloads: the CNN graph data (`fear_and_greed` plus an optional
/// `fear_and_greed_historical` series) or the mirror format (`stock`).
pub struct JsonSentimentParser;

impl JsonSentimentParser {
    fn reading(node: &Value, date_key: &str) -> Option<SentimentReading> {
        let value = node.get("score").and_then(number).and_then(to_index_value)?;
        let status = node.get("rating").and_then(|r| r.as_str())?.trim().to_uppercase();
        if status.is_empty() {
            return None;
        }
        Some(SentimentReading {
            value,
            status,
            date: node.get(date_key).and_then(date_from_value),
        })
    }

    fn history(root: &Value) -> Vec<SentimentPoint> {
        let Some(data) = root
            .get("fear_and_greed_historical")
            .and_then(|h| h.get("data"))
            .and_then(|d| d.as_array())
        else {
            return Vec::new();
        };

        // Several points can share a calendar day; the latest one wins
        let by_date: BTreeMap<NaiveDate, u8> = data
            .iter()
            .filter_map(|p| {
                let date = p.get("x").and_then(number).and_then(date_from_millis)?;
                let value = p.get("y").and_then(number).and_then(to_index_value)?;
                Some((date, value))
            })
            .collect();

        by_date
            .into_iter()
            .map(|(date, value)| SentimentPoint { date, value })
            .collect()
    }
}

impl SentimentParser for JsonSentimentParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn accepts(&self, payload: &str) -> bool {
        payload.trim_start().starts_with('{')
    }

    fn parse(&self, payload: &str) -> Option<SentimentResolution> {
        let root: Value = serde_json::from_str(payload.trim()).ok()?;

        root.get("fear_and_greed")
            .and_then(|node| Self::reading(node, "timestamp"))
            .map(|current| SentimentResolution { current, history: Self::history(&root) })
            .or_else(|| {
                let current = Self::reading(root.get("stock")?, "lastUpdated")?;
                Some(SentimentResolution { current, history: Vec::new() })
            })
    }
}

static RE_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""score"\s*:\s*"?([0-9]+(?:\.[0-9]+)?)"#).unwrap());
static RE_RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""rating"\s*:\s*"([A-Za-z][A-Za-z _-]*)""#).unwrap());
static RE_DIAL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"dial-number-value[^>]*>\s*([0-9]{1,3})\s*<"#).unwrap());

/// Last-resort scrape of the page's inline data. Never yields history.
pub struct HtmlSentimentParser;

impl SentimentParser for HtmlSentimentParser {
    fn name(&self) -> &'static str {
        "html"
    }

    fn accepts(&self, payload: &str) -> bool {
        let head: String = payload.trim_start().chars().take(512).collect::<String>().to_lowercase();
        head.starts_with("<!doctype") || head.contains("<html") || head.contains("<body")
    }

    fn parse(&self, payload: &str) -> Option<SentimentResolution> {
        let score = RE_SCORE
            .captures(payload)
            .or_else(|| RE_DIAL_VALUE.captures(payload))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .and_then(to_index_value)?;
        let status = RE_RATING
            .captures(payload)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_uppercase())?;

        Some(SentimentResolution {
            current: SentimentReading { value: score, status, date: None },
            history: Vec::new(),
        })
    }
}
