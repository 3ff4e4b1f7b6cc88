use market_core::{Phase, QuoteBatch, Renderer, SentimentReading, SignalRow};

/// Writes the latest row, live quotes and sentiment through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogRenderer;

impl LogRenderer {
    pub fn new() -> Self {
        Self
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

/// Index bands used when labelling the reading.
pub fn sentiment_band(value: u8) -> &'static str {
    match value {
        0..=24 => "fear zone",
        76..=100 => "greed zone",
        _ => "neutral zone",
    }
}

pub fn phase_headline(phase: Phase) -> &'static str {
    match phase {
        Phase::Long => "LONG PHASE: hold TQQQ",
        Phase::Hedge => "HEDGE PHASE: stay out of TQQQ",
    }
}

impl Renderer for LogRenderer {
    fn present(&self, rows: &[SignalRow], quotes: Option<&QuoteBatch>, sentiment: Option<&SentimentReading>) {
        let Some(latest) = rows.last() else {
            tracing::warn!("No signal rows to render");
            return;
        };

        tracing::info!(
            "{} | {} | SMA short {} | SMA long {}",
            latest.date,
            phase_headline(latest.phase),
            fmt_opt(latest.sma_short),
            fmt_opt(latest.sma_long)
        );

        if let Some(last_signal) = rows.iter().rev().find(|r| r.signal.is_some()) {
            if let Some(signal) = last_signal.signal {
                tracing::info!("Last signal: {} on {}", signal, last_signal.date);
            }
        }

        for (symbol, close) in &latest.closes {
            match quotes.and_then(|q| q.get(symbol)) {
                Some(quote) => tracing::info!(
                    "  {:<5} {:>10.2} ({:+.2}%)",
                    symbol,
                    quote.close,
                    quote.percent_change.unwrap_or(0.0)
                ),
                None => tracing::info!("  {:<5} {:>10}", symbol, fmt_opt(*close)),
            }
        }

        if let Some(reading) = sentiment {
            tracing::info!(
                "Fear & Greed: {} {} ({})",
                reading.value,
                reading.status,
                sentiment_band(reading.value)
            );
        }
    }
}
