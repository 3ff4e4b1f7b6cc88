use thiserror::Error;

/// Failures of a single upstream HTTP call. All of these are transient and
/// retried locally by the fetch executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("Rate limited (code {code})")]
    RateLimited { code: u16 },

    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("[{symbol}] load failed: {reason}")]
    SymbolLoad { symbol: String, reason: String },

    #[error("Quote refresh failed: {0}")]
    Quotes(#[from] FetchError),

    #[error("Sentiment unavailable this cycle")]
    SentimentUnavailable,

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn symbol_load(symbol: &str, cause: impl std::fmt::Display) -> Self {
        EngineError::SymbolLoad {
            symbol: symbol.to_string(),
            reason: cause.to_string(),
        }
    }
}
