use anyhow::{bail, Context, Result};
use price_client::RetryPolicy;
use serde::{Deserialize, Serialize};
use signal_engine::RuleSet;
use std::env;
use std::time::Duration;

pub const DEFAULT_DAILY_REQUEST_BUDGET: u32 = 800;
pub const DEFAULT_DATABASE_URL: &str = "sqlite:tqqq_system.db?mode=rwc";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Twelve Data credentials; absent means read-only mode
    pub api_key: Option<String>,
    pub base_url: String,

    // Rule set
    pub symbols: Vec<String>,
    pub anchor: String,
    pub short_period: usize,     // 100
    pub long_period: usize,      // 200
    pub max_history_points: usize, // 5000

    // Scheduling
    pub daily_request_budget: u32, // 800 (free tier)
    pub inter_symbol_pause_ms: u64, // 2000

    // Fetch budgets
    pub fetch_retries: u32,          // 2
    pub fetch_timeout_ms: u64,       // 10000
    pub quote_timeout_ms: u64,       // 5000
    pub failure_delay_ms: u64,       // 1000
    pub rate_limit_backoff_ms: u64,  // 3000
    pub sentiment_timeout_ms: u64,   // 8000

    // Storage
    pub database_url: String,

    // Read-only mode source (file path or URL)
    pub public_snapshot: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup, then validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Self {
            api_key: lookup("TWELVE_DATA_API_KEY")
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            base_url: var("TWELVE_DATA_BASE_URL", price_client::DEFAULT_BASE_URL),

            symbols: var("SYMBOLS", &signal_engine::DEFAULT_SYMBOLS.join(","))
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            anchor: var("ANCHOR_SYMBOL", signal_engine::DEFAULT_ANCHOR).trim().to_uppercase(),
            short_period: var("SHORT_PERIOD", "100")
                .parse()
                .context("SHORT_PERIOD must be a positive integer")?,
            long_period: var("LONG_PERIOD", "200")
                .parse()
                .context("LONG_PERIOD must be a positive integer")?,
            max_history_points: var("MAX_HISTORY_POINTS", "5000")
                .parse()
                .context("MAX_HISTORY_POINTS must be a positive integer")?,

            daily_request_budget: var("DAILY_REQUEST_BUDGET", "800")
                .parse()
                .context("DAILY_REQUEST_BUDGET must be a positive integer")?,
            inter_symbol_pause_ms: var("INTER_SYMBOL_PAUSE_MS", "2000").parse()?,

            fetch_retries: var("FETCH_RETRIES", "2").parse()?,
            fetch_timeout_ms: var("FETCH_TIMEOUT_MS", "10000").parse()?,
            quote_timeout_ms: var("QUOTE_TIMEOUT_MS", "5000").parse()?,
            failure_delay_ms: var("FAILURE_DELAY_MS", "1000").parse()?,
            rate_limit_backoff_ms: var("RATE_LIMIT_BACKOFF_MS", "3000").parse()?,
            sentiment_timeout_ms: var("SENTIMENT_TIMEOUT_MS", "8000").parse()?,

            database_url: var("DATABASE_URL", DEFAULT_DATABASE_URL),

            public_snapshot: var("PUBLIC_SNAPSHOT", "data.json"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("SYMBOLS must name at least one symbol");
        }
        if !self.symbols.contains(&self.anchor) {
            bail!("ANCHOR_SYMBOL {} is not in SYMBOLS", self.anchor);
        }
        if self.short_period == 0 || self.long_period == 0 {
            bail!("moving-average periods must be greater than zero");
        }
        if self.short_period >= self.long_period {
            bail!(
                "SHORT_PERIOD ({}) must be less than LONG_PERIOD ({})",
                self.short_period,
                self.long_period
            );
        }
        if self.daily_request_budget == 0 {
            bail!("DAILY_REQUEST_BUDGET must be greater than zero");
        }
        if self.max_history_points == 0 {
            bail!("MAX_HISTORY_POINTS must be greater than zero");
        }
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.api_key.is_none()
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            anchor: self.anchor.clone(),
            symbols: self.symbols.clone(),
            short_period: self.short_period,
            long_period: self.long_period,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.fetch_retries,
            timeout: Duration::from_millis(self.fetch_timeout_ms),
            failure_delay: Duration::from_millis(self.failure_delay_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
        }
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_millis(self.quote_timeout_ms)
    }

    pub fn sentiment_timeout(&self) -> Duration {
        Duration::from_millis(self.sentiment_timeout_ms)
    }

    pub fn inter_symbol_pause(&self) -> Duration {
        Duration::from_millis(self.inter_symbol_pause_ms)
    }
}
