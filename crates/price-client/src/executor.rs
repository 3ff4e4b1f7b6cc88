use async_trait::async_trait;
use market_core::FetchError;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const RATE_LIMIT_CODE: u16 = 429;

/// Raw upstream response, body already read as text.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single GET with no retry or timeout policy of its own.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

/// Attempt budget and the two backoff curves: a fixed delay after generic
/// failures, `rate_limit_backoff * attempt` after a throttle response.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub failure_delay: Duration,
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(10),
            failure_delay: Duration::from_secs(1),
            rate_limit_backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `error` on attempt number `attempt` (1-based).
    pub fn delay_after(&self, error: &FetchError, attempt: u32) -> Duration {
        if error.is_rate_limited() {
            self.rate_limit_backoff * attempt
        } else {
            self.failure_delay
        }
    }
}

/// Timeout + bounded retry wrapper shared by every price request.
#[derive(Clone)]
pub struct FetchExecutor {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl FetchExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn with_reqwest(policy: RetryPolicy) -> Self {
        Self::new(Arc::new(ReqwestTransport::new()), policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// Fetch with the policy's own attempt budget and timeout.
    pub async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        self.execute(url, self.policy.max_retries, self.policy.timeout).await
    }

    /// Fetch and parse `url`, retrying up to `max_retries` attempts of at most
    /// `timeout` each. The last error is returned once the budget is spent.
    pub async fn execute(
        &self,
        url: &str,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        let attempts = max_retries.max(1);
        let mut last_err = FetchError::Network("no attempt made".to_string());

        for attempt in 1..=attempts {
            match self.attempt(url, timeout).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!("Fetch attempt {}/{} failed: {}", attempt, attempts, e);
                    let delay = self.policy.delay_after(&e, attempt);
                    last_err = e;
                    if attempt < attempts {
                        if last_err.is_rate_limited() {
                            tracing::warn!("Rate limit hit, backing off {}ms", delay.as_millis());
                        }
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err)
    }

    async fn attempt(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        let response = tokio::time::timeout(timeout, self.transport.get(url))
            .await
            .map_err(|_| FetchError::Network(format!("timed out after {}ms", timeout.as_millis())))??;

        if response.status == RATE_LIMIT_CODE {
            return Err(FetchError::RateLimited { code: RATE_LIMIT_CODE });
        }
        if !response.is_success() {
            return Err(FetchError::Http { status: response.status });
        }

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::InvalidPayload(e.to_string()))?;
        check_error_envelope(&value)?;
        Ok(value)
    }
}

/// Map the provider's `{"status":"error","code":N,"message":...}` envelope to an error.
pub fn check_error_envelope(value: &Value) -> Result<(), FetchError> {
    if value.get("status").and_then(|s| s.as_str()) != Some("error") {
        return Ok(());
    }

    let code = value
        .get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(0);
    if code == RATE_LIMIT_CODE {
        return Err(FetchError::RateLimited { code });
    }

    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown API Error")
        .to_string();
    Err(FetchError::Api { code, message })
}
