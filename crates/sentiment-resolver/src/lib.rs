//! Fear & Greed resolution across an ordered matrix of upstream targets and
//! forwarding proxies.
//!
//! Every (target, proxy) pair is tried in priority order, target-major, and the
//! first payload that a parser understands wins.

pub mod parsers;
pub mod targets;

pub use parsers::{default_parsers, HtmlSentimentParser, JsonSentimentParser, SentimentParser};
pub use targets::{default_proxies, default_targets, Proxy, ProxyStyle, SentimentTarget};

use async_trait::async_trait;
use market_core::{SentimentResolution, SentimentSource};
use price_client::HttpTransport;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SENTIMENT_TIMEOUT: Duration = Duration::from_secs(8);

pub struct SentimentResolver {
    transport: Arc<dyn HttpTransport>,
    targets: Vec<SentimentTarget>,
    proxies: Vec<Proxy>,
    parsers: Vec<Box<dyn SentimentParser>>,
    timeout: Duration,
}

impl SentimentResolver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            targets: default_targets(),
            proxies: default_proxies(),
            parsers: default_parsers(),
            timeout: DEFAULT_SENTIMENT_TIMEOUT,
        }
    }

    pub fn with_targets(mut self, targets: Vec<SentimentTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_proxies(mut self, proxies: Vec<Proxy>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_parsers(mut self, parsers: Vec<Box<dyn SentimentParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Walk the matrix and return the first success, or `None` once every
    /// combination has failed.
    pub async fn resolve_sentiment(&self) -> Option<SentimentResolution> {
        for target in &self.targets {
            for proxy in &self.proxies {
                match self.try_pair(target, proxy).await {
                    Ok(resolution) => {
                        tracing::info!(
                            "Sentiment resolved via {} through {}: {} ({}), {} history points",
                            target.name,
                            proxy.name,
                            resolution.current.value,
                            resolution.current.status,
                            resolution.history.len()
                        );
                        return Some(resolution);
                    }
                    Err(reason) => {
                        tracing::debug!("Sentiment {} via {} failed: {}", target.name, proxy.name, reason);
                    }
                }
            }
        }

        tracing::warn!(
            "Sentiment unavailable: all {} source/proxy combinations failed",
            self.targets.len() * self.proxies.len()
        );
        None
    }

    async fn try_pair(&self, target: &SentimentTarget, proxy: &Proxy) -> Result<SentimentResolution, String> {
        let url = proxy.forward(&target.url);
        let response = tokio::time::timeout(self.timeout, self.transport.get(&url))
            .await
            .map_err(|_| format!("timed out after {}ms", self.timeout.as_millis()))?
            .map_err(|e| e.to_string())?;

        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }

        let payload = proxy.unwrap_envelope(&response.body);
        self.parse_payload(&payload)
            .ok_or_else(|| "no sentiment fields in payload".to_string())
    }

    /// Hand the payload to the first parser that recognises its shape and can
    /// extract a result from it.
    pub fn parse_payload(&self, payload: &str) -> Option<SentimentResolution> {
        self.parsers
            .iter()
            .filter(|p| p.accepts(payload))
            .find_map(|p| p.parse(payload))
    }
}

#[async_trait]
impl SentimentSource for SentimentResolver {
    async fn resolve(&self) -> Option<SentimentResolution> {
        self.resolve_sentiment().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::FetchError;
    use price_client::HttpResponse;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed responses per URL and records the order of requests.
    struct RoutedTransport {
        routes: HashMap<String, Result<HttpResponse, FetchError>>,
        slow: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl RoutedTransport {
        fn new() -> Self {
            Self { routes: HashMap::new(), slow: Vec::new(), calls: Mutex::new(Vec::new()) }
        }

        fn route(mut self, url: &str, response: Result<HttpResponse, FetchError>) -> Self {
            self.routes.insert(url.to_string(), response);
            self
        }

        fn slow(mut self, url: &str) -> Self {
            self.slow.push(url.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for RoutedTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.slow.iter().any(|u| u == url) {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            self.routes
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Network("connection refused".into())))
        }
    }

    fn matrix() -> (Vec<SentimentTarget>, Vec<Proxy>) {
        (
            vec![
                SentimentTarget::new("api", "https://fng.test/api"),
                SentimentTarget::new("mirror", "https://mirror.test/data.json"),
            ],
            vec![
                Proxy::new("relay-a", ProxyStyle::Prefix("https://a.test/".into())),
                Proxy::new("relay-b", ProxyStyle::Prefix("https://b.test/".into())).with_envelope("contents"),
            ],
        )
    }

    fn resolver(transport: Arc<RoutedTransport>) -> SentimentResolver {
        let (targets, proxies) = matrix();
        SentimentResolver::new(transport)
            .with_targets(targets)
            .with_proxies(proxies)
            .with_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn third_pair_wins_and_fourth_is_never_tried() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route("https://a.test/https://fng.test/api", Ok(HttpResponse { status: 403, body: String::new() }))
                .route("https://b.test/https://fng.test/api", Ok(HttpResponse::ok("{\"contents\":null}")))
                .route(
                    "https://a.test/https://mirror.test/data.json",
                    Ok(HttpResponse::ok(r#"{"stock":{"score":42,"rating":"neutral"}}"#)),
                )
                .route(
                    "https://b.test/https://mirror.test/data.json",
                    Ok(HttpResponse::ok(r#"{"contents":"{\"stock\":{\"score\":99,\"rating\":\"greed\"}}"}"#)),
                ),
        );

        let res = resolver(transport.clone()).resolve_sentiment().await.unwrap();

        assert_eq!(res.current.value, 42);
        assert_eq!(res.current.status, "NEUTRAL");
        assert_eq!(
            transport.calls(),
            vec![
                "https://a.test/https://fng.test/api".to_string(),
                "https://b.test/https://fng.test/api".to_string(),
                "https://a.test/https://mirror.test/data.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn wrapped_payload_is_unwrapped() {
        let transport = Arc::new(RoutedTransport::new().route(
            "https://b.test/https://fng.test/api",
            Ok(HttpResponse::ok(
                r#"{"contents":"{\"fear_and_greed\":{\"score\":18.4,\"rating\":\"extreme fear\"}}"}"#,
            )),
        ));

        let res = resolver(transport).resolve().await.unwrap();
        assert_eq!(res.current.value, 18);
        assert_eq!(res.current.status, "EXTREME FEAR");
    }

    #[tokio::test]
    async fn html_page_is_a_history_less_success() {
        let transport = Arc::new(RoutedTransport::new().route(
            "https://a.test/https://mirror.test/data.json",
            Ok(HttpResponse::ok(
                r#"<!doctype html><html><script>{"score":55,"rating":"neutral"}</script></html>"#,
            )),
        ));

        let res = resolver(transport).resolve().await.unwrap();
        assert_eq!(res.current.value, 55);
        assert!(res.history.is_empty());
    }

    #[tokio::test]
    async fn slow_pair_times_out_and_moves_on() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(
                    "https://a.test/https://fng.test/api",
                    Ok(HttpResponse::ok(r#"{"stock":{"score":10,"rating":"fear"}}"#)),
                )
                .slow("https://a.test/https://fng.test/api")
                .route(
                    "https://b.test/https://fng.test/api",
                    Ok(HttpResponse::ok(r#"{"stock":{"score":61,"rating":"greed"}}"#)),
                ),
        );

        let res = resolver(transport.clone()).resolve().await.unwrap();
        assert_eq!(res.current.value, 61);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_matrix_returns_none() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route("https://a.test/https://fng.test/api", Ok(HttpResponse::ok("not a payload"))),
        );

        assert!(resolver(transport.clone()).resolve().await.is_none());
        assert_eq!(transport.calls().len(), 4);
    }
}
