use serde_json::Value;

/// Upstream endpoint carrying the Fear & Greed index
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentTarget {
    pub name: String,
    pub url: String,
}

impl SentimentTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

/// How a relay expects the target URL to be passed
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyStyle {
    /// Fetch the target as-is
    Direct,
    /// Append the raw target URL to a prefix
    Prefix(String),
    /// Append the percent-encoded target URL to a prefix
    EncodedPrefix(String),
}

/// Forwarding service in front of a target. Some wrap the real payload in a
/// string field of a JSON envelope; others pass it through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub name: String,
    pub style: ProxyStyle,
    pub envelope_field: Option<String>,
}

impl Proxy {
    pub fn direct() -> Self {
        Self { name: "direct".into(), style: ProxyStyle::Direct, envelope_field: None }
    }

    pub fn new(name: impl Into<String>, style: ProxyStyle) -> Self {
        Self { name: name.into(), style, envelope_field: None }
    }

    pub fn with_envelope(mut self, field: impl Into<String>) -> Self {
        self.envelope_field = Some(field.into());
        self
    }

    /// Forwarded URL for `target_url`.
    pub fn forward(&self, target_url: &str) -> String {
        match &self.style {
            ProxyStyle::Direct => target_url.to_string(),
            ProxyStyle::Prefix(prefix) => format!("{prefix}{target_url}"),
            ProxyStyle::EncodedPrefix(prefix) => {
                let encoded: String = url::form_urlencoded::byte_serialize(target_url.as_bytes()).collect();
                format!("{prefix}{encoded}")
            }
        }
    }

    /// Strip the proxy envelope when there is one; anything unexpected falls
    /// back to the raw body.
    pub fn unwrap_envelope(&self, body: &str) -> String {
        let Some(field) = &self.envelope_field else {
            return body.to_string();
        };

        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => match map.get(field) {
                Some(Value::String(inner)) => inner.clone(),
                Some(inner @ Value::Object(_)) => inner.to_string(),
                _ => body.to_string(),
            },
            _ => body.to_string(),
        }
    }
}

pub fn default_targets() -> Vec<SentimentTarget> {
    vec![
        SentimentTarget::new(
            "cnn-graphdata",
            "https://production.dataviz.cnn.io/index/fearandgreed/graphdata",
        ),
        SentimentTarget::new(
            "fng-mirror",
            "https://raw.githubusercontent.com/rem79/fear-greed-index/main/data.json",
        ),
        SentimentTarget::new("cnn-page", "https://edition.cnn.com/markets/fear-and-greed"),
    ]
}

pub fn default_proxies() -> Vec<Proxy> {
    vec![
        Proxy::new("allorigins", ProxyStyle::EncodedPrefix("https://api.allorigins.win/get?url=".into()))
            .with_envelope("contents"),
        Proxy::new("corsproxy", ProxyStyle::EncodedPrefix("https://corsproxy.io/?url=".into())),
        Proxy::new("codetabs", ProxyStyle::EncodedPrefix("https://api.codetabs.com/v1/proxy?quest=".into())),
        Proxy::direct(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_styles() {
        let target = "https://example.com/a?b=1";

        assert_eq!(Proxy::direct().forward(target), target);
        assert_eq!(
            Proxy::new("p", ProxyStyle::Prefix("https://relay/".into())).forward(target),
            "https://relay/https://example.com/a?b=1"
        );
        assert_eq!(
            Proxy::new("e", ProxyStyle::EncodedPrefix("https://relay/get?url=".into())).forward(target),
            "https://relay/get?url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1"
        );
    }

    #[test]
    fn envelope_is_unwrapped_when_present() {
        let proxy = Proxy::direct().with_envelope("contents");
        let body = r#"{"contents":"{\"stock\":{\"score\":12}}","status":{"http_code":200}}"#;

        assert_eq!(proxy.unwrap_envelope(body), r#"{"stock":{"score":12}}"#);
    }

    #[test]
    fn envelope_falls_back_to_raw() {
        let proxy = Proxy::direct().with_envelope("contents");

        assert_eq!(proxy.unwrap_envelope("<html>page</html>"), "<html>page</html>");
        assert_eq!(proxy.unwrap_envelope(r#"{"other":1}"#), r#"{"other":1}"#);
        assert_eq!(Proxy::direct().unwrap_envelope(r#"{"contents":"x"}"#), r#"{"contents":"x"}"#);
    }

    #[test]
    fn defaults_end_with_direct_fetch() {
        assert_eq!(default_targets().len(), 3);
        assert_eq!(default_proxies().last().unwrap().style, ProxyStyle::Direct);
    }
}
