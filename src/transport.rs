// HTTP transport for discovery probes.
//
// One client instance serves a whole run: it applies auth and custom
// headers, injects the payload at the requested location, enforces the
// per-request timeout ceiling, and spaces consecutive requests with a
// single rate gate.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::TransportError;
use crate::models::{AuthType, DiscoveryRequest, ParameterLocation};

/// Payload injected into a probe: one or more candidate key/value pairs.
pub type Payload = serde_json::Map<String, Value>;

const USER_AGENT: &str = concat!("parascope/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_CEILING: Duration = Duration::from_secs(10);
const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
const PROBE_HEADER_PREFIX: &str = "x-probe-";

/// Raw response captured from one probe.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub elapsed_ms: f64,
}

/// Sends one request with a payload injected at a specified location.
#[allow(async_fn_in_trait)]
pub trait TransportClient {
    async fn send(
        &self,
        request: &DiscoveryRequest,
        payload: &Payload,
        location: ParameterLocation,
    ) -> Result<RawResponse, TransportError>;
}

/// Production transport client backed by reqwest.
pub struct HttpTransportClient {
    client: reqwest::Client,
    timeout_ceiling: Duration,
    min_delay: Duration,
    gate: Mutex<Option<Instant>>,
}

impl HttpTransportClient {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_settings(DEFAULT_TIMEOUT_CEILING, DEFAULT_MIN_DELAY)
    }

    /// Build a client with an explicit per-request timeout ceiling and
    /// minimum inter-request delay.
    pub fn with_settings(
        timeout_ceiling: Duration,
        min_delay: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(HttpTransportClient {
            client,
            timeout_ceiling,
            min_delay,
            gate: Mutex::new(None),
        })
    }

    /// Sleep until at least `min_delay` has passed since the previous send.
    async fn rate_gate(&self) {
        let wait = {
            let mut last = self.gate.lock().await;
            let wait = match *last {
                Some(prev) => self.min_delay.saturating_sub(prev.elapsed()),
                None => Duration::ZERO,
            };
            *last = Some(Instant::now() + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    fn base_headers(
        &self,
        request: &DiscoveryRequest,
        location: ParameterLocation,
    ) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        if let Some(auth) = request.auth() {
            match auth.auth_type {
                AuthType::None => {}
                AuthType::Bearer => {
                    if let Some(token) = &auth.value {
                        let value = format!("Bearer {}", token);
                        if let Ok(value) = HeaderValue::from_str(&value) {
                            headers.insert(AUTHORIZATION, value);
                        }
                    }
                }
                AuthType::ApiKey => {
                    if let Some(key) = &auth.value {
                        let name = auth.header_name.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER);
                        let name = HeaderName::from_bytes(name.as_bytes())
                            .map_err(|_| TransportError::InvalidHeaderKey(name.to_string()))?;
                        if let Ok(value) = HeaderValue::from_str(key) {
                            headers.insert(name, value);
                        }
                    }
                }
            }
        }

        for (key, value) in request.headers() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| TransportError::InvalidHeaderKey(key.clone()))?;
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        }

        if let Some(content_type) = request.content_type_override() {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        } else if location == ParameterLocation::Body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        Ok(headers)
    }
}

/// Render a payload value as a flat string for query/form/header use.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Synthesize the probe header name carrying a candidate at the
/// header location.
pub fn probe_header_name(candidate: &str) -> String {
    format!("{}{}", PROBE_HEADER_PREFIX, candidate.to_lowercase())
}

impl TransportClient for HttpTransportClient {
    async fn send(
        &self,
        request: &DiscoveryRequest,
        payload: &Payload,
        location: ParameterLocation,
    ) -> Result<RawResponse, TransportError> {
        self.rate_gate().await;

        let mut url = reqwest::Url::parse(request.url())
            .map_err(|e| TransportError::Url(e.to_string()))?;
        let mut headers = self.base_headers(request, location)?;

        if location == ParameterLocation::Query {
            // Merge payload into the existing query string.
            let mut pairs = url.query_pairs_mut();
            for (key, value) in payload {
                pairs.append_pair(key, &value_to_string(value));
            }
            drop(pairs);
        }

        if location == ParameterLocation::Header {
            for (key, value) in payload {
                let name = HeaderName::from_bytes(probe_header_name(key).as_bytes())
                    .map_err(|_| TransportError::InvalidHeaderKey(key.clone()))?;
                if let Ok(value) = HeaderValue::from_str(&value_to_string(value)) {
                    headers.insert(name, value);
                }
            }
        }

        let timeout = Duration::from_secs(request.timeout_seconds()).min(self.timeout_ceiling);
        let mut builder = self
            .client
            .request(request.method().into(), url)
            .timeout(timeout);

        builder = match location {
            ParameterLocation::Body => {
                // An empty payload falls back to the caller's seed body.
                let body = if payload.is_empty() {
                    request
                        .seed_body()
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Payload::new()))
                } else {
                    Value::Object(payload.clone())
                };
                builder.json(&body)
            }
            ParameterLocation::Form => {
                let pairs: Vec<(String, String)> = payload
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect();
                builder.form(&pairs)
            }
            ParameterLocation::Query | ParameterLocation::Header => builder,
        };

        // Custom headers and the content-type override win over location
        // defaults set by .json()/.form().
        builder = builder.headers(headers);

        let started = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut response_headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response.text().await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        debug!(
            status,
            location = %location,
            elapsed_ms,
            "probe sent"
        );

        Ok(RawResponse {
            status,
            body,
            headers: response_headers,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_string_keeps_raw_strings() {
        assert_eq!(value_to_string(&Value::String("test".into())), "test");
        assert_eq!(value_to_string(&serde_json::json!(42)), "42");
        assert_eq!(value_to_string(&Value::Null), "null");
        assert_eq!(value_to_string(&serde_json::json!(true)), "true");
    }

    #[test]
    fn test_probe_header_name_is_lowercased_and_prefixed() {
        assert_eq!(probe_header_name("UserName"), "x-probe-username");
        assert_eq!(probe_header_name("token"), "x-probe-token");
    }
}
