// Core data models for parameter discovery.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::EndpointType;
use crate::errors::ValidationError;
use crate::framework::FrameworkType;

/// Supported HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::OPTIONS => "OPTIONS",
            Method::HEAD => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::DELETE => reqwest::Method::DELETE,
            Method::PATCH => reqwest::Method::PATCH,
            Method::OPTIONS => reqwest::Method::OPTIONS,
            Method::HEAD => reqwest::Method::HEAD,
        }
    }
}

/// Place a parameter is transmitted in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Body,
    Query,
    Form,
    Header,
}

impl ParameterLocation {
    /// Fixed testing order used by the location resolver.
    pub const ALL: [ParameterLocation; 4] = [
        ParameterLocation::Body,
        ParameterLocation::Query,
        ParameterLocation::Form,
        ParameterLocation::Header,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Body => "body",
            ParameterLocation::Query => "query",
            ParameterLocation::Form => "form",
            ParameterLocation::Header => "header",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authentication scheme applied to every outbound probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    None,
    Bearer,
    ApiKey,
}

/// Authentication configuration for discovery requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    #[serde(default)]
    pub value: Option<String>,
    /// Header carrying the credential for `apikey` auth.
    /// Defaults to `X-API-Key` when unset.
    #[serde(default)]
    pub header_name: Option<String>,
}

impl AuthConfig {
    pub fn none() -> Self {
        AuthConfig {
            auth_type: AuthType::None,
            value: None,
            header_name: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        AuthConfig {
            auth_type: AuthType::Bearer,
            value: Some(token.into()),
            header_name: None,
        }
    }

    pub fn api_key(key: impl Into<String>, header_name: Option<String>) -> Self {
        AuthConfig {
            auth_type: AuthType::ApiKey,
            value: Some(key.into()),
            header_name,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self.auth_type {
            AuthType::None => Ok(()),
            AuthType::Bearer if self.value.is_none() => {
                Err(ValidationError::MissingAuthValue("bearer".to_string()))
            }
            AuthType::ApiKey if self.value.is_none() => {
                Err(ValidationError::MissingAuthValue("apikey".to_string()))
            }
            _ => Ok(()),
        }
    }
}

const MIN_TIMEOUT_SECONDS: u64 = 1;
const MAX_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Raw JSON shape of a discovery request, prior to validation.
#[derive(Debug, Deserialize)]
struct RawDiscoveryRequest {
    url: String,
    method: Method,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    auth: Option<AuthConfig>,
    #[serde(default)]
    seed_body: Option<Value>,
    #[serde(default)]
    content_type_override: Option<String>,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
}

/// A validated discovery request. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDiscoveryRequest")]
pub struct DiscoveryRequest {
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    auth: Option<AuthConfig>,
    seed_body: Option<Value>,
    content_type_override: Option<String>,
    timeout_seconds: u64,
}

impl TryFrom<RawDiscoveryRequest> for DiscoveryRequest {
    type Error = ValidationError;

    fn try_from(raw: RawDiscoveryRequest) -> Result<Self, ValidationError> {
        let mut request = DiscoveryRequest::new(raw.url, raw.method)?;
        request.headers = raw.headers;
        if let Some(auth) = raw.auth {
            auth.validate()?;
            request.auth = Some(auth);
        }
        request.seed_body = raw.seed_body;
        request.content_type_override = raw.content_type_override;
        request = request.with_timeout_seconds(raw.timeout_seconds)?;
        Ok(request)
    }
}

impl DiscoveryRequest {
    /// Create a request for the given absolute http/https URL.
    pub fn new(url: impl Into<String>, method: Method) -> Result<Self, ValidationError> {
        let url = url.into();
        let parsed =
            reqwest::Url::parse(&url).map_err(|_| ValidationError::InvalidUrl(url.clone()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }

        Ok(DiscoveryRequest {
            url,
            method,
            headers: BTreeMap::new(),
            auth: None,
            seed_body: None,
            content_type_override: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        })
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Result<Self, ValidationError> {
        auth.validate()?;
        self.auth = Some(auth);
        Ok(self)
    }

    pub fn with_seed_body(mut self, seed_body: Value) -> Self {
        self.seed_body = Some(seed_body);
        self
    }

    pub fn with_content_type_override(mut self, content_type: impl Into<String>) -> Self {
        self.content_type_override = Some(content_type.into());
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Result<Self, ValidationError> {
        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&timeout_seconds) {
            return Err(ValidationError::TimeoutOutOfRange {
                min: MIN_TIMEOUT_SECONDS,
                max: MAX_TIMEOUT_SECONDS,
                got: timeout_seconds,
            });
        }
        self.timeout_seconds = timeout_seconds;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn auth(&self) -> Option<&AuthConfig> {
        self.auth.as_ref()
    }

    pub fn seed_body(&self) -> Option<&Value> {
        self.seed_body.as_ref()
    }

    pub fn content_type_override(&self) -> Option<&str> {
        self.content_type_override.as_deref()
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

/// Wall-clock budget for one run or one phase.
///
/// Remaining time is recomputed before each unit of work; once expired,
/// no new trials are issued.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
}

impl Deadline {
    pub fn within(budget: Duration) -> Self {
        Deadline {
            end: Instant::now() + budget,
        }
    }

    /// A sub-deadline covering `fraction` of the remaining budget.
    pub fn fraction(&self, fraction: f64) -> Self {
        Deadline::within(self.remaining().mul_f64(fraction.clamp(0.0, 1.0)))
    }

    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Run-scoped scratch state owned by the orchestrator.
///
/// Passed by reference into phases, discarded when the run returns.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub request: DiscoveryRequest,
    pub session_headers: BTreeMap<String, String>,
    pub discovered_parameters: BTreeMap<String, Value>,
    pub evidence: BTreeMap<String, Value>,
    pub execution_stats: BTreeMap<String, Value>,
}

impl DiscoveryContext {
    pub fn new(request: DiscoveryRequest) -> Self {
        let session_headers = request.headers().clone();
        DiscoveryContext {
            request,
            session_headers,
            discovered_parameters: BTreeMap::new(),
            evidence: BTreeMap::new(),
            execution_stats: BTreeMap::new(),
        }
    }

    pub fn add_evidence(&mut self, key: impl Into<String>, evidence: Value) {
        self.evidence.insert(key.into(), evidence);
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, info: Value) {
        self.discovered_parameters.insert(name.into(), info);
    }

    pub fn update_stats(&mut self, key: impl Into<String>, value: Value) {
        self.execution_stats.insert(key.into(), value);
    }
}

/// One discovered parameter in the final result.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredParameter {
    pub name: String,
    pub location: ParameterLocation,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    pub nullable: bool,
    pub confidence: f64,
    pub evidence: serde_json::Map<String, Value>,
}

/// Per-run metadata attached to every result, including degraded ones.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryMeta {
    pub total_parameters: usize,
    pub execution_time_ms: u128,
    pub discovery_version: String,
    pub partial_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub differential_candidates: usize,
    pub locations_resolved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<EndpointType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_confidence: Option<f64>,
    pub phase_timings_ms: BTreeMap<String, u128>,
}

impl DiscoveryMeta {
    pub fn empty(version: impl Into<String>) -> Self {
        DiscoveryMeta {
            total_parameters: 0,
            execution_time_ms: 0,
            discovery_version: version.into(),
            partial_failures: 0,
            error: None,
            differential_candidates: 0,
            locations_resolved: 0,
            framework: None,
            framework_confidence: None,
            endpoint_type: None,
            endpoint_confidence: None,
            phase_timings_ms: BTreeMap::new(),
        }
    }
}

/// Final output of one discovery run.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub url: String,
    pub method: Method,
    pub parameters: Vec<DiscoveredParameter>,
    pub meta: DiscoveryMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_display() {
        assert_eq!(Method::GET.to_string(), "GET");
        assert_eq!(Method::POST.to_string(), "POST");
        assert_eq!(Method::DELETE.to_string(), "DELETE");
    }

    #[test]
    fn test_request_rejects_relative_url() {
        let err = DiscoveryRequest::new("/api/users", Method::POST).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl(_)));
    }

    #[test]
    fn test_request_rejects_non_http_scheme() {
        let err = DiscoveryRequest::new("ftp://example.com/x", Method::GET).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedScheme("ftp".to_string()));
    }

    #[test]
    fn test_request_timeout_bounds() {
        let request = DiscoveryRequest::new("http://example.com/api", Method::POST).unwrap();
        assert!(request.clone().with_timeout_seconds(0).is_err());
        assert!(request.clone().with_timeout_seconds(301).is_err());
        assert_eq!(
            request.with_timeout_seconds(300).unwrap().timeout_seconds(),
            300
        );
    }

    #[test]
    fn test_apikey_auth_requires_value() {
        let auth = AuthConfig {
            auth_type: AuthType::ApiKey,
            value: None,
            header_name: Some("X-API-Key".to_string()),
        };
        let request = DiscoveryRequest::new("https://example.com/api", Method::POST).unwrap();
        assert!(request.with_auth(auth).is_err());
    }

    #[test]
    fn test_request_deserializes_from_json() {
        let request: DiscoveryRequest = serde_json::from_value(serde_json::json!({
            "url": "https://api.example.com/login",
            "method": "POST",
            "auth": {"type": "bearer", "value": "tok"},
            "timeout_seconds": 10
        }))
        .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.timeout_seconds(), 10);
        assert_eq!(request.auth().unwrap().auth_type, AuthType::Bearer);
    }

    #[test]
    fn test_request_json_rejects_bad_timeout() {
        let result: Result<DiscoveryRequest, _> = serde_json::from_value(serde_json::json!({
            "url": "https://api.example.com/login",
            "method": "POST",
            "timeout_seconds": 0
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_deadline_expiry() {
        let deadline = Deadline::within(Duration::from_secs(0));
        assert!(deadline.expired());
        let deadline = Deadline::within(Duration::from_secs(60));
        assert!(!deadline.expired());
        assert!(deadline.remaining() <= Duration::from_secs(60));
    }

    #[test]
    fn test_context_accumulates_state() {
        let request = DiscoveryRequest::new("http://example.com/api", Method::POST).unwrap();
        let mut ctx = DiscoveryContext::new(request);
        ctx.add_parameter("username", serde_json::json!({"type": "string"}));
        ctx.update_stats("trials", serde_json::json!(12));
        assert!(ctx.discovered_parameters.contains_key("username"));
        assert_eq!(ctx.execution_stats["trials"], serde_json::json!(12));
    }
}
