// Endpoint classification.
//
// Combines baseline response traits, differential candidate counts,
// framework signals, and keyword indicators into a single endpoint
// type with a confidence score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::fingerprint::ResponseFingerprint;
use crate::framework::{FrameworkSignal, FrameworkSignalDetector, FrameworkType};
use crate::models::{DiscoveryRequest, Method};
use crate::probes::differential::ParameterCandidate;

/// Purpose categories an endpoint can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    AuthProtected,
    NoRequiredParams,
    OptionalParamsOnly,
    RequiredParamsDetected,
    InvalidMethod,
    Inconclusive,
    Crud,
    Upload,
    Download,
    Search,
    Webhook,
}

impl EndpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::AuthProtected => "auth_protected",
            EndpointType::NoRequiredParams => "no_required_params",
            EndpointType::OptionalParamsOnly => "optional_params_only",
            EndpointType::RequiredParamsDetected => "required_params_detected",
            EndpointType::InvalidMethod => "invalid_method",
            EndpointType::Inconclusive => "inconclusive",
            EndpointType::Crud => "crud",
            EndpointType::Upload => "upload",
            EndpointType::Download => "download",
            EndpointType::Search => "search",
            EndpointType::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for EndpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Fixed scoring order; ties resolve to the earliest bucket.
const BUCKET_ORDER: [EndpointType; 11] = [
    EndpointType::AuthProtected,
    EndpointType::NoRequiredParams,
    EndpointType::OptionalParamsOnly,
    EndpointType::RequiredParamsDetected,
    EndpointType::InvalidMethod,
    EndpointType::Inconclusive,
    EndpointType::Crud,
    EndpointType::Upload,
    EndpointType::Download,
    EndpointType::Search,
    EndpointType::Webhook,
];

const CRUD_PRIOR: f64 = 0.3;
const CONFIDENCE_DIVISOR: f64 = 3.0;

const AUTH_KEYWORDS: [&str; 6] = [
    "unauthorized",
    "authentication failed",
    "access denied",
    "invalid token",
    "expired session",
    "login required",
];
const ERROR_KEYWORDS: [&str; 8] = [
    "error",
    "invalid",
    "forbidden",
    "not found",
    "missing",
    "required",
    "unprocessable",
    "bad request",
];
const SUCCESS_KEYWORDS: [&str; 5] = ["success", "created", "updated", "completed", "ok"];
const CRUD_KEYWORDS: [&str; 6] = ["create", "read", "update", "delete", "list", "get"];
const UPLOAD_KEYWORDS: [&str; 6] = ["upload", "file", "multipart", "attachment", "image", "document"];
const DOWNLOAD_KEYWORDS: [&str; 5] = ["download", "export", "file", "attachment", "report"];
const SEARCH_KEYWORDS: [&str; 6] = ["search", "query", "filter", "find", "list", "get"];
const WEBHOOK_KEYWORDS: [&str; 5] = ["webhook", "callback", "event", "notify", "trigger"];

/// Evidence gathered before scoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassificationSignals {
    pub baseline_status: Option<u16>,
    pub baseline_content_type: Option<String>,
    pub baseline_response_size: Option<usize>,
    pub differential_candidates: Option<usize>,
    pub framework_signal: Option<FrameworkSignal>,
    pub method_support: Vec<String>,
    pub content_type_support: Vec<String>,
}

/// Final classification with the signals that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointClassification {
    pub endpoint_type: EndpointType,
    pub confidence: f64,
    pub evidence: BTreeMap<String, Value>,
    pub signals: ClassificationSignals,
}

/// Multi-signal endpoint classifier.
#[derive(Debug, Default)]
pub struct EndpointClassifier {
    detector: FrameworkSignalDetector,
}

impl EndpointClassifier {
    pub fn new() -> Self {
        EndpointClassifier {
            detector: FrameworkSignalDetector::new(),
        }
    }

    /// Classify an endpoint from whatever evidence is available. Every
    /// argument beyond the request is optional; missing evidence just
    /// means fewer scored signals.
    pub fn classify_endpoint(
        &self,
        request: &DiscoveryRequest,
        initial_response: Option<(&ResponseFingerprint, &str)>,
        candidates: &[ParameterCandidate],
    ) -> EndpointClassification {
        debug!(method = %request.method(), url = %request.url(), "classifying endpoint");

        let mut signals = ClassificationSignals::default();
        let mut response_text = String::new();

        if let Some((fingerprint, body)) = initial_response {
            signals.baseline_status = Some(fingerprint.status);
            signals.baseline_content_type = fingerprint.content_type.clone();
            signals.baseline_response_size = Some(body.len());
            response_text = body.to_string();

            if !body.is_empty() {
                signals.framework_signal = Some(self.detector.best_signal(
                    body,
                    &fingerprint.headers_normalized,
                    fingerprint.status,
                ));
            }
        }

        if !candidates.is_empty() {
            signals.differential_candidates = Some(candidates.len());
        }

        signals.method_support = method_capabilities(request.method());
        signals.content_type_support = content_type_support(initial_response.map(|(fp, _)| fp));

        let indicators = extract_indicators(&response_text);
        let (endpoint_type, confidence) = score_buckets(&signals, &indicators);

        let mut evidence = BTreeMap::new();
        evidence.insert(
            "baseline_analysis".to_string(),
            json!({
                "status_code": signals.baseline_status,
                "content_type": signals.baseline_content_type,
                "response_size": signals.baseline_response_size,
            }),
        );
        evidence.insert(
            "differential_analysis".to_string(),
            json!({ "candidates_count": signals.differential_candidates }),
        );
        evidence.insert(
            "framework_detection".to_string(),
            signals
                .framework_signal
                .as_ref()
                .and_then(|s| serde_json::to_value(s).ok())
                .unwrap_or(Value::Null),
        );
        evidence.insert(
            "method_validation".to_string(),
            json!({ "supported_methods": signals.method_support }),
        );
        evidence.insert(
            "content_type_analysis".to_string(),
            json!({ "supported_types": signals.content_type_support }),
        );
        evidence.insert(
            "pattern_analysis".to_string(),
            serde_json::to_value(&indicators).unwrap_or(Value::Null),
        );

        EndpointClassification {
            endpoint_type,
            confidence,
            evidence,
            signals,
        }
    }
}

/// Keyword hits per indicator category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndicatorHits {
    pub auth: Vec<&'static str>,
    pub error: Vec<&'static str>,
    pub success: Vec<&'static str>,
    pub crud: Vec<&'static str>,
    pub upload: Vec<&'static str>,
    pub download: Vec<&'static str>,
    pub search: Vec<&'static str>,
    pub webhook: Vec<&'static str>,
}

fn collect_hits(lowered: &str, keywords: &'static [&'static str]) -> Vec<&'static str> {
    keywords
        .iter()
        .copied()
        .filter(|kw| lowered.contains(*kw))
        .collect()
}

fn extract_indicators(text: &str) -> IndicatorHits {
    let lowered = text.to_lowercase();
    IndicatorHits {
        auth: collect_hits(&lowered, &AUTH_KEYWORDS),
        error: collect_hits(&lowered, &ERROR_KEYWORDS),
        success: collect_hits(&lowered, &SUCCESS_KEYWORDS),
        crud: collect_hits(&lowered, &CRUD_KEYWORDS),
        upload: collect_hits(&lowered, &UPLOAD_KEYWORDS),
        download: collect_hits(&lowered, &DOWNLOAD_KEYWORDS),
        search: collect_hits(&lowered, &SEARCH_KEYWORDS),
        webhook: collect_hits(&lowered, &WEBHOOK_KEYWORDS),
    }
}

fn method_capabilities(method: Method) -> Vec<String> {
    let mut capabilities = vec![method.to_string()];
    if matches!(method, Method::GET | Method::POST) {
        capabilities.push("JSON".to_string());
        capabilities.push("Form".to_string());
    }
    if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
        capabilities.push("Multipart".to_string());
    }
    if matches!(method, Method::GET) {
        capabilities.push("Query".to_string());
    }
    capabilities
}

fn content_type_support(fingerprint: Option<&ResponseFingerprint>) -> Vec<String> {
    let mut supported = Vec::new();
    let Some(fp) = fingerprint else {
        return supported;
    };
    if let Some(accept) = fp.headers_normalized.get("accept") {
        for token in accept.split(',') {
            let token = token.trim();
            if !token.is_empty() {
                supported.push(token.to_string());
            }
        }
    }
    if let Some(content_type) = &fp.content_type {
        supported.push(content_type.clone());
    }
    supported.dedup();
    supported
}

fn score_buckets(
    signals: &ClassificationSignals,
    indicators: &IndicatorHits,
) -> (EndpointType, f64) {
    let mut scores: BTreeMap<EndpointType, f64> = BTreeMap::new();
    for bucket in BUCKET_ORDER {
        scores.insert(bucket, 0.0);
    }
    *scores.entry(EndpointType::Crud).or_default() += CRUD_PRIOR;

    let mut bump = |bucket: EndpointType, delta: f64| {
        *scores.entry(bucket).or_default() += delta;
    };

    if !indicators.auth.is_empty() {
        bump(EndpointType::AuthProtected, 2.0);
    }
    if !indicators.error.is_empty() {
        bump(EndpointType::AuthProtected, 1.0);
    }
    if !indicators.success.is_empty() {
        bump(EndpointType::Crud, 0.5);
    }
    match indicators.crud.len() {
        0 => {}
        1 => bump(EndpointType::Crud, 0.2),
        2 => bump(EndpointType::Crud, 0.5),
        _ => bump(EndpointType::Crud, 1.0),
    }
    if !indicators.upload.is_empty() {
        bump(EndpointType::Upload, 2.0);
    }
    if !indicators.download.is_empty() {
        bump(EndpointType::Download, 1.5);
    }
    if !indicators.search.is_empty() {
        bump(EndpointType::Search, 1.0);
    }
    if !indicators.webhook.is_empty() {
        bump(EndpointType::Webhook, 1.5);
    }

    if let Some(signal) = &signals.framework_signal {
        match signal.framework {
            FrameworkType::PythonFastapi => bump(EndpointType::Crud, 1.0),
            FrameworkType::NodeExpress => bump(EndpointType::Crud, 0.5),
            FrameworkType::PythonFlask => bump(EndpointType::Crud, 0.4),
            _ => {}
        }
    }

    if signals.method_support.iter().any(|m| m == "JSON") {
        bump(EndpointType::Crud, 0.2);
    }
    if signals.method_support.iter().any(|m| m == "Multipart") {
        bump(EndpointType::Upload, 1.0);
    }
    if signals.method_support.iter().any(|m| m == "Query") {
        bump(EndpointType::Search, 0.5);
    }

    if signals
        .content_type_support
        .iter()
        .any(|ct| ct.contains("json"))
    {
        bump(EndpointType::Crud, 0.2);
    }
    if signals
        .content_type_support
        .iter()
        .any(|ct| ct.contains("multipart"))
    {
        bump(EndpointType::Upload, 0.5);
    }

    match signals.baseline_status {
        Some(200) => bump(EndpointType::Crud, 0.1),
        Some(400..=403) => bump(EndpointType::AuthProtected, 0.5),
        Some(404) | Some(405) => bump(EndpointType::NoRequiredParams, 0.3),
        _ => {}
    }

    match signals.baseline_response_size {
        Some(size) if size > 0 && size < 50 => bump(EndpointType::OptionalParamsOnly, 0.2),
        Some(size) if size >= 50 && size < 200 => bump(EndpointType::RequiredParamsDetected, 0.3),
        _ => {}
    }

    let mut winner = EndpointType::AuthProtected;
    let mut best = f64::MIN;
    for bucket in BUCKET_ORDER {
        let score = scores.get(&bucket).copied().unwrap_or(0.0);
        if score > best {
            best = score;
            winner = bucket;
        }
    }

    (winner, (best / CONFIDENCE_DIVISOR).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;

    fn request(method: Method) -> DiscoveryRequest {
        DiscoveryRequest::new("https://api.example.com/items", method).unwrap()
    }

    fn fingerprint(status: u16, body: &str, content_type: &str) -> ResponseFingerprint {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        crate::fingerprint::create_fingerprint(status, body, &headers, 5.0)
    }

    #[test]
    fn test_no_evidence_defaults_to_crud() {
        let classifier = EndpointClassifier::new();
        let classification =
            classifier.classify_endpoint(&request(Method::DELETE), None, &[]);
        // Only the CRUD prior scores without a response.
        assert_eq!(classification.endpoint_type, EndpointType::Crud);
        assert!((classification.confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_auth_keywords_win() {
        let classifier = EndpointClassifier::new();
        let body = r#"{"message":"unauthorized: invalid token"}"#;
        let fp = fingerprint(401, body, "application/json");
        let classification =
            classifier.classify_endpoint(&request(Method::DELETE), Some((&fp, body)), &[]);
        assert_eq!(classification.endpoint_type, EndpointType::AuthProtected);
        // auth 2.0 + error 1.0 + status 0.5 = 3.5, capped at 1.0.
        assert!((classification.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_upload_keywords_and_multipart_method() {
        let classifier = EndpointClassifier::new();
        let body = r#"{"message":"file upload accepted as multipart attachment"}"#;
        let fp = fingerprint(200, body, "multipart/form-data");
        let classification =
            classifier.classify_endpoint(&request(Method::PUT), Some((&fp, body)), &[]);
        assert_eq!(classification.endpoint_type, EndpointType::Upload);
    }

    #[test]
    fn test_get_method_gains_search_capability() {
        let caps = method_capabilities(Method::GET);
        assert!(caps.contains(&"Query".to_string()));
        assert!(caps.contains(&"JSON".to_string()));
        assert!(!caps.contains(&"Multipart".to_string()));
    }

    #[test]
    fn test_tie_breaks_to_earliest_bucket() {
        let signals = ClassificationSignals::default();
        let indicators = IndicatorHits::default();
        // Every bucket except CRUD is zero; CRUD wins on its prior.
        let (winner, confidence) = score_buckets(&signals, &indicators);
        assert_eq!(winner, EndpointType::Crud);
        assert!((confidence - CRUD_PRIOR / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_count_recorded_in_signals() {
        let classifier = EndpointClassifier::new();
        let candidates = vec![ParameterCandidate::provisional(
            "username",
            "string",
            "probe_string_probe",
        )];
        let classification =
            classifier.classify_endpoint(&request(Method::POST), None, &candidates);
        assert_eq!(classification.signals.differential_candidates, Some(1));
    }
}
