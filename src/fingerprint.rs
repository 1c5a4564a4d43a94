// Response fingerprinting.
//
// Pure functions for creating, comparing, and analyzing deterministic
// summaries of HTTP responses. All comparison happens on fingerprints,
// never on raw bodies.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::transport::RawResponse;

/// Default sensitivity applied when diffing two fingerprints.
pub const DEFAULT_SENSITIVITY: f64 = 0.1;

/// Deterministic summary of one HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFingerprint {
    pub status: u16,
    pub body_hash: String,
    pub body_length: usize,
    pub headers_normalized: BTreeMap<String, String>,
    pub response_time_ms: f64,
    pub content_type: Option<String>,
    pub encoding: Option<String>,
}

/// Structured comparison between two response fingerprints.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintDiff {
    pub status_changed: bool,
    pub hash_changed: bool,
    pub length_delta_percent: f64,
    pub time_delta_percent: f64,
    pub headers_added: BTreeMap<String, String>,
    pub headers_removed: BTreeMap<String, String>,
    pub headers_changed: BTreeMap<String, (String, String)>,
    pub similarity_score: f64,
}

/// Create a fingerprint from raw response data. Fully deterministic.
pub fn create_fingerprint(
    status: u16,
    body: &str,
    headers: &BTreeMap<String, String>,
    response_time_ms: f64,
) -> ResponseFingerprint {
    let mut normalized = BTreeMap::new();
    for (key, value) in headers {
        normalized.insert(key.to_lowercase().trim().to_string(), value.trim().to_string());
    }

    let body_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

    // Content-type is the token preceding any ';' parameter list.
    let content_type = normalized.get("content-type").map(|value| {
        value
            .split(';')
            .next()
            .unwrap_or(value)
            .trim()
            .to_string()
    });
    let encoding = normalized.get("content-encoding").map(|v| v.trim().to_string());

    ResponseFingerprint {
        status,
        body_hash,
        body_length: body.len(),
        headers_normalized: normalized,
        response_time_ms,
        content_type,
        encoding,
    }
}

/// Fingerprint a raw transport response.
pub fn fingerprint_response(response: &RawResponse) -> ResponseFingerprint {
    create_fingerprint(
        response.status,
        &response.body,
        &response.headers,
        response.elapsed_ms,
    )
}

/// Compare two fingerprints and return a structured diff.
///
/// The similarity score is a weighted sum (status 40%, hash 30%,
/// length 20%, headers 10%) scaled by `1 - sensitivity`. The hash term
/// is 1.0 when the hashes agree, so a self-diff at zero sensitivity
/// scores exactly 1.0.
pub fn compare_fingerprints(
    base: &ResponseFingerprint,
    new: &ResponseFingerprint,
    sensitivity: f64,
) -> FingerprintDiff {
    let status_changed = base.status != new.status;
    let hash_changed = base.body_hash != new.body_hash;

    let length_delta_percent = if base.body_length > 0 {
        (new.body_length as f64 - base.body_length as f64).abs() / base.body_length as f64
    } else {
        0.0
    };

    let time_delta_percent = if base.response_time_ms > 0.0 {
        (new.response_time_ms - base.response_time_ms).abs() / base.response_time_ms
    } else {
        0.0
    };

    let mut headers_added = BTreeMap::new();
    let mut headers_removed = BTreeMap::new();
    let mut headers_changed = BTreeMap::new();

    for (key, value) in &new.headers_normalized {
        match base.headers_normalized.get(key) {
            None => {
                headers_added.insert(key.clone(), value.clone());
            }
            Some(base_value) if base_value != value => {
                headers_changed.insert(key.clone(), (base_value.clone(), value.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, value) in &base.headers_normalized {
        if !new.headers_normalized.contains_key(key) {
            headers_removed.insert(key.clone(), value.clone());
        }
    }

    let status_similarity = 1.0 - (base.status as f64 - new.status as f64).abs() / 100.0;
    let hash_similarity = if hash_changed { 0.0 } else { 1.0 };
    let length_similarity = 1.0 - (length_delta_percent / 100.0).min(1.0);
    let header_count = base
        .headers_normalized
        .len()
        .max(new.headers_normalized.len())
        .max(1);
    let header_similarity = 1.0 - headers_changed.len() as f64 / header_count as f64;

    let similarity = 0.4 * status_similarity
        + 0.3 * hash_similarity
        + 0.2 * length_similarity
        + 0.1 * header_similarity;
    let similarity_score = similarity * (1.0 - sensitivity);

    FingerprintDiff {
        status_changed,
        hash_changed,
        length_delta_percent,
        time_delta_percent,
        headers_added,
        headers_removed,
        headers_changed,
        similarity_score,
    }
}

/// Stability of a series of fingerprints captured from the same target.
#[derive(Debug, Clone, Serialize)]
pub struct StabilityReport {
    pub total_fingerprints: usize,
    pub status_consistency: f64,
    pub length_stability: f64,
    pub time_stability: f64,
    pub overall_stability: f64,
    pub unique_statuses: Vec<u16>,
    pub avg_response_time_ms: f64,
}

/// Analyze stability across repeated captures. Requires at least two
/// fingerprints.
pub fn analyze_stability(fingerprints: &[ResponseFingerprint]) -> Option<StabilityReport> {
    if fingerprints.len() < 2 {
        return None;
    }

    let count = fingerprints.len() as f64;

    let mut unique_statuses: Vec<u16> = fingerprints.iter().map(|fp| fp.status).collect();
    unique_statuses.sort_unstable();
    unique_statuses.dedup();
    let status_consistency = 1.0 - (unique_statuses.len() as f64 - 1.0) / count;

    let avg_length =
        fingerprints.iter().map(|fp| fp.body_length as f64).sum::<f64>() / count;
    let length_variance = fingerprints
        .iter()
        .map(|fp| (fp.body_length as f64 - avg_length).powi(2))
        .sum::<f64>()
        / count;
    let length_stability = if avg_length > 0.0 {
        1.0 - length_variance / (avg_length * avg_length)
    } else {
        1.0
    };

    let avg_time = fingerprints.iter().map(|fp| fp.response_time_ms).sum::<f64>() / count;
    let time_variance = fingerprints
        .iter()
        .map(|fp| (fp.response_time_ms - avg_time).powi(2))
        .sum::<f64>()
        / count;
    let time_stability = if avg_time > 0.0 {
        1.0 - time_variance / (avg_time * avg_time)
    } else {
        1.0
    };

    let overall_stability =
        status_consistency * 0.4 + length_stability * 0.3 + time_stability * 0.3;

    Some(StabilityReport {
        total_fingerprints: fingerprints.len(),
        status_consistency,
        length_stability,
        time_stability,
        overall_stability,
        unique_statuses,
        avg_response_time_ms: avg_time,
    })
}

/// Error-suggestive traits extracted from a fingerprint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorPatterns {
    pub http_error: bool,
    pub client_error: bool,
    pub server_error: bool,
    pub content_type: Option<String>,
    pub error_headers: Vec<String>,
    pub empty_body: bool,
    pub short_body: bool,
}

const ERROR_HEADER_MARKERS: [&str; 3] = ["error", "fail", "invalid"];
const SHORT_BODY_THRESHOLD: usize = 50;

/// Extract error-suggestive patterns from a fingerprint.
pub fn extract_error_patterns(fingerprint: &ResponseFingerprint) -> ErrorPatterns {
    let mut patterns = ErrorPatterns {
        http_error: fingerprint.status >= 400,
        client_error: fingerprint.status >= 400 && fingerprint.status < 500,
        server_error: fingerprint.status >= 500,
        content_type: fingerprint.content_type.clone(),
        ..ErrorPatterns::default()
    };

    for key in fingerprint.headers_normalized.keys() {
        if ERROR_HEADER_MARKERS.iter().any(|marker| key.contains(marker)) {
            patterns.error_headers.push(key.clone());
        }
    }

    patterns.empty_body = fingerprint.body_length == 0;
    patterns.short_body =
        fingerprint.body_length > 0 && fingerprint.body_length < SHORT_BODY_THRESHOLD;

    patterns
}

/// Score agreement between expected and extracted error patterns.
pub fn calculate_fingerprint_confidence(
    fingerprint: &ResponseFingerprint,
    expected: &ErrorPatterns,
) -> f64 {
    let extracted = extract_error_patterns(fingerprint);
    let mut score: f64 = 0.0;

    if expected.http_error && extracted.http_error {
        score += 0.3;
    }
    if expected.content_type.is_some() && extracted.content_type.is_some() {
        score += 0.2;
    }
    if !expected.error_headers.is_empty() && !extracted.error_headers.is_empty() {
        score += 0.2;
    }
    if expected.empty_body && extracted.empty_body {
        score += 0.1;
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_header_normalization() {
        let fp = create_fingerprint(
            200,
            "body",
            &headers(&[("Content-Type", " application/json; charset=utf-8 ")]),
            10.0,
        );
        assert_eq!(
            fp.headers_normalized.get("content-type").unwrap(),
            "application/json; charset=utf-8"
        );
        assert_eq!(fp.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_content_encoding_extraction() {
        let fp = create_fingerprint(200, "x", &headers(&[("Content-Encoding", "gzip")]), 1.0);
        assert_eq!(fp.encoding.as_deref(), Some("gzip"));
    }

    #[test]
    fn test_length_delta_zero_base() {
        let base = create_fingerprint(200, "", &BTreeMap::new(), 1.0);
        let new = create_fingerprint(200, "abcdef", &BTreeMap::new(), 1.0);
        let diff = compare_fingerprints(&base, &new, DEFAULT_SENSITIVITY);
        assert_eq!(diff.length_delta_percent, 0.0);
        assert!(diff.hash_changed);
    }

    #[test]
    fn test_header_add_remove_change() {
        let base = create_fingerprint(
            200,
            "b",
            &headers(&[("a", "1"), ("b", "old"), ("gone", "x")]),
            1.0,
        );
        let new = create_fingerprint(
            200,
            "b",
            &headers(&[("a", "1"), ("b", "new"), ("fresh", "y")]),
            1.0,
        );
        let diff = compare_fingerprints(&base, &new, DEFAULT_SENSITIVITY);
        assert!(diff.headers_added.contains_key("fresh"));
        assert!(diff.headers_removed.contains_key("gone"));
        assert_eq!(
            diff.headers_changed.get("b").unwrap(),
            &("old".to_string(), "new".to_string())
        );
    }

    #[test]
    fn test_stability_requires_two_fingerprints() {
        let fp = create_fingerprint(200, "b", &BTreeMap::new(), 1.0);
        assert!(analyze_stability(&[fp]).is_none());
    }

    #[test]
    fn test_stability_of_identical_series() {
        let fp = create_fingerprint(200, "same body", &BTreeMap::new(), 10.0);
        let report = analyze_stability(&[fp.clone(), fp.clone(), fp]).unwrap();
        assert_eq!(report.unique_statuses, vec![200]);
        assert!((report.status_consistency - 1.0).abs() < 1e-9);
        assert!((report.overall_stability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_patterns_classify_status() {
        let client = create_fingerprint(422, "short", &BTreeMap::new(), 1.0);
        let patterns = extract_error_patterns(&client);
        assert!(patterns.http_error);
        assert!(patterns.client_error);
        assert!(!patterns.server_error);
        assert!(patterns.short_body);

        let server = create_fingerprint(500, "", &BTreeMap::new(), 1.0);
        let patterns = extract_error_patterns(&server);
        assert!(patterns.server_error);
        assert!(patterns.empty_body);
    }

    #[test]
    fn test_error_headers_flagged() {
        let fp = create_fingerprint(400, "x", &headers(&[("X-Error-Code", "42")]), 1.0);
        let patterns = extract_error_patterns(&fp);
        assert_eq!(patterns.error_headers, vec!["x-error-code".to_string()]);
    }

    #[test]
    fn test_fingerprint_confidence_capped() {
        let fp = create_fingerprint(
            404,
            "",
            &headers(&[("content-type", "application/json"), ("x-error", "1")]),
            1.0,
        );
        let expected = ErrorPatterns {
            http_error: true,
            content_type: Some("application/json".to_string()),
            error_headers: vec!["x-error".to_string()],
            empty_body: true,
            ..ErrorPatterns::default()
        };
        let confidence = calculate_fingerprint_confidence(&fp, &expected);
        assert!((confidence - 0.8).abs() < 1e-9);
        assert!(confidence <= 1.0);
    }
}
