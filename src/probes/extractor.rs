// Candidate name extraction from baseline response bodies.
//
// Layered heuristics, highest-signal first: structured validation
// "loc" arrays, error-marker-adjacent tokens, then a short-body
// fallback over quoted key-like tokens.

use lazy_static::lazy_static;
use regex::Regex;

const FALLBACK_BODY_LIMIT: usize = 500;

lazy_static! {
    // Validation payload location arrays, e.g. "loc": ["body", "username"].
    static ref LOC_ARRAY: Regex = Regex::new(r#""loc"\s*:\s*\[([^\]]*)\]"#).unwrap();
    static ref QUOTED_TOKEN: Regex = Regex::new(r#""([^"]+)""#).unwrap();
    // Tokens adjacent to parameter/field markers in error prose.
    static ref PARAM_MARKER: Regex =
        Regex::new(r#"(?i)(?:parameter|field)\s*['"]([^'"]+)['"]"#).unwrap();
    static ref MISSING_MARKER: Regex =
        Regex::new(r#"(?i)(?:missing|not\s+found)\s*['"]([^'"]+)['"]"#).unwrap();
    // Any quoted key-like token followed by a colon.
    static ref KEY_TOKEN: Regex = Regex::new(r#""([A-Za-z_][A-Za-z0-9_]*)"\s*:"#).unwrap();
}

/// Extracts probable parameter names from a response body.
pub trait CandidateExtractor: Send + Sync {
    /// `is_error` marks bodies from 4xx/5xx responses, which unlock
    /// the error-marker heuristics. Results are deduplicated in
    /// first-seen order and capped at `max`.
    fn extract(&self, body: &str, is_error: bool, max: usize) -> Vec<String>;
}

/// Regex-table extractor used by the default pipeline.
#[derive(Debug, Default, Clone)]
pub struct RegexCandidateExtractor;

impl RegexCandidateExtractor {
    pub fn new() -> Self {
        RegexCandidateExtractor
    }
}

impl CandidateExtractor for RegexCandidateExtractor {
    fn extract(&self, body: &str, is_error: bool, max: usize) -> Vec<String> {
        fn push(candidates: &mut Vec<String>, name: &str) {
            let name = name.trim();
            if !name.is_empty() && !candidates.iter().any(|c| c == name) {
                candidates.push(name.to_string());
            }
        }

        let mut candidates: Vec<String> = Vec::new();

        // Structured loc arrays: the trailing element names the field.
        for capture in LOC_ARRAY.captures_iter(body) {
            if let Some(inner) = capture.get(1) {
                if let Some(last) = QUOTED_TOKEN
                    .captures_iter(inner.as_str())
                    .last()
                    .and_then(|c| c.get(1))
                {
                    push(&mut candidates, last.as_str());
                }
            }
        }

        // Marker-adjacent tokens only make sense in error bodies.
        if is_error {
            for capture in PARAM_MARKER.captures_iter(body) {
                if let Some(name) = capture.get(1) {
                    push(&mut candidates, name.as_str());
                }
            }
            for capture in MISSING_MARKER.captures_iter(body) {
                if let Some(name) = capture.get(1) {
                    push(&mut candidates, name.as_str());
                }
            }
        }

        // Fallback: quoted keys, but only for short bodies with no
        // structured matches at all.
        if candidates.is_empty() && body.len() < FALLBACK_BODY_LIMIT {
            for capture in KEY_TOKEN.captures_iter(body) {
                if let Some(name) = capture.get(1) {
                    push(&mut candidates, name.as_str());
                }
            }
        }

        candidates.truncate(max);
        candidates
    }
}
