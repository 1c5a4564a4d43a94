// Differential candidate generation.
//
// Sends isolated single-parameter probes and diffs each response
// against the shared baseline fingerprint. Any observable change is
// evidence that the target reads the parameter.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::fingerprint::{
    compare_fingerprints, fingerprint_response, FingerprintDiff, ResponseFingerprint,
    DEFAULT_SENSITIVITY,
};
use crate::models::{Deadline, DiscoveryRequest, ParameterLocation};
use crate::probes::extractor::CandidateExtractor;
use crate::probes::strategies::{PayloadConfig, ProbeStrategy};
use crate::transport::{Payload, TransportClient};

const REQUIRED_KEYWORDS: [&str; 7] = [
    "is required",
    "is mandatory",
    "must be provided",
    "cannot be null",
    "cannot be empty",
    "missing required",
    "field required",
];

const PROVISIONAL_CONFIDENCE: f64 = 0.7;

/// One evidenced trial. Candidates for the same name are merged later
/// by the orchestrator; location stays `Body` until resolution.
#[derive(Debug, Clone)]
pub struct ParameterCandidate {
    pub name: String,
    pub param_type: String,
    pub required: Option<bool>,
    pub location: ParameterLocation,
    pub confidence: f64,
    pub sources: Vec<String>,
    /// Diffs that evidenced this trial.
    pub diffs: Vec<FingerprintDiff>,
    pub evidence: BTreeMap<String, Value>,
}

impl ParameterCandidate {
    pub fn provisional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        ParameterCandidate {
            name: name.into(),
            param_type: param_type.into(),
            required: None,
            location: ParameterLocation::Body,
            confidence: PROVISIONAL_CONFIDENCE,
            sources: vec![source.into()],
            diffs: Vec::new(),
            evidence: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DifferentialConfig {
    pub max_candidates: usize,
    pub payloads: PayloadConfig,
    /// Length delta treated as evidence on its own.
    pub length_evidence_threshold: f64,
}

impl Default for DifferentialConfig {
    fn default() -> Self {
        DifferentialConfig {
            max_candidates: 10,
            payloads: PayloadConfig::default(),
            length_evidence_threshold: 0.10,
        }
    }
}

/// Runs candidate extraction plus probe trials against one endpoint.
pub struct DifferentialEngine<'a, C: TransportClient> {
    client: &'a C,
    strategies: &'a [Box<dyn ProbeStrategy>],
    extractor: &'a dyn CandidateExtractor,
    config: DifferentialConfig,
}

impl<'a, C: TransportClient> DifferentialEngine<'a, C> {
    pub fn new(
        client: &'a C,
        strategies: &'a [Box<dyn ProbeStrategy>],
        extractor: &'a dyn CandidateExtractor,
    ) -> Self {
        Self::with_config(client, strategies, extractor, DifferentialConfig::default())
    }

    pub fn with_config(
        client: &'a C,
        strategies: &'a [Box<dyn ProbeStrategy>],
        extractor: &'a dyn CandidateExtractor,
        config: DifferentialConfig,
    ) -> Self {
        DifferentialEngine {
            client,
            strategies,
            extractor,
            config,
        }
    }

    /// Capture a fresh baseline, then run trials against it. A failed
    /// baseline capture yields an empty result, not an error.
    pub async fn run(
        &self,
        request: &DiscoveryRequest,
        deadline: &Deadline,
    ) -> Vec<ParameterCandidate> {
        let baseline = match self
            .client
            .send(request, &Payload::new(), ParameterLocation::Body)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "baseline capture failed, skipping differential phase");
                return Vec::new();
            }
        };
        let fingerprint = fingerprint_response(&baseline);
        self.run_with_baseline(request, &fingerprint, &baseline.body, deadline)
            .await
    }

    /// Run trials against a baseline captured by the caller.
    pub async fn run_with_baseline(
        &self,
        request: &DiscoveryRequest,
        baseline: &ResponseFingerprint,
        baseline_body: &str,
        deadline: &Deadline,
    ) -> Vec<ParameterCandidate> {
        let names = self.extractor.extract(
            baseline_body,
            baseline.status >= 400,
            self.config.max_candidates,
        );
        debug!(count = names.len(), "extracted candidate names");

        // An error baseline that names candidates with required phrasing
        // already tells us they are required; trial responses with the
        // value supplied usually stop mentioning it.
        let baseline_required = if baseline.status >= 400 {
            infer_required(baseline_body)
        } else {
            None
        };

        let mut evidenced = Vec::new();
        'trials: for name in &names {
            for strategy in self.strategies {
                for value in strategy.generate_payloads(&self.config.payloads) {
                    if deadline.expired() {
                        debug!("deadline reached, stopping differential trials");
                        break 'trials;
                    }

                    let mut payload = Payload::new();
                    payload.insert(name.clone(), value);
                    let response = match self
                        .client
                        .send(request, &payload, ParameterLocation::Body)
                        .await
                    {
                        Ok(response) => response,
                        Err(err) => {
                            debug!(parameter = %name, error = %err, "trial send failed, skipped");
                            continue;
                        }
                    };

                    let fingerprint = fingerprint_response(&response);
                    let diff = compare_fingerprints(baseline, &fingerprint, DEFAULT_SENSITIVITY);
                    let has_evidence = diff.hash_changed
                        || diff.status_changed
                        || diff.length_delta_percent > self.config.length_evidence_threshold;
                    if !has_evidence {
                        continue;
                    }

                    let mut candidate = ParameterCandidate::provisional(
                        name.clone(),
                        strategy.primary_target_type(),
                        format!("probe_{}", strategy.strategy_name()),
                    );
                    candidate.required = infer_required(&response.body).or(baseline_required);
                    candidate
                        .evidence
                        .insert("baseline_status".to_string(), json!(baseline.status));
                    candidate
                        .evidence
                        .insert("probe_status".to_string(), json!(fingerprint.status));
                    candidate
                        .evidence
                        .insert("status_changed".to_string(), json!(diff.status_changed));
                    candidate
                        .evidence
                        .insert("hash_changed".to_string(), json!(diff.hash_changed));
                    candidate.evidence.insert(
                        "length_delta_percent".to_string(),
                        json!(diff.length_delta_percent),
                    );
                    candidate.diffs.push(diff);
                    evidenced.push(candidate);
                }
            }
        }
        evidenced
    }
}

/// Scan response text for required-suggestive phrasing.
pub fn infer_required(body: &str) -> Option<bool> {
    let lowered = body.to_lowercase();
    if REQUIRED_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        Some(true)
    } else {
        None
    }
}

/// Single-parameter payload helper used by trials and tests.
pub fn single_parameter_payload(name: &str, value: serde_json::Value) -> Payload {
    let mut payload = Map::new();
    payload.insert(name.to_string(), value);
    payload
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fingerprint::create_fingerprint;
    use crate::models::Method;
    use crate::probes::extractor::RegexCandidateExtractor;
    use crate::probes::strategies::default_strategies;
    use crate::transport::RawResponse;

    /// Returns the same canned response for every send.
    struct FixedClient {
        status: u16,
        body: String,
    }

    impl TransportClient for FixedClient {
        async fn send(
            &self,
            _request: &DiscoveryRequest,
            _payload: &Payload,
            _location: ParameterLocation,
        ) -> Result<RawResponse, crate::errors::TransportError> {
            Ok(RawResponse {
                status: self.status,
                body: self.body.clone(),
                headers: BTreeMap::new(),
                elapsed_ms: 1.0,
            })
        }
    }

    #[test]
    fn test_infer_required_matches_phrases() {
        assert_eq!(infer_required("the field required check"), Some(true));
        assert_eq!(infer_required("username IS REQUIRED"), Some(true));
        assert_eq!(infer_required("value cannot be null"), Some(true));
        assert_eq!(infer_required("all good"), None);
    }

    #[test]
    fn test_provisional_candidate_defaults() {
        let candidate = ParameterCandidate::provisional("user", "string", "probe_string_probe");
        assert_eq!(candidate.location, ParameterLocation::Body);
        assert_eq!(candidate.required, None);
        assert!((candidate.confidence - 0.7).abs() < 1e-9);
        assert_eq!(candidate.sources, vec!["probe_string_probe".to_string()]);
        assert!(candidate.diffs.is_empty());
        assert!(candidate.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_required_seeded_from_error_baseline() {
        let baseline_body = concat!(
            r#"{"detail":[{"loc":["body","username"],"msg":"field required","#,
            r#""type":"value_error.missing"}]}"#
        );
        let baseline = create_fingerprint(422, baseline_body, &BTreeMap::new(), 5.0);
        let client = FixedClient {
            status: 200,
            body: r#"{"status":"ok"}"#.to_string(),
        };
        let strategies = default_strategies();
        let extractor = RegexCandidateExtractor::new();
        let engine = DifferentialEngine::new(&client, &strategies, &extractor);
        let request =
            DiscoveryRequest::new("http://127.0.0.1:9/probe", Method::POST).unwrap();
        let deadline = Deadline::within(Duration::from_secs(5));

        let candidates = engine
            .run_with_baseline(&request, &baseline, baseline_body, &deadline)
            .await;

        let username: Vec<&ParameterCandidate> = candidates
            .iter()
            .filter(|c| c.name == "username")
            .collect();
        assert!(!username.is_empty());
        for candidate in username {
            // Success bodies carry no required phrasing; the 422
            // baseline that named the candidate does.
            assert_eq!(candidate.required, Some(true));
            assert_eq!(candidate.diffs.len(), 1);
            assert!(candidate.diffs[0].status_changed);
            assert_eq!(
                candidate.evidence.get("baseline_status"),
                Some(&serde_json::json!(422))
            );
            assert_eq!(
                candidate.evidence.get("status_changed"),
                Some(&serde_json::json!(true))
            );
        }
    }

    #[test]
    fn test_single_parameter_payload_shape() {
        let payload = single_parameter_payload("limit", serde_json::json!(10));
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.get("limit"), Some(&serde_json::json!(10)));
    }
}
