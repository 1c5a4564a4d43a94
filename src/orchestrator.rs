// Discovery orchestration.
//
// Runs the phase pipeline: baseline capture, differential candidate
// generation, location resolution, framework detection, scoring, and
// endpoint classification. Only a failed baseline capture aborts a
// run; every other phase degrades and the run continues.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::classifier::EndpointClassifier;
use crate::errors::DiscoveryError;
use crate::fingerprint::fingerprint_response;
use crate::framework::{FrameworkSignal, FrameworkSignalDetector};
use crate::models::{
    Deadline, DiscoveredParameter, DiscoveryMeta, DiscoveryRequest, DiscoveryResult,
    ParameterLocation,
};
use crate::probes::differential::{DifferentialEngine, ParameterCandidate};
use crate::probes::extractor::{CandidateExtractor, RegexCandidateExtractor};
use crate::probes::location::{LocationResolver, LocationResult};
use crate::probes::strategies::{default_strategies, ProbeStrategy};
use crate::scoring::WeightedConfidenceScorer;
use crate::transport::{Payload, TransportClient};

const DISCOVERY_VERSION: &str = "v2";
const FALLBACK_VERSION: &str = "v1_fallback";

/// Legacy single-pass pipeline seam. Implementations take over a run
/// whose baseline capture failed.
pub trait FallbackProber: Send + Sync {
    fn probe<'a>(
        &'a self,
        request: &'a DiscoveryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DiscoveryResult, DiscoveryError>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for one full run.
    pub overall_budget: Duration,
    /// Fraction of the remaining budget granted to differential trials.
    pub differential_fraction: f64,
    /// Fraction of the remaining budget granted to location resolution.
    pub location_fraction: f64,
    /// Parameters below this confidence are dropped from the result.
    pub min_confidence: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            overall_budget: Duration::from_secs(30),
            differential_fraction: 0.5,
            location_fraction: 0.3,
            min_confidence: 0.3,
        }
    }
}

/// Drives one discovery run end to end.
pub struct Orchestrator<C: TransportClient> {
    client: C,
    strategies: Vec<Box<dyn ProbeStrategy>>,
    extractor: Box<dyn CandidateExtractor>,
    scorer: WeightedConfidenceScorer,
    classifier: EndpointClassifier,
    detector: FrameworkSignalDetector,
    config: OrchestratorConfig,
    fallback: Option<Box<dyn FallbackProber>>,
}

impl<C: TransportClient> Orchestrator<C> {
    pub fn new(client: C) -> Self {
        Orchestrator {
            client,
            strategies: default_strategies(),
            extractor: Box::new(RegexCandidateExtractor::new()),
            scorer: WeightedConfidenceScorer::new(),
            classifier: EndpointClassifier::new(),
            detector: FrameworkSignalDetector::new(),
            config: OrchestratorConfig::default(),
            fallback: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ProbeStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_fallback(mut self, fallback: Box<dyn FallbackProber>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Run discovery against one endpoint. Never panics and never
    /// returns an error: degraded runs come back as results with
    /// `meta.error` set and zero parameters.
    pub async fn discover_parameters(&self, request: &DiscoveryRequest) -> DiscoveryResult {
        let started = Instant::now();
        let deadline = Deadline::within(self.config.overall_budget);
        let mut timings: BTreeMap<String, u128> = BTreeMap::new();
        let mut partial_failures = 0u32;

        info!(method = %request.method(), url = %request.url(), "starting discovery run");

        // Phase 1: baseline capture. The only fatal phase.
        let phase_start = Instant::now();
        let baseline = match self
            .client
            .send(request, &Payload::new(), ParameterLocation::Body)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "baseline capture failed");
                if let Some(fallback) = &self.fallback {
                    match fallback.probe(request).await {
                        Ok(mut result) => {
                            result.meta.discovery_version = FALLBACK_VERSION.to_string();
                            result.meta.execution_time_ms = started.elapsed().as_millis();
                            return result;
                        }
                        Err(fallback_err) => {
                            warn!(error = %fallback_err, "fallback pipeline failed");
                        }
                    }
                }
                return self.error_result(
                    request,
                    started,
                    format!("baseline capture failed: {err}"),
                );
            }
        };
        let baseline_fp = fingerprint_response(&baseline);
        timings.insert("baseline".to_string(), phase_start.elapsed().as_millis());

        // Phase 2: differential candidate generation.
        let phase_start = Instant::now();
        let engine = DifferentialEngine::new(&self.client, &self.strategies, &*self.extractor);
        let differential_deadline = deadline.fraction(self.config.differential_fraction);
        let raw_candidates = engine
            .run_with_baseline(request, &baseline_fp, &baseline.body, &differential_deadline)
            .await;
        timings.insert("differential".to_string(), phase_start.elapsed().as_millis());
        debug!(trials = raw_candidates.len(), "differential phase complete");

        let merged = merge_candidates(&raw_candidates);

        // Phase 3: per-candidate location resolution.
        let phase_start = Instant::now();
        let resolver = LocationResolver::new(&self.client);
        let location_deadline = deadline.fraction(self.config.location_fraction);
        let mut locations: BTreeMap<String, LocationResult> = BTreeMap::new();
        for candidate in &merged {
            if location_deadline.expired() {
                partial_failures += 1;
                break;
            }
            let result = resolver
                .resolve_location(&candidate.name, None, request, &location_deadline)
                .await;
            if result.tests.is_empty() {
                partial_failures += 1;
                continue;
            }
            locations.insert(candidate.name.clone(), result);
        }
        timings.insert(
            "location_resolution".to_string(),
            phase_start.elapsed().as_millis(),
        );

        // Phase 4: framework detection from the baseline response.
        let phase_start = Instant::now();
        let framework: Option<FrameworkSignal> = if baseline.body.is_empty() {
            None
        } else {
            Some(self.detector.best_signal(
                &baseline.body,
                &baseline_fp.headers_normalized,
                baseline_fp.status,
            ))
        };
        timings.insert(
            "framework_detection".to_string(),
            phase_start.elapsed().as_millis(),
        );

        // Phase 5: confidence scoring and filtering.
        let phase_start = Instant::now();
        let mut parameters = Vec::new();
        for candidate in &merged {
            let location_result = locations.get(&candidate.name);

            let mut sources = candidate.sources.clone();
            if location_result.is_some() {
                sources.push("location_resolver".to_string());
            }
            if framework.is_some() {
                sources.push("detection_framework".to_string());
            }

            let scored = self.scorer.calculate_parameter_confidence(
                &candidate.name,
                &sources,
                framework.as_ref(),
                location_result.map(|r| r.tests.as_slice()),
            );
            if scored.confidence < self.config.min_confidence {
                debug!(parameter = %candidate.name, confidence = scored.confidence, "dropped");
                continue;
            }

            let mut evidence = serde_json::Map::new();
            for (key, value) in &scored.evidence {
                evidence.insert(key.clone(), value.clone());
            }
            for (key, value) in &candidate.evidence {
                evidence.insert(key.clone(), value.clone());
            }
            evidence.insert("supporting_diffs".to_string(), json!(candidate.diffs.len()));
            evidence.insert("sources".to_string(), json!(sources));
            if let Some(result) = location_result {
                evidence.insert("location_score".to_string(), json!(result.location_score));
                evidence.insert(
                    "location_tests".to_string(),
                    json!(result.tests.len()),
                );
            }

            parameters.push(DiscoveredParameter {
                name: candidate.name.clone(),
                location: scored.best_location,
                param_type: candidate.param_type.clone(),
                required: candidate.required.unwrap_or(false),
                nullable: candidate.nullable,
                confidence: scored.confidence,
                evidence,
            });
        }
        timings.insert("scoring".to_string(), phase_start.elapsed().as_millis());

        // Phase 6: endpoint classification.
        let phase_start = Instant::now();
        let classification = self.classifier.classify_endpoint(
            request,
            Some((&baseline_fp, &baseline.body)),
            &raw_candidates,
        );
        timings.insert(
            "classification".to_string(),
            phase_start.elapsed().as_millis(),
        );

        info!(
            parameters = parameters.len(),
            partial_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovery run complete"
        );

        DiscoveryResult {
            url: request.url().to_string(),
            method: request.method(),
            meta: DiscoveryMeta {
                total_parameters: parameters.len(),
                execution_time_ms: started.elapsed().as_millis(),
                discovery_version: DISCOVERY_VERSION.to_string(),
                partial_failures,
                error: None,
                differential_candidates: raw_candidates.len(),
                locations_resolved: locations.len(),
                framework: framework.as_ref().map(|s| s.framework),
                framework_confidence: framework.as_ref().map(|s| s.confidence),
                endpoint_type: Some(classification.endpoint_type),
                endpoint_confidence: Some(classification.confidence),
                phase_timings_ms: timings,
            },
            parameters,
        }
    }

    fn error_result(
        &self,
        request: &DiscoveryRequest,
        started: Instant,
        message: String,
    ) -> DiscoveryResult {
        let mut meta = DiscoveryMeta::empty(DISCOVERY_VERSION);
        meta.error = Some(message);
        meta.execution_time_ms = started.elapsed().as_millis();
        DiscoveryResult {
            url: request.url().to_string(),
            method: request.method(),
            parameters: Vec::new(),
            meta,
        }
    }
}

/// Candidate merged across evidenced trials.
#[derive(Debug, Clone)]
pub struct MergedCandidate {
    pub name: String,
    pub param_type: String,
    pub required: Option<bool>,
    pub nullable: bool,
    pub sources: Vec<String>,
    pub diffs: Vec<crate::fingerprint::FingerprintDiff>,
    pub evidence: BTreeMap<String, serde_json::Value>,
}

/// Merge evidenced trials per parameter name, first-seen order.
///
/// The first trial wins the type, required is true if any trial saw
/// required phrasing, and nullable means a null probe produced
/// evidence. Supporting diffs concatenate, evidence keys keep their
/// first-seen value. The merge is deterministic for a given trial
/// order.
pub fn merge_candidates(candidates: &[ParameterCandidate]) -> Vec<MergedCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: BTreeMap<String, MergedCandidate> = BTreeMap::new();

    for candidate in candidates {
        match merged.get_mut(&candidate.name) {
            None => {
                order.push(candidate.name.clone());
                merged.insert(
                    candidate.name.clone(),
                    MergedCandidate {
                        name: candidate.name.clone(),
                        param_type: candidate.param_type.clone(),
                        required: candidate.required,
                        nullable: candidate.sources.iter().any(|s| s == "probe_null_probe"),
                        sources: candidate.sources.clone(),
                        diffs: candidate.diffs.clone(),
                        evidence: candidate.evidence.clone(),
                    },
                );
            }
            Some(existing) => {
                if candidate.required == Some(true) {
                    existing.required = Some(true);
                }
                if candidate.sources.iter().any(|s| s == "probe_null_probe") {
                    existing.nullable = true;
                }
                for source in &candidate.sources {
                    if !existing.sources.contains(source) {
                        existing.sources.push(source.clone());
                    }
                }
                existing.diffs.extend(candidate.diffs.iter().cloned());
                for (key, value) in &candidate.evidence {
                    if !existing.evidence.contains_key(key) {
                        existing.evidence.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| merged.remove(&name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(name: &str, param_type: &str, source: &str) -> ParameterCandidate {
        ParameterCandidate::provisional(name, param_type, source)
    }

    #[test]
    fn test_merge_first_writer_wins_type() {
        let trials = vec![
            trial("limit", "string", "probe_string_probe"),
            trial("limit", "integer", "probe_numeric_probe"),
        ];
        let merged = merge_candidates(&trials);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].param_type, "string");
        assert_eq!(
            merged[0].sources,
            vec!["probe_string_probe".to_string(), "probe_numeric_probe".to_string()]
        );
    }

    #[test]
    fn test_merge_preserves_first_seen_order() {
        let trials = vec![
            trial("zulu", "string", "probe_string_probe"),
            trial("alpha", "string", "probe_string_probe"),
            trial("zulu", "integer", "probe_numeric_probe"),
        ];
        let merged = merge_candidates(&trials);
        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha"]);
    }

    #[test]
    fn test_merge_required_any_true() {
        let mut required_trial = trial("email", "string", "probe_string_probe");
        required_trial.required = Some(true);
        let trials = vec![trial("email", "string", "probe_boolean_probe"), required_trial];
        let merged = merge_candidates(&trials);
        assert_eq!(merged[0].required, Some(true));
    }

    #[test]
    fn test_merge_nullable_from_null_probe() {
        let trials = vec![
            trial("note", "string", "probe_string_probe"),
            trial("note", "null", "probe_null_probe"),
        ];
        let merged = merge_candidates(&trials);
        assert!(merged[0].nullable);
        assert_eq!(merged[0].param_type, "string");
    }

    #[test]
    fn test_merge_accumulates_diffs_and_evidence() {
        use crate::fingerprint::FingerprintDiff;

        fn diff(hash_changed: bool) -> FingerprintDiff {
            FingerprintDiff {
                status_changed: true,
                hash_changed,
                length_delta_percent: 0.5,
                time_delta_percent: 0.0,
                headers_added: BTreeMap::new(),
                headers_removed: BTreeMap::new(),
                headers_changed: BTreeMap::new(),
                similarity_score: 0.4,
            }
        }

        let mut first = trial("limit", "string", "probe_string_probe");
        first.diffs.push(diff(true));
        first
            .evidence
            .insert("probe_status".to_string(), json!(422));
        let mut second = trial("limit", "integer", "probe_numeric_probe");
        second.diffs.push(diff(false));
        second
            .evidence
            .insert("probe_status".to_string(), json!(500));
        second
            .evidence
            .insert("hash_changed".to_string(), json!(false));

        let merged = merge_candidates(&[first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].diffs.len(), 2);
        assert!(merged[0].diffs[0].hash_changed);
        assert!(!merged[0].diffs[1].hash_changed);
        // First-seen value wins, new keys still land.
        assert_eq!(merged[0].evidence.get("probe_status"), Some(&json!(422)));
        assert_eq!(merged[0].evidence.get("hash_changed"), Some(&json!(false)));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let trials = vec![
            trial("a", "string", "probe_string_probe"),
            trial("b", "integer", "probe_numeric_probe"),
            trial("a", "boolean", "probe_boolean_probe"),
        ];
        let first = merge_candidates(&trials);
        let second = merge_candidates(&trials);
        assert_eq!(first.len(), second.len());
        for (left, right) in first.iter().zip(second.iter()) {
            assert_eq!(left.name, right.name);
            assert_eq!(left.param_type, right.param_type);
            assert_eq!(left.sources, right.sources);
        }
    }
}
