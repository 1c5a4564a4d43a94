// Weighted confidence scoring.
//
// Turns a parameter's evidence source tags into a single confidence
// value. Components accumulate per source-tag prefix, the raw sum is
// clamped and re-shaped toward mid-range, then small bonuses apply.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::framework::FrameworkSignal;
use crate::models::ParameterLocation;
use crate::probes::location::LocationTest;

/// Weights per evidence component. All configurable.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringWeights {
    pub status_changed: f64,
    pub hash_changed: f64,
    pub length_delta: f64,
    pub reproducibility: f64,
    pub framework_signal: f64,
    pub source_diversity: f64,
    pub location_match: f64,
    pub error_pattern_match: f64,
    pub response_similarity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            status_changed: 3.0,
            hash_changed: 3.0,
            length_delta: 2.0,
            reproducibility: 2.0,
            framework_signal: 1.0,
            source_diversity: 1.0,
            location_match: 2.0,
            error_pattern_match: 2.5,
            response_similarity: 1.5,
        }
    }
}

/// Thresholds and bonus sizes for the scorer.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringConfig {
    pub min_confidence_threshold: f64,
    pub max_confidence: f64,
    pub length_delta_significance: f64,
    pub reproducibility_bonus: f64,
    pub diversity_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            min_confidence_threshold: 0.3,
            max_confidence: 1.0,
            length_delta_significance: 0.1,
            reproducibility_bonus: 0.2,
            diversity_bonus: 0.1,
        }
    }
}

/// Accumulated weighted components, kept for inspection in results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreComponents {
    pub status_changed: f64,
    pub hash_changed: f64,
    pub length_delta: f64,
    pub reproducibility: f64,
    pub framework_signal: f64,
    pub source_diversity: f64,
    pub location_match: f64,
}

impl ScoreComponents {
    fn sum(&self) -> f64 {
        self.status_changed
            + self.hash_changed
            + self.length_delta
            + self.reproducibility
            + self.framework_signal
            + self.source_diversity
            + self.location_match
    }
}

/// Scored verdict for one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterConfidence {
    pub name: String,
    pub confidence: f64,
    pub best_location: ParameterLocation,
    pub location_confidence: f64,
    pub components: ScoreComponents,
    pub evidence: BTreeMap<String, Value>,
    pub sources: Vec<String>,
}

const PROBE_BASE_SCORE: f64 = 0.3;
const DETECTION_BASE_SCORE: f64 = 0.4;
const PROBE_TYPE_SATURATION: f64 = 5.0;

/// Weighted scorer over evidence source tags.
#[derive(Debug, Clone, Default)]
pub struct WeightedConfidenceScorer {
    weights: ScoringWeights,
    config: ScoringConfig,
}

impl WeightedConfidenceScorer {
    pub fn new() -> Self {
        WeightedConfidenceScorer::default()
    }

    pub fn with_settings(weights: ScoringWeights, config: ScoringConfig) -> Self {
        WeightedConfidenceScorer { weights, config }
    }

    /// Score one parameter from its evidence source tags plus optional
    /// framework and location evidence.
    pub fn calculate_parameter_confidence(
        &self,
        name: &str,
        evidence_sources: &[String],
        framework_signal: Option<&FrameworkSignal>,
        location_tests: Option<&[LocationTest]>,
    ) -> ParameterConfidence {
        let mut components = ScoreComponents::default();
        let mut evidence = BTreeMap::new();
        let mut sources = Vec::new();

        for source in evidence_sources {
            if source.starts_with("probe_") {
                let probe_score = self.probe_confidence(evidence_sources, framework_signal);
                if probe_score > 0.0 {
                    components.status_changed += probe_score * self.weights.status_changed;
                    components.hash_changed += probe_score * self.weights.hash_changed;
                    components.length_delta += probe_score * self.weights.length_delta;
                    components.reproducibility += probe_score * self.weights.reproducibility;
                    components.framework_signal += probe_score * self.weights.framework_signal;
                    components.source_diversity += self.weights.source_diversity;
                }
                evidence.insert(source.clone(), Value::from(probe_score));
                sources.push(source.clone());
            } else if source.starts_with("detection_") {
                let detection_score = self.detection_confidence(evidence_sources);
                if detection_score > 0.0 {
                    components.framework_signal += detection_score * self.weights.framework_signal;
                    components.source_diversity += self.weights.source_diversity;
                }
                evidence.insert(source.clone(), Value::from(detection_score));
                sources.push(source.clone());
            } else if source.starts_with("location_") {
                if let Some(tests) = location_tests {
                    let location_score = location_confidence(Some(tests));
                    if location_score > 0.0 {
                        components.location_match += location_score * self.weights.location_match;
                        components.reproducibility += location_score * self.weights.reproducibility;
                    }
                    evidence.insert(source.clone(), Value::from(location_score));
                    sources.push(source.clone());
                }
            } else if source == "differential_engine" || source == "framework_signals" {
                components.source_diversity += self.weights.source_diversity;
                evidence.insert(source.clone(), Value::from(0.5));
                sources.push(source.clone());
            }
        }

        let base_confidence = components.sum();
        let normalized = self.normalize(base_confidence);
        let confidence = self.apply_bonuses(normalized, &components, evidence_sources);

        ParameterConfidence {
            name: name.to_string(),
            confidence,
            best_location: best_location(location_tests),
            location_confidence: location_confidence(location_tests),
            components,
            evidence,
            sources,
        }
    }

    fn probe_confidence(
        &self,
        evidence_sources: &[String],
        _framework_signal: Option<&FrameworkSignal>,
    ) -> f64 {
        let mut probe_types: Vec<&str> = evidence_sources
            .iter()
            .filter_map(|s| s.strip_prefix("probe_"))
            .collect();
        probe_types.sort_unstable();
        probe_types.dedup();

        if probe_types.is_empty() {
            return 0.0;
        }
        let diversity = (probe_types.len() as f64 / PROBE_TYPE_SATURATION).min(1.0)
            * self.config.diversity_bonus;
        PROBE_BASE_SCORE + diversity
    }

    fn detection_confidence(&self, evidence_sources: &[String]) -> f64 {
        if evidence_sources.iter().any(|s| s.starts_with("detection_")) {
            DETECTION_BASE_SCORE + self.config.diversity_bonus
        } else {
            0.0
        }
    }

    /// Clamp to [min, max], then pull mass toward mid-range.
    fn normalize(&self, confidence: f64) -> f64 {
        let clamped = confidence
            .min(self.config.max_confidence)
            .max(self.config.min_confidence_threshold);
        if clamped < 0.5 {
            clamped * 1.2
        } else if clamped > 0.8 {
            clamped * 0.9
        } else {
            clamped
        }
    }

    fn apply_bonuses(
        &self,
        confidence: f64,
        components: &ScoreComponents,
        evidence_sources: &[String],
    ) -> f64 {
        let mut final_confidence = confidence;

        if components.reproducibility > 0.0 {
            final_confidence += self.config.reproducibility_bonus;
        }

        let mut unique: Vec<&String> = evidence_sources.iter().collect();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() >= 3 {
            final_confidence += self.config.diversity_bonus * 0.5;
        } else if unique.len() == 2 {
            final_confidence += self.config.diversity_bonus * 0.25;
        }

        if components.length_delta > self.config.length_delta_significance {
            final_confidence += self.config.diversity_bonus * 0.3;
        }

        final_confidence.min(self.config.max_confidence)
    }
}

/// Fraction of location tests that succeeded.
pub fn location_confidence(location_tests: Option<&[LocationTest]>) -> f64 {
    let Some(tests) = location_tests else {
        return 0.0;
    };
    if tests.is_empty() {
        return 0.0;
    }
    let successful = tests.iter().filter(|t| t.success).count();
    successful as f64 / tests.len() as f64
}

/// Majority of successful tests by location, default body.
pub fn best_location(location_tests: Option<&[LocationTest]>) -> ParameterLocation {
    let Some(tests) = location_tests else {
        return ParameterLocation::Body;
    };

    let mut counts: BTreeMap<ParameterLocation, usize> = BTreeMap::new();
    for test in tests.iter().filter(|t| t.success) {
        *counts.entry(test.location).or_default() += 1;
    }

    let mut winner = ParameterLocation::Body;
    let mut best = 0usize;
    for location in ParameterLocation::ALL {
        let count = counts.get(&location).copied().unwrap_or(0);
        if count > best {
            best = count;
            winner = location;
        }
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|s| s.to_string()).collect()
    }

    fn location_test(location: ParameterLocation, success: bool) -> LocationTest {
        LocationTest {
            location,
            score: 0.5,
            success,
            status: if success { 200 } else { 500 },
            hash_changed: false,
            length_delta_percent: 0.0,
        }
    }

    #[test]
    fn test_probe_sources_accumulate_components() {
        let scorer = WeightedConfidenceScorer::new();
        let result = scorer.calculate_parameter_confidence(
            "username",
            &sources(&["probe_string_probe", "probe_numeric_probe"]),
            None,
            None,
        );
        assert!(result.components.status_changed > 0.0);
        assert!(result.components.hash_changed > 0.0);
        assert!(result.components.reproducibility > 0.0);
        assert!(result.confidence >= 0.3 && result.confidence <= 1.0);
    }

    #[test]
    fn test_empty_sources_floor_confidence() {
        let scorer = WeightedConfidenceScorer::new();
        let result = scorer.calculate_parameter_confidence("ghost", &[], None, None);
        // Clamped to the min threshold, then amplified below 0.5.
        assert!((result.confidence - 0.3 * 1.2).abs() < 1e-9);
        assert_eq!(result.best_location, ParameterLocation::Body);
    }

    #[test]
    fn test_location_sources_require_tests() {
        let scorer = WeightedConfidenceScorer::new();
        let without_tests = scorer.calculate_parameter_confidence(
            "token",
            &sources(&["location_resolver"]),
            None,
            None,
        );
        assert_eq!(without_tests.components.location_match, 0.0);
        assert!(without_tests.sources.is_empty());

        let tests = vec![
            location_test(ParameterLocation::Query, true),
            location_test(ParameterLocation::Body, false),
        ];
        let with_tests = scorer.calculate_parameter_confidence(
            "token",
            &sources(&["location_resolver"]),
            None,
            Some(&tests),
        );
        assert!(with_tests.components.location_match > 0.0);
        assert_eq!(with_tests.best_location, ParameterLocation::Query);
        assert!((with_tests.location_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_best_location_majority_wins() {
        let tests = vec![
            location_test(ParameterLocation::Query, true),
            location_test(ParameterLocation::Query, true),
            location_test(ParameterLocation::Header, true),
        ];
        assert_eq!(best_location(Some(&tests)), ParameterLocation::Query);
        assert_eq!(best_location(None), ParameterLocation::Body);
        assert_eq!(best_location(Some(&[])), ParameterLocation::Body);
    }

    #[test]
    fn test_confidence_bounded_under_extreme_weights() {
        let weights = ScoringWeights {
            status_changed: 100.0,
            hash_changed: 100.0,
            length_delta: 100.0,
            reproducibility: 100.0,
            framework_signal: 100.0,
            source_diversity: 100.0,
            location_match: 100.0,
            error_pattern_match: 100.0,
            response_similarity: 100.0,
        };
        let scorer = WeightedConfidenceScorer::with_settings(weights, ScoringConfig::default());
        let tests = vec![location_test(ParameterLocation::Body, true)];
        let result = scorer.calculate_parameter_confidence(
            "flag",
            &sources(&[
                "probe_string_probe",
                "probe_null_probe",
                "detection_framework",
                "location_resolver",
            ]),
            None,
            Some(&tests),
        );
        assert!(result.confidence <= 1.0);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn test_reproducibility_bonus_applied() {
        let scorer = WeightedConfidenceScorer::new();
        let with_probe = scorer.calculate_parameter_confidence(
            "a",
            &sources(&["probe_string_probe"]),
            None,
            None,
        );
        let without = scorer.calculate_parameter_confidence("a", &[], None, None);
        assert!(with_probe.confidence > without.confidence);
    }
}
