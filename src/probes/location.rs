// Location resolution.
//
// Tries each parameter location in a fixed order and scores how the
// target reacts, diffing against a synthetic empty baseline so the
// scores stay comparable across locations.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::fingerprint::{
    compare_fingerprints, create_fingerprint, fingerprint_response, ResponseFingerprint,
    DEFAULT_SENSITIVITY,
};
use crate::models::{Deadline, DiscoveryRequest, ParameterLocation};
use crate::probes::differential::single_parameter_payload;
use crate::transport::TransportClient;

const LENGTH_SCORE_THRESHOLD: f64 = 0.05;
const DEFAULT_TEST_VALUE: &str = "test_value";

/// Outcome of probing one location.
#[derive(Debug, Clone, Serialize)]
pub struct LocationTest {
    pub location: ParameterLocation,
    pub score: f64,
    pub success: bool,
    pub status: u16,
    pub hash_changed: bool,
    pub length_delta_percent: f64,
}

/// Resolution verdict for one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct LocationResult {
    pub parameter_name: String,
    pub best_location: ParameterLocation,
    pub location_score: f64,
    pub tests: Vec<LocationTest>,
}

/// Neutral reference point: a successful, empty response. Diffing a
/// real probe response against this isolates what the probe itself
/// caused.
pub fn synthetic_baseline() -> ResponseFingerprint {
    create_fingerprint(200, "", &BTreeMap::new(), 0.0)
}

/// Probes body, query, form, and header placement for one parameter.
pub struct LocationResolver<'a, C: TransportClient> {
    client: &'a C,
}

impl<'a, C: TransportClient> LocationResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        LocationResolver { client }
    }

    /// Test every location in fixed order. Errored sends are discarded
    /// entirely rather than scored as failures; if nothing succeeds the
    /// verdict defaults to body.
    pub async fn resolve_location(
        &self,
        name: &str,
        value: Option<&Value>,
        request: &DiscoveryRequest,
        deadline: &Deadline,
    ) -> LocationResult {
        let baseline = synthetic_baseline();
        let test_value = value
            .cloned()
            .unwrap_or_else(|| Value::String(DEFAULT_TEST_VALUE.to_string()));

        let mut tests = Vec::new();
        for location in ParameterLocation::ALL {
            if deadline.expired() {
                debug!(parameter = name, "deadline reached during location resolution");
                break;
            }

            let payload = single_parameter_payload(name, test_value.clone());
            let response = match self.client.send(request, &payload, location).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(parameter = name, %location, error = %err, "location test discarded");
                    continue;
                }
            };

            let fingerprint = fingerprint_response(&response);
            let diff = compare_fingerprints(&baseline, &fingerprint, DEFAULT_SENSITIVITY);

            let mut score = 0.0;
            if !diff.status_changed {
                score += 0.5;
            }
            if diff.hash_changed {
                score += 0.3;
            }
            if diff.length_delta_percent > LENGTH_SCORE_THRESHOLD {
                score += 0.2;
            }

            tests.push(LocationTest {
                location,
                score,
                success: response.status == 200,
                status: response.status,
                hash_changed: diff.hash_changed,
                length_delta_percent: diff.length_delta_percent,
            });
        }

        let (best_location, location_score) = pick_best(&tests);
        LocationResult {
            parameter_name: name.to_string(),
            best_location,
            location_score,
            tests,
        }
    }
}

/// Best location = highest-scoring successful test, first wins on
/// ties; its score is normalized by the successful-test count.
fn pick_best(tests: &[LocationTest]) -> (ParameterLocation, f64) {
    let successful: Vec<&LocationTest> = tests.iter().filter(|t| t.success).collect();
    if successful.is_empty() {
        return (ParameterLocation::Body, 0.0);
    }

    let mut best = successful[0];
    for test in &successful[1..] {
        if test.score > best.score {
            best = test;
        }
    }
    (best.location, best.score / successful.len() as f64)
}
