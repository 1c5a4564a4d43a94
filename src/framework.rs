// Framework signal detection.
//
// Matches response bodies and headers against per-framework signature
// tables to guess the backend stack, which in turn steers strategy
// selection and endpoint classification.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Backend frameworks the detector can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkType {
    NodeExpress,
    NodeNest,
    PythonFlask,
    PythonFastapi,
    PythonDjangoRest,
    JavaSpring,
    JavaSpringBoot,
    RubyRails,
    PhpLaravel,
    PhpWordpress,
    AspnetCore,
    DotnetCore,
}

impl FrameworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameworkType::NodeExpress => "node_express",
            FrameworkType::NodeNest => "node_nest",
            FrameworkType::PythonFlask => "python_flask",
            FrameworkType::PythonFastapi => "python_fastapi",
            FrameworkType::PythonDjangoRest => "python_django_rest",
            FrameworkType::JavaSpring => "java_spring",
            FrameworkType::JavaSpringBoot => "java_spring_boot",
            FrameworkType::RubyRails => "ruby_rails",
            FrameworkType::PhpLaravel => "php_laravel",
            FrameworkType::PhpWordpress => "php_wordpress",
            FrameworkType::AspnetCore => "aspnet_core",
            FrameworkType::DotnetCore => "dotnet_core",
        }
    }
}

impl std::fmt::Display for FrameworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detection outcome: the framework, how sure we are, and which
/// signature strings fired.
#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSignal {
    pub framework: FrameworkType,
    pub confidence: f64,
    pub matched_patterns: Vec<String>,
}

const POINTS_PER_PATTERN: f64 = 0.5;
const CONFIDENCE_DIVISOR: f64 = 2.0;
const DEFAULT_CONFIDENCE: f64 = 0.1;

lazy_static! {
    static ref FRAMEWORK_SIGNATURES: Vec<(FrameworkType, Vec<Regex>)> = vec![
        (
            FrameworkType::PythonFastapi,
            compile(&[
                r"(?i)fastapi",
                r#"(?i)"detail"\s*:\s*\["#,
                r#"(?i)"loc"\s*:\s*\["#,
                r"(?i)field required",
                r"(?i)value_error\.missing",
                r"(?i)pydantic",
                r"(?i)unprocessable entity",
            ]),
        ),
        (
            FrameworkType::PythonFlask,
            compile(&[
                r"(?i)werkzeug",
                r"(?i)flask",
                r"(?i)the browser \(or proxy\) sent a request",
                r"(?i)jinja2",
            ]),
        ),
        (
            FrameworkType::PythonDjangoRest,
            compile(&[
                r#"(?i)"detail"\s*:\s*""#,
                r"(?i)django",
                r"(?i)this field is required",
                r"(?i)csrftoken",
                r"(?i)rest_framework",
            ]),
        ),
        (
            FrameworkType::NodeExpress,
            compile(&[
                r"(?i)express",
                r"(?i)cannot (?:get|post|put|delete|patch) /",
                r"(?i)x-powered-by.*express",
                r"(?i)connect\.sid",
            ]),
        ),
        (
            FrameworkType::NodeNest,
            compile(&[
                r"(?i)nestjs",
                r#"(?i)"statusCode"\s*:\s*\d+\s*,\s*"message""#,
                r#"(?i)"error"\s*:\s*"Unprocessable Entity""#,
                r"(?i)class-validator",
            ]),
        ),
        (
            FrameworkType::JavaSpringBoot,
            compile(&[
                r"(?i)spring boot",
                r#"(?i)"timestamp"\s*:\s*".*"\s*,\s*"status""#,
                r"(?i)whitelabel error page",
                r"(?i)org\.springframework\.boot",
            ]),
        ),
        (
            FrameworkType::JavaSpring,
            compile(&[
                r"(?i)org\.springframework",
                r"(?i)jsessionid",
                r"(?i)methodargumentnotvalidexception",
                r"(?i)dispatcherservlet",
            ]),
        ),
        (
            FrameworkType::RubyRails,
            compile(&[
                r"(?i)ruby on rails",
                r"(?i)actioncontroller",
                r"(?i)activerecord",
                r"(?i)_rails_session",
                r"(?i)phusion passenger",
            ]),
        ),
        (
            FrameworkType::PhpLaravel,
            compile(&[
                r"(?i)laravel",
                r"(?i)laravel_session",
                r"(?i)xsrf-token",
                r#"(?i)"message"\s*:\s*"The given data was invalid""#,
                r"(?i)illuminate\\",
            ]),
        ),
        (
            FrameworkType::PhpWordpress,
            compile(&[
                r"(?i)wp-json",
                r"(?i)wordpress",
                r"(?i)rest_missing_callback_param",
                r"(?i)wp_error",
            ]),
        ),
        (
            FrameworkType::AspnetCore,
            compile(&[
                r"(?i)asp\.net core",
                r"(?i)kestrel",
                r#"(?i)"traceId"\s*:"#,
                r"(?i)x-aspnet-version",
                r"(?i)microsoft\.aspnetcore",
            ]),
        ),
        (
            FrameworkType::DotnetCore,
            compile(&[
                r"(?i)\.net core",
                r"(?i)system\.text\.json",
                r"(?i)x-powered-by.*asp\.net",
                r"(?i)iis/\d",
            ]),
        ),
    ];
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("bad framework pattern {p}: {e}")))
        .collect()
}

/// Detects backend frameworks from response bodies and headers.
#[derive(Debug, Default, Clone)]
pub struct FrameworkSignalDetector;

impl FrameworkSignalDetector {
    pub fn new() -> Self {
        FrameworkSignalDetector
    }

    /// Score every known framework against one response. Signals are
    /// returned sorted by confidence, strongest first. When nothing
    /// matches at all, a single low-confidence FastAPI guess comes
    /// back so downstream consumers always have a hint to work with.
    pub fn detect_signals(
        &self,
        body: &str,
        headers: &BTreeMap<String, String>,
        _status: u16,
    ) -> Vec<FrameworkSignal> {
        let header_blob: String = headers
            .iter()
            .map(|(k, v)| format!("{k}: {v}\n"))
            .collect();

        let mut signals = Vec::new();
        for (framework, patterns) in FRAMEWORK_SIGNATURES.iter() {
            let mut matched = Vec::new();
            for pattern in patterns {
                if pattern.is_match(body) || pattern.is_match(&header_blob) {
                    matched.push(pattern.as_str().to_string());
                }
            }
            if matched.is_empty() {
                continue;
            }
            let score = matched.len() as f64 * POINTS_PER_PATTERN;
            signals.push(FrameworkSignal {
                framework: *framework,
                confidence: (score / CONFIDENCE_DIVISOR).min(1.0),
                matched_patterns: matched,
            });
        }

        if signals.is_empty() {
            return vec![FrameworkSignal {
                framework: FrameworkType::PythonFastapi,
                confidence: DEFAULT_CONFIDENCE,
                matched_patterns: Vec::new(),
            }];
        }

        signals.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        signals
    }

    /// Best single guess for one response.
    pub fn best_signal(
        &self,
        body: &str,
        headers: &BTreeMap<String, String>,
        status: u16,
    ) -> FrameworkSignal {
        self.detect_signals(body, headers, status)
            .into_iter()
            .next()
            .unwrap_or(FrameworkSignal {
                framework: FrameworkType::PythonFastapi,
                confidence: DEFAULT_CONFIDENCE,
                matched_patterns: Vec::new(),
            })
    }
}

/// Strategy names that tend to pay off against a given framework.
pub fn framework_specific_strategies(framework: FrameworkType) -> &'static [&'static str] {
    match framework {
        FrameworkType::PythonFastapi => &["null_probe", "string_probe", "numeric_probe"],
        FrameworkType::PythonFlask | FrameworkType::PythonDjangoRest => {
            &["string_probe", "numeric_probe", "boolean_probe"]
        }
        FrameworkType::NodeExpress | FrameworkType::NodeNest => {
            &["string_probe", "object_probe", "null_probe"]
        }
        FrameworkType::JavaSpring | FrameworkType::JavaSpringBoot => {
            &["string_probe", "numeric_probe", "boundary_probe"]
        }
        FrameworkType::RubyRails => &["string_probe", "array_probe"],
        FrameworkType::PhpLaravel | FrameworkType::PhpWordpress => {
            &["string_probe", "numeric_probe"]
        }
        FrameworkType::AspnetCore | FrameworkType::DotnetCore => {
            &["string_probe", "numeric_probe", "null_probe"]
        }
    }
}
