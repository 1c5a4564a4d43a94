// Payload generation strategies.
//
// Each strategy produces candidate values for one parameter type
// family. Strategies know nothing about transport; the differential
// engine wraps values into single-parameter payloads and sends them.

use serde_json::{json, Value};

/// Bounds for payload generation.
#[derive(Debug, Clone)]
pub struct PayloadConfig {
    pub min_value_length: usize,
    pub max_value_length: usize,
    pub max_payloads_per_parameter: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        PayloadConfig {
            min_value_length: 1,
            max_value_length: 1000,
            max_payloads_per_parameter: 10,
        }
    }
}

/// One family of probe values.
pub trait ProbeStrategy: Send + Sync {
    /// Values to try for a single parameter, capped at
    /// `config.max_payloads_per_parameter`.
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value>;

    fn strategy_name(&self) -> &'static str;

    /// Parameter types this strategy targets; the first entry is the
    /// type recorded on evidenced candidates.
    fn target_types(&self) -> &'static [&'static str];

    fn primary_target_type(&self) -> &'static str {
        self.target_types().first().copied().unwrap_or("string")
    }
}

fn capped(mut values: Vec<Value>, config: &PayloadConfig) -> Vec<Value> {
    values.truncate(config.max_payloads_per_parameter);
    values
}

/// Plain, empty, and boundary-length strings.
pub struct StringProbe;

impl ProbeStrategy for StringProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![
                json!("test"),
                json!("valid_string"),
                json!("sample"),
                json!("example"),
                json!(""),
                json!("null"),
                json!("undefined"),
                json!("a".repeat(config.min_value_length)),
                json!("a".repeat(config.max_value_length.min(255))),
                json!("test'value\"<>"),
            ],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "string_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["string", "text"]
    }
}

/// Integers, floats, and numeric edge values.
pub struct NumericProbe;

impl ProbeStrategy for NumericProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![
                json!(0),
                json!(1),
                json!(-1),
                json!(42),
                json!(3.14),
                json!(i32::MAX),
                json!(i32::MIN),
                json!(i64::MAX),
                json!(1e-10),
                json!("999999999"),
            ],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "numeric_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["integer", "number", "float", "decimal"]
    }
}

/// True/false plus common truthy/falsy string spellings.
pub struct BooleanProbe;

impl ProbeStrategy for BooleanProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![
                json!(true),
                json!(false),
                json!("true"),
                json!("false"),
                json!("1"),
                json!("0"),
                json!("yes"),
                json!("no"),
                json!("on"),
                json!("off"),
            ],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "boolean_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["boolean", "bool"]
    }
}

/// Empty, homogeneous, mixed, and nested arrays.
pub struct ArrayProbe;

impl ProbeStrategy for ArrayProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![
                json!([]),
                json!([""]),
                json!(["item"]),
                json!([1]),
                json!([1, 2, 3]),
                json!(["item1", "item2", "item3"]),
                json!([true, false, null]),
                json!([{"nested": "value"}]),
            ],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "array_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["array", "list"]
    }
}

/// Empty, flat, and nested objects.
pub struct ObjectProbe;

impl ProbeStrategy for ObjectProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![
                json!({}),
                json!({"key": "value"}),
                json!({"id": 1}),
                json!({"nested": {"key": "value"}}),
                json!({"items": [1, 2, 3]}),
                json!({"enabled": true}),
            ],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "object_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["object", "map"]
    }
}

/// Values at and past common validation limits.
pub struct BoundaryProbe;

impl ProbeStrategy for BoundaryProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![
                json!("a".repeat(config.max_value_length)),
                json!("a".repeat(config.max_value_length + 1)),
                json!(""),
                json!(i64::MAX),
                json!(i64::MIN),
                json!(f64::MAX),
                json!(-1),
                json!(0),
            ],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "boundary_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["string", "integer", "number"]
    }
}

/// Explicit null and null-like spellings, used to infer nullability.
pub struct NullProbe;

impl ProbeStrategy for NullProbe {
    fn generate_payloads(&self, config: &PayloadConfig) -> Vec<Value> {
        capped(
            vec![json!(null), json!("null"), json!("nil"), json!("")],
            config,
        )
    }

    fn strategy_name(&self) -> &'static str {
        "null_probe"
    }

    fn target_types(&self) -> &'static [&'static str] {
        &["null", "nullable"]
    }
}

/// Core strategies used by every run.
pub fn default_strategies() -> Vec<Box<dyn ProbeStrategy>> {
    vec![
        Box::new(StringProbe),
        Box::new(NumericProbe),
        Box::new(BooleanProbe),
    ]
}

/// Full strategy set, including structural and null probes.
pub fn all_strategies() -> Vec<Box<dyn ProbeStrategy>> {
    vec![
        Box::new(StringProbe),
        Box::new(NumericProbe),
        Box::new(BooleanProbe),
        Box::new(ArrayProbe),
        Box::new(ObjectProbe),
        Box::new(BoundaryProbe),
        Box::new(NullProbe),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_cap_respected() {
        let config = PayloadConfig {
            max_payloads_per_parameter: 3,
            ..PayloadConfig::default()
        };
        for strategy in all_strategies() {
            assert!(
                strategy.generate_payloads(&config).len() <= 3,
                "{} exceeded cap",
                strategy.strategy_name()
            );
        }
    }

    #[test]
    fn test_every_strategy_yields_payloads() {
        let config = PayloadConfig::default();
        for strategy in all_strategies() {
            assert!(!strategy.generate_payloads(&config).is_empty());
            assert!(!strategy.target_types().is_empty());
        }
    }

    #[test]
    fn test_primary_target_type_is_first() {
        assert_eq!(StringProbe.primary_target_type(), "string");
        assert_eq!(NumericProbe.primary_target_type(), "integer");
        assert_eq!(NullProbe.primary_target_type(), "null");
    }

    #[test]
    fn test_null_probe_includes_json_null() {
        let payloads = NullProbe.generate_payloads(&PayloadConfig::default());
        assert!(payloads.contains(&Value::Null));
    }
}
