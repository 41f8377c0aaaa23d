//! Structural validation of suite documents and resolved configuration
//!
//! Both formats are described by JSON Schemas embedded in the binary and
//! compiled on first use. Every violation is reported, not just the first.

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use once_cell::sync::Lazy;
use serde_json::Value;
use specline_common::document::{SuiteDocument, TargetConfiguration};

static SUITE_SCHEMA: Lazy<Result<Validator, String>> =
    Lazy::new(|| compile_embedded(include_str!("../schema/suite.json")));

static TARGET_SCHEMA: Lazy<Result<Validator, String>> =
    Lazy::new(|| compile_embedded(include_str!("../schema/target.json")));

/// Schemas a document can be checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// A whole suite document
    Suite,
    /// `{scheme, host, port, base_path, read_timeout}` after resolution
    TargetConfiguration,
}

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub property: String,
    pub message: String,
}

impl Violation {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

/// Validates documents; an empty list means valid
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Value, schema: Schema) -> Vec<Violation>;
}

/// Render violations one per line
pub fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  property - {}, message: {} \n", v.property, v.message))
        .collect()
}

/// Validator backed by the embedded suite and target schemas
#[derive(Debug, Clone, Default)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value, schema: Schema) -> Vec<Violation> {
        match schema {
            Schema::Suite => {
                check_embedded(&SUITE_SCHEMA, document, |doc| {
                    serde_json::from_value::<SuiteDocument>(doc.clone()).err()
                })
            }
            Schema::TargetConfiguration => {
                check_embedded(&TARGET_SCHEMA, document, |doc| {
                    serde_json::from_value::<TargetConfiguration>(doc.clone()).err()
                })
            }
        }
    }
}

/// Check `instance` against a user supplied schema
///
/// The draft is picked from the schema's `$schema` keyword. An `Err` means
/// the schema itself could not be compiled.
pub fn validate_instance(schema: &Value, instance: &Value) -> Result<Vec<Violation>, String> {
    let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
    Ok(collect(&validator, instance))
}

fn compile_embedded(source: &str) -> Result<Validator, String> {
    let schema: Value = serde_json::from_str(source).map_err(|e| e.to_string())?;
    jsonschema::draft202012::new(&schema).map_err(|e| e.to_string())
}

fn check_embedded(
    compiled: &Result<Validator, String>,
    document: &Value,
    decode: impl Fn(&Value) -> Option<serde_json::Error>,
) -> Vec<Violation> {
    let validator = match compiled {
        Ok(validator) => validator,
        Err(e) => return vec![Violation::new("schema", e.clone())],
    };

    let mut out = collect(validator, document);
    // Anything the schema allows but the typed model rejects
    if out.is_empty() {
        if let Some(e) = decode(document) {
            out.push(Violation::new("instance", e.to_string()));
        }
    }
    out
}

fn collect(validator: &Validator, instance: &Value) -> Vec<Violation> {
    validator
        .iter_errors(instance)
        .map(|error| {
            let mut property = property_path(&error.instance_path.to_string());
            if let ValidationErrorKind::Required { property: missing } = &error.kind {
                if let Some(name) = missing.as_str() {
                    property.push('.');
                    property.push_str(name);
                }
            }
            Violation::new(property, error.to_string())
        })
        .collect()
}

/// `/specs/0/request/method` becomes `instance.specs[0].request.method`
fn property_path(pointer: &str) -> String {
    let mut out = String::from("instance");
    for segment in pointer.split('/').skip(1) {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push('[');
            out.push_str(&segment);
            out.push(']');
        } else {
            out.push('.');
            out.push_str(&segment);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn properties(doc: &Value, schema: Schema) -> Vec<String> {
        let mut props: Vec<_> = JsonSchemaValidator
            .validate(doc, schema)
            .into_iter()
            .map(|v| v.property)
            .collect();
        props.sort();
        props
    }

    #[test]
    fn test_valid_suite() {
        let doc = json!({
            "meta": { "name": "users" },
            "configuration": { "scheme": "http", "host": "localhost" },
            "hooks": { "before_each": { "run_type": "inline", "inline": { "function": "noop" } } },
            "specs": [{
                "name": "list",
                "request": {
                    "path": "/users",
                    "method": "get",
                    "cookies": [{ "name": "session", "value": "abc" }],
                    "payload": { "form": [{ "name": "q", "value": 1 }] }
                },
                "response": {
                    "status_code": 200,
                    "json_schema": { "type": "inline", "$ref": "{\"type\": \"object\"}" }
                }
            }]
        });
        assert!(JsonSchemaValidator.validate(&doc, Schema::Suite).is_empty());
    }

    #[test]
    fn test_violations_across_specs_are_all_listed() {
        let doc = json!({
            "meta": { "name": "users" },
            "configuration": {},
            "specs": [
                { "name": "a", "request": { "path": "/", "method": "fetch" } },
                { "name": "b", "request": { "path": "/" }, "response": { "status_code": "abc" } }
            ]
        });
        assert_eq!(
            properties(&doc, Schema::Suite),
            vec![
                "instance.specs[0].request.method",
                "instance.specs[1].response.status_code",
            ]
        );
    }

    #[test]
    fn test_missing_name_and_bad_method_are_both_listed() {
        let doc = json!({
            "meta": {},
            "configuration": {},
            "specs": [{ "name": "a", "request": { "path": "/", "method": "fetch" } }]
        });
        assert_eq!(
            properties(&doc, Schema::Suite),
            vec!["instance.meta.name", "instance.specs[0].request.method"]
        );
    }

    #[test]
    fn test_missing_sections() {
        let doc = json!({ "specs": [{ "request": {} }] });
        assert_eq!(
            properties(&doc, Schema::Suite),
            vec![
                "instance.configuration",
                "instance.meta",
                "instance.specs[0].name",
                "instance.specs[0].request.path",
            ]
        );
    }

    #[test]
    fn test_payload_allows_one_body_kind() {
        let doc = json!({
            "meta": { "name": "users" },
            "configuration": {},
            "specs": [{
                "name": "a",
                "request": {
                    "path": "/",
                    "payload": {
                        "body": { "type": "text", "content": "x" },
                        "form": [{ "name": "a", "value": "b" }]
                    }
                }
            }]
        });
        assert_eq!(
            properties(&doc, Schema::Suite),
            vec!["instance.specs[0].request.payload"]
        );
    }

    #[test_case(json!({"scheme": "http", "host": "h", "base_path": "", "read_timeout": 60000}), &[]; "valid")]
    #[test_case(json!({"scheme": "ftp", "host": "h", "base_path": "", "read_timeout": 60000}), &["instance.scheme"]; "scheme")]
    #[test_case(json!({"scheme": "http", "base_path": "", "read_timeout": 60000}), &["instance.host"]; "missing host")]
    #[test_case(json!({"scheme": "http", "host": "h", "port": 70000, "base_path": "", "read_timeout": 0}), &["instance.port", "instance.read_timeout"]; "ranges")]
    #[test_case(json!({"scheme": "https", "host": "h", "port": 443, "base_path": "/v1", "read_timeout": 5}), &[]; "with port")]
    fn test_target_schema(doc: Value, expected: &[&str]) {
        assert_eq!(properties(&doc, Schema::TargetConfiguration), expected);
    }

    #[test]
    fn test_user_schema() {
        let schema = json!({
            "type": "object",
            "required": ["id"],
            "properties": { "id": { "type": "integer" }, "tags": { "type": "array" } }
        });
        let violations = validate_instance(&schema, &json!({ "tags": "x" })).unwrap();
        let props: Vec<_> = violations.iter().map(|v| v.property.as_str()).collect();
        assert_eq!(props.len(), 2);
        assert!(props.contains(&"instance.id"));
        assert!(props.contains(&"instance.tags"));

        assert!(validate_instance(&schema, &json!({ "id": 1 })).unwrap().is_empty());
        assert!(validate_instance(&json!({ "type": 12 }), &json!({})).is_err());
    }

    #[test_case("", "instance")]
    #[test_case("/meta/name", "instance.meta.name")]
    #[test_case("/specs/10/request/a~1b", "instance.specs[10].request.a/b")]
    fn test_property_path(pointer: &str, expected: &str) {
        assert_eq!(property_path(pointer), expected);
    }

    #[test]
    fn test_format_violations() {
        let text = format_violations(&[Violation::new("instance.host", "is required")]);
        assert_eq!(text, "  property - instance.host, message: is required \n");
    }
}
