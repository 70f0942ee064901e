//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` (a provider block or a resource config)
//! against a [`Schema`], producing one [`Diagnostic`] per problem.
//!
//! # Example
//!
//! ```
//! use cortex_provider::schema::{Schema, Attribute};
//! use cortex_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("namespace", Attribute::required_string())
//!     .with_attribute("tenant_id", Attribute::optional_string());
//!
//! let diagnostics = validate(&schema, &json!({"namespace": "team-a"}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"namespace": "team-a", "tenant_id": 7}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("tenant_id".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Attributes the schema does not declare are rejected
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        Value::Null => {
            // Treat a missing block as empty so required attributes are reported
            let empty = serde_json::Map::new();
            check_attributes(schema, &empty, &mut diagnostics);
            return diagnostics;
        },
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    check_attributes(schema, obj, &mut diagnostics);

    let mut unknown: Vec<&String> = obj
        .keys()
        .filter(|name| !schema.block.attributes.contains_key(name.as_str()))
        .collect();
    unknown.sort();
    for name in unknown {
        diagnostics.push(
            Diagnostic::error(format!("Unsupported attribute '{}'", name))
                .with_detail("This attribute is not declared in the schema")
                .with_attribute(name.as_str()),
        );
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
///
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn check_attributes(
    schema: &Schema,
    obj: &serde_json::Map<String, Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut names: Vec<&String> = schema.block.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &schema.block.attributes[name];
        validate_attribute(attr, obj.get(name), name, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Skip computed-only attributes (provider sets these)
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("address", Attribute::required_string());

        let diagnostics = validate(&schema, &json!({"address": "http://cortex:9009"}));
        assert!(diagnostics.is_empty());

        // Missing required
        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("address".to_string()));

        // Null value
        let diagnostics = validate(&schema, &json!({"address": null}));
        assert_eq!(diagnostics.len(), 1);

        // Null block
        let diagnostics = validate(&schema, &Value::Null);
        assert_eq!(diagnostics.len(), 1);

        // Wrong type
        let diagnostics = validate(&schema, &json!({"address": 9009}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_attribute() {
        let schema = Schema::v0().with_attribute("tenant_id", Attribute::optional_string());

        assert!(validate(&schema, &json!({"tenant_id": "team-a"})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"tenant_id": null})).is_empty());
        assert_eq!(validate(&schema, &json!({"tenant_id": true})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        // Even with wrong type, computed-only attrs are not checked
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_string_map() {
        let schema = Schema::v0().with_attribute("templates", Attribute::optional_string_map());

        let diagnostics = validate(
            &schema,
            &json!({"templates": {"a.tmpl": "{{ define \"a\" }}{{ end }}"}}),
        );
        assert!(diagnostics.is_empty());

        let diagnostics = validate(&schema, &json!({"templates": {"a.tmpl": 42}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("templates.a.tmpl".to_string())
        );

        let diagnostics = validate(&schema, &json!({"templates": ["a.tmpl"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].detail, Some("Expected map, got array".to_string()));
    }

    #[test]
    fn test_validate_unknown_attribute() {
        let schema = Schema::v0().with_attribute("namespace", Attribute::required_string());

        let diagnostics = validate(&schema, &json!({"namespace": "ns", "group": "g"}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("group".to_string()));
        assert!(diagnostics[0].summary.contains("Unsupported attribute"));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = Schema::v0()
            .with_attribute("namespace", Attribute::required_string())
            .with_attribute("content", Attribute::required_string())
            .with_attribute("tenant_id", Attribute::optional_string());

        let diagnostics = validate(&schema, &json!({"namespace": 1, "tenant_id": false}));
        assert_eq!(diagnostics.len(), 3);
        // reported in attribute name order
        let attrs: Vec<_> = diagnostics
            .iter()
            .map(|d| d.attribute.clone().unwrap_or_default())
            .collect();
        assert_eq!(attrs, vec!["content", "namespace", "tenant_id"]);
    }

    #[test]
    fn test_is_valid_helper() {
        let schema = Schema::v0().with_attribute("namespace", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"namespace": "ns"})));
        assert!(!is_valid(&schema, &json!({})));
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("namespace", Attribute::required_string());

        assert!(validate_result(&schema, &json!({"namespace": "ns"})).is_ok());

        let result = validate_result(&schema, &json!({}));
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("namespace", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }
}
