//! Schema validation helpers.
//!
//! Checks a `serde_json::Value` attribute tree against a [`Schema`] before any
//! translation happens, so type and shape problems come back as diagnostics
//! pointing at the offending attribute.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_launchpad::schema::{Attribute, Schema};
//! use hemmer_provider_launchpad::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("port", Attribute::int64_with_default(22));
//!
//! let diagnostics = validate(&schema, &json!({"name": "test", "port": 22}));
//! assert!(diagnostics.is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "test", "port": "22"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("port".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns one diagnostic per problem; an empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    // Sorted so diagnostics come back in a stable order.
    let mut attrs: Vec<_> = block.attributes.iter().collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (name, attr) in attrs {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    let mut blocks: Vec<_> = block.blocks.iter().collect();
    blocks.sort_by(|a, b| a.0.cmp(b.0));
    for (name, nested) in blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
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
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required block '{}'", path))
                        .with_detail(format!(
                            "At least {} block(s) required",
                            nested.min_items
                        ))
                        .with_attribute(path),
                );
            }
        },
        (BlockNestingMode::Single, Some(v)) => validate_block(&nested.block, v, path, diagnostics),
        (BlockNestingMode::List, Some(Value::Array(arr))) => {
            let len = arr.len() as u32;

            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }

            // max_items of 0 means unlimited
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }

            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        (BlockNestingMode::List, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
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

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() => true,
        // Hosts sometimes encode whole numbers as floats.
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn ssh_schema() -> Schema {
        Schema::v0().with_block(
            "host",
            NestedBlock::list(
                Block::new()
                    .with_attribute("role", Attribute::required_string())
                    .with_block(
                        "ssh",
                        NestedBlock::list(
                            Block::new()
                                .with_attribute("address", Attribute::required_string())
                                .with_attribute("port", Attribute::int64_with_default(22)),
                        )
                        .with_max_items(1),
                    ),
            )
            .with_min_items(1),
        )
    }

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "test"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        assert_eq!(validate(&schema, &json!({"name": null})).len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_defaulted_attribute_may_be_absent() {
        let schema = Schema::v0().with_attribute("prune", Attribute::bool_with_default(false));

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"prune": null})).is_empty());
        assert!(validate(&schema, &json!({"prune": true})).is_empty());
        assert_eq!(validate(&schema, &json!({"prune": "yes"})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("port", Attribute::int64_with_default(22));

        assert!(validate(&schema, &json!({"port": 2222})).is_empty());
        assert!(validate(&schema, &json!({"port": 22.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"port": 22.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"port": "22"})).len(), 1);
    }

    #[test]
    fn test_validate_string_list() {
        let schema = Schema::v0().with_attribute("install_flags", Attribute::optional_string_list());

        assert!(validate(&schema, &json!({"install_flags": ["--a", "--b"]})).is_empty());
        assert!(validate(&schema, &json!({"install_flags": []})).is_empty());

        let diagnostics = validate(&schema, &json!({"install_flags": ["--a", 1]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("install_flags.1".to_string()));

        assert_eq!(validate(&schema, &json!({"install_flags": "--a"})).len(), 1);
    }

    #[test]
    fn test_validate_required_single_block() {
        let schema = Schema::v0().with_block(
            "metadata",
            NestedBlock::required_single(
                Block::new().with_attribute("name", Attribute::required_string()),
            ),
        );

        assert!(validate(&schema, &json!({"metadata": {"name": "c"}})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required block"));

        let diagnostics = validate(&schema, &json!({"metadata": {}}));
        assert_eq!(diagnostics[0].attribute, Some("metadata.name".to_string()));

        let diagnostics = validate(&schema, &json!({"metadata": "c"}));
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn test_validate_list_block_bounds() {
        let schema = ssh_schema();

        let diagnostics = validate(&schema, &json!({"host": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(
            &schema,
            &json!({"host": [{"role": "manager", "ssh": [{"address": "a"}, {"address": "b"}]}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));

        let diagnostics = validate(&schema, &json!({"host": {"role": "manager"}}));
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_deeply_nested_path() {
        let diagnostics = validate(
            &ssh_schema(),
            &json!({"host": [
                {"role": "manager", "ssh": [{"address": "a"}]},
                {"role": "worker", "ssh": [{"address": 7}]},
            ]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("host.1.ssh.0.address".to_string())
        );
    }

    #[test]
    fn test_validate_multiple_errors_sorted() {
        let schema = Schema::v0()
            .with_attribute("b", Attribute::required_string())
            .with_attribute("a", Attribute::required_string());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].attribute, Some("a".to_string()));
        assert_eq!(diagnostics[1].attribute, Some("b".to_string()));
    }

    #[test]
    fn test_is_valid_helper() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"name": "test"})));
        assert!(!is_valid(&schema, &json!({})));
    }
}
