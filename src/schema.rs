//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of the provider configuration and of each
//! resource. They drive validation, default filling, and what the host shows
//! to users.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// An ordered list of values of a single type.
    List(Box<AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider.
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (can be set, but has default from provider).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value filled in when configuration leaves the attribute unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            default: None,
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Create an optional list-of-strings attribute.
    pub fn optional_string_list() -> Self {
        Self::new(
            AttributeType::list(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// Create an optional string attribute that falls back to `default`.
    pub fn string_with_default(default: &str) -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
            .with_default(Value::from(default))
    }

    /// Create an optional int64 attribute that falls back to `default`.
    pub fn int64_with_default(default: i64) -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional_computed())
            .with_default(Value::from(default))
    }

    /// Create an optional bool attribute that falls back to `default`.
    pub fn bool_with_default(default: bool) -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional_computed())
            .with_default(Value::from(default))
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set a default value for this attribute.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// A single nested block, encoded as an object.
    #[default]
    Single,
    /// A list of nested blocks, encoded as an array.
    List,
}

/// A nested block within a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fill unset attributes that declare a default, recursing into nested
    /// blocks that are present. Absent blocks stay absent.
    pub fn apply_defaults(&self, value: &mut Value) {
        let Value::Object(obj) = value else {
            return;
        };

        for (name, attr) in &self.attributes {
            let Some(default) = &attr.default else {
                continue;
            };
            let slot = obj.entry(name.clone()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = default.clone();
            }
        }

        for (name, nested) in &self.blocks {
            match obj.get_mut(name) {
                Some(Value::Array(items)) => {
                    for item in items {
                        nested.block.apply_defaults(item);
                    }
                },
                Some(item @ Value::Object(_)) => nested.block.apply_defaults(item),
                _ => {},
            }
        }
    }
}

/// A nested block with its nesting mode and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block is nested.
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of blocks required.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Single,
            min_items: 0,
            max_items: 1,
        }
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::List,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// A single block that must be present.
    pub fn required_single(block: Block) -> Self {
        Self::single(block).with_min_items(1)
    }
}

/// Schema for a resource or the provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    /// The version of this schema.
    #[serde(default)]
    pub version: u64,
    /// The root block containing all attributes and nested blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Set the description of the root block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// See [`Block::apply_defaults`].
    pub fn apply_defaults(&self, value: &mut Value) {
        self.block.apply_defaults(value);
    }

    /// Return a copy of `value` with defaults applied.
    pub fn with_defaults(&self, value: &Value) -> Value {
        let mut filled = value.clone();
        self.apply_defaults(&mut filled);
        filled
    }
}

/// Schema for the provider configuration and every resource it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(!optional_computed.required);
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
    }

    #[test]
    fn test_defaulted_attributes() {
        let attr = Attribute::string_with_default("stable").with_description("Channel");
        assert!(attr.flags.optional);
        assert!(attr.flags.computed);
        assert_eq!(attr.default, Some(json!("stable")));
        assert_eq!(attr.description.as_deref(), Some("Channel"));

        let secret = Attribute::required_string().sensitive();
        assert!(secret.flags.required);
        assert!(secret.flags.sensitive);
    }

    #[test]
    fn test_nested_block_modes() {
        let single = NestedBlock::required_single(Block::new());
        assert_eq!(single.nesting_mode, BlockNestingMode::Single);
        assert_eq!(single.min_items, 1);
        assert_eq!(single.max_items, 1);

        let list = NestedBlock::list(Block::new()).with_max_items(1);
        assert_eq!(list.nesting_mode, BlockNestingMode::List);
        assert_eq!(list.min_items, 0);
        assert_eq!(list.max_items, 1);
    }

    #[test]
    fn test_apply_defaults_fills_missing_and_null() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("port", Attribute::int64_with_default(22))
            .with_attribute("secure", Attribute::bool_with_default(true));

        let filled = schema.with_defaults(&json!({"name": "a", "secure": null}));
        assert_eq!(filled, json!({"name": "a", "port": 22, "secure": true}));

        // Explicit values win over defaults.
        let filled = schema.with_defaults(&json!({"name": "a", "port": 2222, "secure": false}));
        assert_eq!(filled["port"], 2222);
        assert_eq!(filled["secure"], false);
    }

    #[test]
    fn test_apply_defaults_recurses_into_present_blocks() {
        let schema = Schema::v0()
            .with_block(
                "ssh",
                NestedBlock::list(
                    Block::new()
                        .with_attribute("address", Attribute::required_string())
                        .with_attribute("port", Attribute::int64_with_default(22)),
                ),
            )
            .with_block(
                "cluster",
                NestedBlock::single(
                    Block::new().with_attribute("prune", Attribute::bool_with_default(false)),
                ),
            );

        let filled = schema.with_defaults(&json!({
            "ssh": [{"address": "a"}, {"address": "b", "port": 2022}],
        }));
        assert_eq!(filled["ssh"][0]["port"], 22);
        assert_eq!(filled["ssh"][1]["port"], 2022);
        assert!(filled.get("cluster").is_none());

        let filled = schema.with_defaults(&json!({"cluster": {}}));
        assert_eq!(filled["cluster"]["prune"], false);
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("binary_path", Attribute::optional_string()),
            )
            .with_resource(
                "launchpad_config",
                Schema::v0().with_attribute("id", Attribute::computed_string()),
            );

        assert!(provider_schema
            .provider
            .block
            .attributes
            .contains_key("binary_path"));
        assert!(provider_schema.resources.contains_key("launchpad_config"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("The value must be positive")
            .with_attribute("count");

        assert!(err.is_error());
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.detail, Some("The value must be positive".to_string()));
        assert_eq!(err.attribute, Some("count".to_string()));

        assert!(has_errors(&[Diagnostic::warning("w"), err]));
        assert!(!has_errors(&[Diagnostic::warning("w")]));
    }
}
