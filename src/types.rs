//! Convenience types over the raw protobuf messages.

use crate::schema::{has_errors, Diagnostic};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Dotted path to the attribute that changed (`spec.host.0.role`).
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        let encode = |v: Option<Value>| {
            v.map(|v| serde_json::to_vec(&v).unwrap_or_default())
                .unwrap_or_default()
        };
        Self {
            path: change.path,
            before: encode(change.before),
            after: encode(change.after),
        }
    }
}

/// The result of a plan operation.
///
/// Nothing in a cluster definition forces replacement; every change is
/// converged in place by re-running the installer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
}

impl PlanResult {
    /// Create a plan result with changes.
    pub fn with_changes(planned_state: Value, changes: Vec<AttributeChange>) -> Self {
        Self {
            planned_state,
            changes,
        }
    }

    /// Whether applying this plan would change anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// State and diagnostics produced by a create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    /// The state to record.
    pub state: Value,
    /// Warnings to surface alongside the state.
    pub diagnostics: Vec<Diagnostic>,
}

impl ResourceResponse {
    /// A response with no diagnostics.
    pub fn new(state: Value) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix output by providers.
pub const HANDSHAKE_PREFIX: &str = "HEMMER_PROVIDER";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("metadata.name", json!("test"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("test")));

        let removed = AttributeChange::removed("spec.msr", json!([]));
        assert_eq!(removed.before, Some(json!([])));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("spec.mke.version", json!("3.7.2"), json!("3.7.3"));
        assert_eq!(modified.before, Some(json!("3.7.2")));
        assert_eq!(modified.after, Some(json!("3.7.3")));
    }

    #[test]
    fn test_attribute_change_to_proto() {
        let proto: crate::generated::AttributeChange =
            AttributeChange::modified("spec.cluster.prune", json!(false), json!(true)).into();
        assert_eq!(proto.path, "spec.cluster.prune");
        assert_eq!(proto.before, b"false");
        assert_eq!(proto.after, b"true");

        let proto: crate::generated::AttributeChange =
            AttributeChange::added("id", json!("prod")).into();
        assert!(proto.before.is_empty());
        assert_eq!(proto.after, b"\"prod\"");
    }

    #[test]
    fn test_plan_result() {
        let plan = PlanResult::with_changes(json!({"id": "prod"}), vec![]);
        assert!(!plan.has_changes());

        let plan = PlanResult::with_changes(
            json!({"id": "prod"}),
            vec![AttributeChange::modified("spec.mcr.version", json!("23.0.7"), json!("23.0.8"))],
        );
        assert!(plan.has_changes());
    }

    #[test]
    fn test_resource_response() {
        let mut response = ResourceResponse::new(json!({"id": "prod"}));
        response.diagnostics.push(Diagnostic::warning("testing mode warning"));
        assert!(!response.has_errors());
        response.diagnostics.push(Diagnostic::error("Launchpad apply failed"));
        assert!(response.has_errors());
    }

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(HANDSHAKE_PREFIX, "HEMMER_PROVIDER");
    }
}
