//! The `launchpad_yaml_config` resource: a cluster given as a launchpad
//! document in a single string attribute.

use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    carry_last_updated, destroy_plan, rendered, set_attribute, skip_destroy, skip_destroy_warning,
    timestamp, Lifecycle, Resource, BOOKKEEPING,
};
use crate::cluster::{yaml, ClusterConfig};
use crate::diff;
use crate::error::ProviderError;
use crate::schema::{has_errors, Attribute, Diagnostic, Schema};
use crate::types::{PlanResult, ResourceResponse};
use crate::validation::validate;

/// Resource type name.
pub const RESOURCE_TYPE: &str = "launchpad_yaml_config";

const YAML_CONFIG: &str = "yaml_config";

/// Schema of the `launchpad_yaml_config` resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("A Mirantis Launchpad cluster given as a launchpad YAML document")
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("last_updated", Attribute::computed_string())
        .with_attribute("skip_destroy", Attribute::bool_with_default(false))
        .with_attribute(
            YAML_CONFIG,
            Attribute::required_string().with_description("Launchpad cluster document"),
        )
}

fn document(state: &Value) -> Result<&str, ProviderError> {
    state
        .get(YAML_CONFIG)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Validation(format!("'{}' must be a string", YAML_CONFIG)))
}

/// Handlers for `launchpad_yaml_config`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlConfigResource;

impl YamlConfigResource {
    fn cluster(state: &Value) -> Result<ClusterConfig, ProviderError> {
        let config = yaml::product_from_yaml(document(state)?)?;
        config.validate().map_err(ProviderError::InvalidCluster)?;
        Ok(config)
    }

    async fn apply(
        lifecycle: &Lifecycle,
        planned: Value,
        skipped: &str,
    ) -> Result<ResourceResponse, ProviderError> {
        let mut state = schema().with_defaults(&planned);
        let config = Self::cluster(&state)?;
        let diagnostics = lifecycle
            .apply(&config, skipped)
            .await
            .map_err(|e| e.with_context(&rendered(&config)))?;

        set_attribute(&mut state, "id", Value::String(config.metadata.name));
        set_attribute(&mut state, "last_updated", Value::String(timestamp()));
        Ok(ResourceResponse {
            state,
            diagnostics,
        })
    }
}

/// `metadata.name` of the document, or null when it does not parse.
fn document_name(state: &Value) -> Value {
    document(state)
        .ok()
        .and_then(|doc| yaml::product_from_yaml(doc).ok())
        .map(|config| Value::String(config.metadata.name))
        .unwrap_or(Value::Null)
}

#[async_trait::async_trait]
impl Resource for YamlConfigResource {
    fn schema(&self) -> Schema {
        schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validate(&schema(), config);
        if has_errors(&diagnostics) {
            return diagnostics;
        }
        if let Err(e) = Self::cluster(config) {
            diagnostics.push(e.to_diagnostic().with_attribute(YAML_CONFIG));
        }
        diagnostics
    }

    fn plan(&self, prior: Option<&Value>, proposed: Value) -> Result<PlanResult, ProviderError> {
        if proposed.is_null() {
            return Ok(destroy_plan(prior));
        }

        let mut planned = schema().with_defaults(&proposed);
        // An unparsable document keeps a null id; validation reports why.
        let name = document_name(&planned);
        set_attribute(&mut planned, "id", name);
        if let Some(prior) = prior {
            let last_updated = prior.get("last_updated").cloned().unwrap_or(Value::Null);
            set_attribute(&mut planned, "last_updated", last_updated);
        }

        let changes = diff::changes(prior.unwrap_or(&Value::Null), &planned, BOOKKEEPING);
        Ok(PlanResult::with_changes(planned, changes))
    }

    #[instrument(skip_all, name = "launchpad_yaml_config.create")]
    async fn create(
        &self,
        lifecycle: &Lifecycle,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        Self::apply(lifecycle, planned, "installation").await
    }

    #[instrument(skip_all, name = "launchpad_yaml_config.update")]
    async fn update(
        &self,
        lifecycle: &Lifecycle,
        prior: Value,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        if prior.get(YAML_CONFIG) == planned.get(YAML_CONFIG) {
            debug!("Launchpad document unchanged, not re-applying");
            let mut state = schema().with_defaults(&planned);
            let name = document_name(&state);
            set_attribute(&mut state, "id", name);
            carry_last_updated(&prior, &mut state);
            return Ok(ResourceResponse::new(state));
        }
        Self::apply(lifecycle, planned, "update").await
    }

    #[instrument(skip_all, name = "launchpad_yaml_config.delete")]
    async fn delete(
        &self,
        lifecycle: &Lifecycle,
        current: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if skip_destroy(&current) {
            return Ok(vec![skip_destroy_warning()]);
        }
        let config = yaml::product_from_yaml(document(&current)?)?;
        lifecycle.reset(&config).await
    }
}
