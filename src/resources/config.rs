//! The `launchpad_config` resource: a cluster described by nested blocks.

use serde_json::Value;
use tracing::{debug, instrument};

use super::{
    carry_last_updated, destroy_plan, rendered, set_attribute, skip_destroy, skip_destroy_warning,
    timestamp, Lifecycle, Resource, BOOKKEEPING,
};
use crate::cluster::ClusterConfig;
use crate::diff;
use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, Schema};
use crate::translate;
use crate::types::{PlanResult, ResourceResponse};
use crate::validation::validate;

pub use crate::translate::RESOURCE_TYPE;

/// Handlers for `launchpad_config`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigResource;

impl ConfigResource {
    fn cluster(state: &Value) -> Result<ClusterConfig, ProviderError> {
        let config = translate::cluster_config(state)?;
        config.validate().map_err(ProviderError::InvalidCluster)?;
        Ok(config)
    }

    async fn apply(
        lifecycle: &Lifecycle,
        planned: Value,
        skipped: &str,
    ) -> Result<ResourceResponse, ProviderError> {
        let mut state = translate::schema().with_defaults(&planned);
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

#[async_trait::async_trait]
impl Resource for ConfigResource {
    fn schema(&self) -> Schema {
        translate::schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validate(&translate::schema(), config);
        if has_errors(&diagnostics) {
            return diagnostics;
        }
        if let Err(e) = Self::cluster(config) {
            diagnostics.push(e.to_diagnostic());
        }
        diagnostics
    }

    fn plan(&self, prior: Option<&Value>, proposed: Value) -> Result<PlanResult, ProviderError> {
        if proposed.is_null() {
            return Ok(destroy_plan(prior));
        }

        let mut planned = translate::schema().with_defaults(&proposed);
        let name = planned["metadata"]["name"].clone();
        set_attribute(&mut planned, "id", name);
        if let Some(prior) = prior {
            let last_updated = prior.get("last_updated").cloned().unwrap_or(Value::Null);
            set_attribute(&mut planned, "last_updated", last_updated);
        }

        let changes = diff::changes(prior.unwrap_or(&Value::Null), &planned, BOOKKEEPING);
        Ok(PlanResult::with_changes(planned, changes))
    }

    #[instrument(skip_all, name = "launchpad_config.create")]
    async fn create(
        &self,
        lifecycle: &Lifecycle,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        Self::apply(lifecycle, planned, "installation").await
    }

    #[instrument(skip_all, name = "launchpad_config.update")]
    async fn update(
        &self,
        lifecycle: &Lifecycle,
        prior: Value,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        if diff::spec_equal(&prior, &planned) {
            debug!("Cluster spec unchanged, not re-applying");
            let mut state = translate::schema().with_defaults(&planned);
            let name = state["metadata"]["name"].clone();
            set_attribute(&mut state, "id", name);
            carry_last_updated(&prior, &mut state);
            return Ok(ResourceResponse::new(state));
        }
        Self::apply(lifecycle, planned, "update").await
    }

    #[instrument(skip_all, name = "launchpad_config.delete")]
    async fn delete(
        &self,
        lifecycle: &Lifecycle,
        current: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if skip_destroy(&current) {
            return Ok(vec![skip_destroy_warning()]);
        }
        let config = translate::cluster_config(&current)?;
        lifecycle.reset(&config).await
    }
}
