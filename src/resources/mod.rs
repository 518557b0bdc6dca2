//! Resource types served by the provider.
//!
//! Both resources share one lifecycle: build a [`ClusterConfig`], check it,
//! then hand it to the [`Installer`]. Testing mode and `skip_destroy`
//! short-circuit the installer with a warning.

pub mod config;
pub mod yaml_config;

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::cluster::ClusterConfig;
use crate::error::ProviderError;
use crate::installer::{ApplyOptions, InstallOperation, Installer};
use crate::logging::LogSink;
use crate::schema::{Diagnostic, Schema};
use crate::types::{PlanResult, ResourceResponse};

pub use config::ConfigResource;
pub use yaml_config::YamlConfigResource;

/// Attributes that are bookkeeping rather than cluster description.
pub(crate) const BOOKKEEPING: &[&str] = &["id", "last_updated"];

/// `last_updated` layout (RFC 850).
const TIMESTAMP_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S UTC";

/// Everything a lifecycle call needs from the configured provider.
#[derive(Clone)]
pub struct Lifecycle {
    /// Runs apply and reset.
    pub installer: Arc<dyn Installer>,
    /// Skip the installer and warn instead.
    pub testing_mode: bool,
    /// Options for every apply.
    pub apply_options: ApplyOptions,
}

impl Lifecycle {
    /// Apply `config`, or warn that `skipped` was not run in testing mode.
    pub async fn apply(
        &self,
        config: &ClusterConfig,
        skipped: &str,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.testing_mode {
            warn!(cluster = %config.metadata.name, "Testing mode, skipping launchpad apply");
            return Ok(vec![testing_mode_warning(skipped)]);
        }

        let sink = LogSink::new();
        self.installer
            .apply(config, &self.apply_options, &sink)
            .await
            .map_err(|e| ProviderError::installer(InstallOperation::Apply, e, &sink.contents()))?;
        info!(cluster = %config.metadata.name, "Launchpad apply finished");
        Ok(vec![])
    }

    /// Reset `config`, or warn in testing mode.
    pub async fn reset(&self, config: &ClusterConfig) -> Result<Vec<Diagnostic>, ProviderError> {
        if self.testing_mode {
            warn!(cluster = %config.metadata.name, "Testing mode, skipping launchpad reset");
            return Ok(vec![testing_mode_warning("reset")]);
        }

        let sink = LogSink::new();
        self.installer
            .reset(config, &sink)
            .await
            .map_err(|e| ProviderError::installer(InstallOperation::Reset, e, &sink.contents()))?;
        info!(cluster = %config.metadata.name, "Launchpad reset finished");
        Ok(vec![])
    }
}

/// One resource type's handlers.
///
/// Read is not here: launchpad cannot discover an installation, so the
/// provider returns stored state unchanged.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// The resource schema.
    fn schema(&self) -> Schema;

    /// Check a configuration without touching any host.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Compute the planned state. `proposed` is null for a destroy.
    fn plan(&self, prior: Option<&Value>, proposed: Value) -> Result<PlanResult, ProviderError>;

    /// Install the cluster.
    async fn create(
        &self,
        lifecycle: &Lifecycle,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Re-apply the cluster if its description changed.
    async fn update(
        &self,
        lifecycle: &Lifecycle,
        prior: Value,
        planned: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Tear the cluster down unless `skip_destroy` is set.
    async fn delete(
        &self,
        lifecycle: &Lifecycle,
        current: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;
}

pub(crate) fn testing_mode_warning(skipped: &str) -> Diagnostic {
    Diagnostic::warning("testing mode warning").with_detail(format!(
        "launchpad config resource handler is in testing mode, no {} will be run.",
        skipped
    ))
}

pub(crate) fn skip_destroy_warning() -> Diagnostic {
    Diagnostic::warning("Cluster destruction was skipped!").with_detail(
        "The cluster was not actively destroyed, as configuration told us to skip destruction",
    )
}

pub(crate) fn skip_destroy(state: &Value) -> bool {
    state
        .get("skip_destroy")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub(crate) fn timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Set a top-level attribute. Non-object states are left alone.
pub(crate) fn set_attribute(state: &mut Value, name: &str, value: Value) {
    if let Value::Object(map) = state {
        map.insert(name.to_string(), value);
    }
}

/// Copy `last_updated` of `prior` onto `state`. `id` always follows the
/// planned `metadata.name`, so it is never carried.
pub(crate) fn carry_last_updated(prior: &Value, state: &mut Value) {
    if let Some(value) = prior.get("last_updated").filter(|v| !v.is_null()) {
        set_attribute(state, "last_updated", value.clone());
    }
}

/// The document launchpad was given, passwords redacted.
pub(crate) fn rendered(config: &ClusterConfig) -> String {
    match crate::cluster::yaml::to_yaml(&config.redacted()) {
        Ok(doc) => format!("ProductConfig:\n{}", doc),
        Err(e) => format!("ProductConfig: <could not render: {}>", e),
    }
}

/// Plan result for a destroy: everything goes away.
pub(crate) fn destroy_plan(prior: Option<&Value>) -> PlanResult {
    let changes = prior
        .map(|prior| crate::diff::changes(prior, &Value::Null, BOOKKEEPING))
        .unwrap_or_default();
    PlanResult::with_changes(Value::Null, changes)
}
