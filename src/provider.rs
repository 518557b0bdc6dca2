//! The `launchpad` provider.
//!
//! Holds the settings from Configure and routes resource calls to
//! [`ConfigResource`] or [`YamlConfigResource`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::ProviderError;
use crate::installer::{ApplyOptions, Installer, LaunchpadCli};
use crate::resources::{self, ConfigResource, Lifecycle, Resource, YamlConfigResource};
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{PlanResult, ProviderMetadata, ResourceResponse, ServerCapabilities};
use crate::validation::validate;

/// Provider type name.
pub const PROVIDER_NAME: &str = "launchpad";

/// Provider version that turns on testing mode.
pub const TESTING_VERSION: &str = "test";

/// Environment variable overriding the reported provider version.
pub const VERSION_ENV: &str = "HEMMER_LAUNCHPAD_VERSION";

/// Longest accepted `apply_timeout_minutes` (one week).
pub const MAX_APPLY_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

/// Schema of the provider configuration block.
pub fn config_schema() -> Schema {
    Schema::v0()
        .with_description("Mirantis Launchpad provider")
        .with_attribute(
            "binary_path",
            Attribute::string_with_default("launchpad")
                .with_description("launchpad binary, a path or a name on PATH"),
        )
        .with_attribute(
            "apply_timeout_minutes",
            Attribute::int64_with_default(10).with_description("Bound on each launchpad run"),
        )
        .with_attribute(
            "force",
            Attribute::bool_with_default(false)
                .with_description("Continue applying past failed pre-flight checks"),
        )
        .with_attribute(
            "disable_telemetry",
            Attribute::bool_with_default(true)
                .with_description("Pass --disable-telemetry to launchpad"),
        )
}

#[derive(Debug, Deserialize)]
struct ProviderConfig {
    binary_path: String,
    apply_timeout_minutes: i64,
    force: bool,
    disable_telemetry: bool,
}

impl ProviderConfig {
    fn decode(config: &Value) -> Result<Self, ProviderError> {
        let config = match config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        Ok(serde_json::from_value(config_schema().with_defaults(&config))?)
    }

    fn check(&self) -> Option<Diagnostic> {
        (!(1..=MAX_APPLY_TIMEOUT_MINUTES).contains(&self.apply_timeout_minutes)).then(|| {
            Diagnostic::error("Invalid apply timeout")
                .with_detail(format!(
                    "apply_timeout_minutes must be between 1 and {}, got {}",
                    MAX_APPLY_TIMEOUT_MINUTES, self.apply_timeout_minutes
                ))
                .with_attribute("apply_timeout_minutes")
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_minutes.unsigned_abs().saturating_mul(60))
    }
}

/// Provider for Mirantis Launchpad clusters.
pub struct LaunchpadProvider {
    version: String,
    installer: Option<Arc<dyn Installer>>,
    lifecycle: RwLock<Option<Lifecycle>>,
}

impl LaunchpadProvider {
    /// A provider reporting `version`. Version [`TESTING_VERSION`] enables
    /// testing mode, in which the installer is never run.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            installer: None,
            lifecycle: RwLock::new(None),
        }
    }

    /// Version from [`VERSION_ENV`], falling back to the crate version.
    pub fn from_env() -> Self {
        let version = std::env::var(VERSION_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
        Self::new(version)
    }

    /// Use `installer` instead of the `launchpad` binary named in the
    /// provider configuration.
    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// The reported version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether installer calls are replaced by warnings.
    pub fn is_testing_mode(&self) -> bool {
        self.version == TESTING_VERSION
    }

    fn lifecycle(&self) -> Result<Lifecycle, ProviderError> {
        self.lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ProviderError::Configuration("provider has not been configured".into()))
    }

    fn resource(resource_type: &str) -> Result<&'static dyn Resource, ProviderError> {
        match resource_type {
            resources::config::RESOURCE_TYPE => Ok(&ConfigResource),
            resources::yaml_config::RESOURCE_TYPE => Ok(&YamlConfigResource),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl ProviderService for LaunchpadProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(config_schema())
            .with_resource(resources::config::RESOURCE_TYPE, ConfigResource.schema())
            .with_resource(
                resources::yaml_config::RESOURCE_TYPE,
                YamlConfigResource.schema(),
            )
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: vec![
                resources::config::RESOURCE_TYPE.to_string(),
                resources::yaml_config::RESOURCE_TYPE.to_string(),
            ],
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&config_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        diagnostics.extend(ProviderConfig::decode(&config)?.check());
        Ok(diagnostics)
    }

    #[instrument(skip_all, fields(version = %self.version))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::decode(&config)?;
        if let Some(diagnostic) = config.check() {
            return Ok(vec![diagnostic]);
        }

        let installer: Arc<dyn Installer> = match &self.installer {
            Some(installer) => Arc::clone(installer),
            None => Arc::new(
                LaunchpadCli::new(&config.binary_path)
                    .with_disable_telemetry(config.disable_telemetry)
                    .with_reset_timeout(config.timeout()),
            ),
        };
        let lifecycle = Lifecycle {
            installer,
            testing_mode: self.is_testing_mode(),
            apply_options: ApplyOptions {
                force: config.force,
                verbose: tracing::enabled!(target: "launchpad", tracing::Level::DEBUG),
                timeout: config.timeout(),
            },
        };

        if lifecycle.testing_mode {
            warn!("Provider is in testing mode, launchpad will not be run");
        }
        info!(
            binary = %config.binary_path,
            timeout_minutes = config.apply_timeout_minutes,
            force = config.force,
            "Provider configured"
        );
        *self
            .lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(lifecycle);
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(Self::resource(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        Self::resource(resource_type)?.plan(prior_state.as_ref(), proposed_state)
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        let resource = Self::resource(resource_type)?;
        resource.create(&self.lifecycle()?, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        // launchpad cannot discover an installation; stored state is trusted.
        Self::resource(resource_type)?;
        self.lifecycle()?;
        Ok(current_state)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        let resource = Self::resource(resource_type)?;
        resource
            .update(&self.lifecycle()?, prior_state, planned_state)
            .await
    }

    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = Self::resource(resource_type)?;
        resource.delete(&self.lifecycle()?, current_state).await
    }

    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Value, ProviderError> {
        Self::resource(resource_type)?;
        Err(ProviderError::Unimplemented(format!(
            "{} '{}' cannot be imported: launchpad has no way to discover an existing installation",
            resource_type, id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_error_contains, assert_no_errors, RecordingInstaller};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn provider(version: &str, installer: &RecordingInstaller) -> LaunchpadProvider {
        LaunchpadProvider::new(version).with_installer(Arc::new(installer.clone()))
    }

    fn config_state() -> Value {
        json!({
            "metadata": {"name": "test"},
            "spec": {
                "mcr": {"version": "23.0.8"},
                "mke": {"version": "3.7.3", "admin_password": "s3cret"},
                "host": [{
                    "role": "manager",
                    "ssh": [{"address": "m1", "key_path": "k", "user": "u"}],
                }],
            },
        })
    }

    #[test]
    fn test_testing_mode_from_version() {
        assert!(LaunchpadProvider::new("test").is_testing_mode());
        assert!(!LaunchpadProvider::new("0.1.0").is_testing_mode());
    }

    #[test]
    fn test_schema_and_metadata() {
        let provider = LaunchpadProvider::new("0.1.0");
        let schema = provider.schema();
        assert!(schema.resources.contains_key("launchpad_config"));
        assert!(schema.resources.contains_key("launchpad_yaml_config"));
        assert!(schema.provider.block.attributes.contains_key("binary_path"));

        let metadata = provider.metadata();
        assert_eq!(metadata.resources, vec!["launchpad_config", "launchpad_yaml_config"]);
    }

    #[tokio::test]
    async fn test_calls_before_configure_fail() {
        let provider = provider("0.1.0", &RecordingInstaller::new());
        let err = assert_err!(provider.create("launchpad_config", config_state()).await);
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_rejects_non_positive_timeout() {
        let provider = provider("0.1.0", &RecordingInstaller::new());
        let diags = provider
            .configure(json!({"apply_timeout_minutes": 0}))
            .await
            .unwrap();
        assert_error_contains(&diags, "Invalid apply timeout");
        assert!(provider.lifecycle().is_err());

        let diags = provider
            .validate_provider_config(json!({"apply_timeout_minutes": -5}))
            .await
            .unwrap();
        assert_eq!(diags[0].attribute.as_deref(), Some("apply_timeout_minutes"));
    }

    #[tokio::test]
    async fn test_configure_rejects_oversized_timeout() {
        let provider = provider("0.1.0", &RecordingInstaller::new());
        let diags = assert_ok!(
            provider
                .configure(json!({"apply_timeout_minutes": i64::MAX}))
                .await
        );
        assert_error_contains(&diags, "Invalid apply timeout");
        assert!(provider.lifecycle().is_err());

        let diags = assert_ok!(
            provider
                .configure(json!({"apply_timeout_minutes": MAX_APPLY_TIMEOUT_MINUTES}))
                .await
        );
        assert_no_errors(&diags);
        let lifecycle = assert_ok!(provider.lifecycle());
        assert_eq!(
            lifecycle.apply_options.timeout,
            Duration::from_secs(7 * 24 * 60 * 60)
        );
    }

    #[tokio::test]
    async fn test_configure_applies_settings() {
        let installer = RecordingInstaller::new();
        let provider = provider("0.1.0", &installer);
        let diags = provider
            .configure(json!({"apply_timeout_minutes": 30, "force": true}))
            .await
            .unwrap();
        assert!(diags.is_empty());

        assert_ok!(provider.create("launchpad_config", config_state()).await);
        let options = installer.calls()[0].options.clone().unwrap();
        assert!(options.force);
        assert_eq!(options.timeout, Duration::from_secs(30 * 60));
    }

    #[tokio::test]
    async fn test_null_provider_config_uses_defaults() {
        let provider = provider("test", &RecordingInstaller::new());
        assert!(provider.configure(Value::Null).await.unwrap().is_empty());
        let lifecycle = provider.lifecycle().unwrap();
        assert!(lifecycle.testing_mode);
        assert_eq!(lifecycle.apply_options.timeout, Duration::from_secs(600));
        assert!(!lifecycle.apply_options.force);
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let provider = provider("test", &RecordingInstaller::new());
        provider.configure(json!({})).await.unwrap();
        let err = assert_err!(provider.read("launchpad_cluster", json!({})).await);
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_read_returns_state_unchanged() {
        let provider = provider("test", &RecordingInstaller::new());
        provider.configure(json!({})).await.unwrap();
        let state = json!({"id": "test", "yaml_config": "kind: mke"});
        let read = assert_ok!(provider.read("launchpad_yaml_config", state.clone()).await);
        assert_eq!(read, state);
    }

    #[tokio::test]
    async fn test_import_is_rejected() {
        let provider = provider("test", &RecordingInstaller::new());
        let err = assert_err!(provider.import_resource("launchpad_config", "prod").await);
        assert!(matches!(err, ProviderError::Unimplemented(_)));
        assert!(err.to_string().contains("no way to discover"));
    }
}
