//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] without a gRPC server and
//! [`RecordingInstaller`] stands in for the `launchpad` binary.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_launchpad::testing::{ProviderTester, RecordingInstaller};
//! use hemmer_provider_launchpad::LaunchpadProvider;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_create_cluster() {
//!     let installer = RecordingInstaller::new();
//!     let tester = ProviderTester::new(
//!         LaunchpadProvider::new("0.1.0").with_installer(Arc::new(installer.clone())),
//!     );
//!     tester.configure(json!({})).await.unwrap();
//!
//!     let state = tester.lifecycle_create("launchpad_config", cluster()).await.unwrap();
//!     assert_eq!(installer.calls().len(), 1);
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::cluster::ClusterConfig;
use crate::error::{InstallerError, ProviderError};
use crate::installer::{ApplyOptions, InstallOperation, Installer};
use crate::logging::LogSink;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{PlanResult, ResourceResponse};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration. Error diagnostics become `Err`.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider. Error diagnostics become `Err`.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Value, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created.state).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated.state).await
    }

    /// Run plan → delete and return the delete diagnostics.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run create → update → delete and return the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Recording Installer
// =========================================================================

/// One call made to a [`RecordingInstaller`].
#[derive(Debug, Clone)]
pub struct InstallerCall {
    /// Apply or reset.
    pub operation: InstallOperation,
    /// The cluster the call was made for.
    pub config: ClusterConfig,
    /// Apply options; `None` for reset.
    pub options: Option<ApplyOptions>,
}

/// An [`Installer`] that records its calls instead of running launchpad.
///
/// Clones share the call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingInstaller {
    calls: Arc<Mutex<Vec<InstallerCall>>>,
    output: Vec<String>,
    failure: Option<String>,
}

impl RecordingInstaller {
    /// An installer whose every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Print `line` into the sink on every call.
    pub fn with_output(mut self, line: impl Into<String>) -> Self {
        self.output.push(line.into());
        self
    }

    /// Fail every call, reporting `status` as the exit status.
    pub fn failing(mut self, status: impl Into<String>) -> Self {
        self.failure = Some(status.into());
        self
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<InstallerCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn run(&self, call: InstallerCall, sink: &LogSink) -> Result<(), InstallerError> {
        let operation = call.operation;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        for line in &self.output {
            sink.record(line.as_str());
        }
        match &self.failure {
            Some(status) => Err(InstallerError::Failed {
                operation,
                status: status.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Installer for RecordingInstaller {
    async fn apply(
        &self,
        config: &ClusterConfig,
        options: &ApplyOptions,
        sink: &LogSink,
    ) -> Result<(), InstallerError> {
        self.run(
            InstallerCall {
                operation: InstallOperation::Apply,
                config: config.clone(),
                options: Some(options.clone()),
            },
            sink,
        )
    }

    async fn reset(&self, config: &ClusterConfig, sink: &LogSink) -> Result<(), InstallerError> {
        self.run(
            InstallerCall {
                operation: InstallOperation::Reset,
                config: config.clone(),
                options: None,
            },
            sink,
        )
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        plan.changes.iter().all(|c| c.before.is_none()),
        "Expected plan to only add attributes, but got {:?}",
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan does not have a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan has a change for the given path.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain a warning with the given summary substring.
///
/// # Panics
///
/// Panics if no warning diagnostic contains the given substring.
pub fn assert_has_warning(diagnostics: &[Diagnostic], substring: &str) {
    let found = diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Warning && d.summary.contains(substring));

    assert!(
        found,
        "Expected a warning containing '{}', got {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LaunchpadProvider;
    use serde_json::json;

    fn cluster(mke_version: &str) -> Value {
        json!({
            "metadata": {"name": "test"},
            "spec": {
                "mcr": {"version": "22.10"},
                "mke": {"version": mke_version, "admin_password": "s3cret"},
                "host": [{
                    "role": "manager",
                    "ssh": [{"address": "manager1.example.org", "key_path": "k", "user": "u"}],
                }],
            },
        })
    }

    fn tester(version: &str, installer: &RecordingInstaller) -> ProviderTester<LaunchpadProvider> {
        ProviderTester::new(LaunchpadProvider::new(version).with_installer(Arc::new(installer.clone())))
    }

    #[tokio::test]
    async fn test_tester_configure() {
        let tester = tester("0.1.0", &RecordingInstaller::new());
        assert!(tester.configure(json!({"force": true})).await.is_ok());

        let err = tester
            .configure(json!({"apply_timeout_minutes": -1}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(_)));
    }

    #[tokio::test]
    async fn test_tester_resource_types() {
        let tester = tester("0.1.0", &RecordingInstaller::new());
        let types = tester.resource_types();
        assert!(types.contains(&"launchpad_config".to_string()));
        assert!(tester.schema().resources.contains_key("launchpad_yaml_config"));
    }

    #[tokio::test]
    async fn test_tester_plan_create() {
        let tester = tester("0.1.0", &RecordingInstaller::new());
        let plan = tester
            .plan_create("launchpad_config", cluster("3.6.0"))
            .await
            .unwrap();

        assert_plan_creates(&plan);
        assert_plan_does_not_change_attribute(&plan, "id");
        assert_eq!(plan.planned_state["id"], "test");
    }

    #[tokio::test]
    async fn test_tester_plan_update() {
        let tester = tester("0.1.0", &RecordingInstaller::new());
        let prior = tester
            .plan_create("launchpad_config", cluster("3.6.0"))
            .await
            .unwrap()
            .planned_state;

        let plan = tester
            .plan_update("launchpad_config", prior.clone(), cluster("3.6.1"))
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "spec.mke.version");

        let plan = tester
            .plan_update("launchpad_config", prior, cluster("3.6.0"))
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_tester_validate_resource_config() {
        let tester = tester("0.1.0", &RecordingInstaller::new());
        assert!(tester
            .validate_resource_config("launchpad_config", cluster("3.6.0"))
            .await
            .is_ok());

        let mut no_connection = cluster("3.6.0");
        no_connection["spec"]["host"][0] = json!({"role": "manager"});
        let err = tester
            .validate_resource_config("launchpad_config", no_connection)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing connection block"));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_crud() {
        let installer = RecordingInstaller::new();
        let tester = tester("0.1.0", &installer);
        tester.configure(json!({})).await.unwrap();

        let state = tester
            .lifecycle_crud("launchpad_config", cluster("3.6.0"), cluster("3.6.1"))
            .await
            .unwrap();

        assert_eq!(state["spec"]["mke"]["version"], "3.6.1");
        let operations: Vec<_> = installer.calls().iter().map(|c| c.operation).collect();
        assert_eq!(
            operations,
            vec![
                InstallOperation::Apply,
                InstallOperation::Apply,
                InstallOperation::Reset
            ]
        );
    }

    #[tokio::test]
    async fn test_tester_lifecycle_in_testing_mode() {
        let installer = RecordingInstaller::new();
        let tester = tester("test", &installer);
        tester.configure(json!({})).await.unwrap();

        let state = tester
            .lifecycle_create("launchpad_config", cluster("3.6.0"))
            .await
            .unwrap();
        let diags = tester.lifecycle_delete("launchpad_config", state).await.unwrap();

        assert_has_warning(&diags, "testing mode warning");
        assert!(installer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recording_installer_output_reaches_sink() {
        let installer = RecordingInstaller::new().with_output("level=info msg=\"Connected\"");
        let sink = LogSink::new();
        let config = crate::translate::cluster_config(&cluster("3.6.0")).unwrap();

        installer.reset(&config, &sink).await.unwrap();
        assert_eq!(sink.contents(), "level=info msg=\"Connected\"");
        assert!(installer.calls()[0].options.is_none());
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("Just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_assert_has_errors() {
        assert_has_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    #[should_panic(expected = "Expected a warning containing")]
    fn test_assert_has_warning_ignores_errors() {
        assert_has_warning(&[Diagnostic::error("testing mode warning")], "testing mode");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("spec.host.0"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("spec.host.0"));
        assert!(display.contains("More info"));
    }
}
