//! Server helpers for running the provider.
//!
//! This module defines the [`ProviderService`] trait, the in-process seam
//! between the gRPC adapter and the provider, and the `serve` functions that
//! start the gRPC server with the handshake protocol.
//!
//! # Signal Handling
//!
//! SIGTERM and SIGINT trigger a graceful shutdown. The server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests to complete (bounded by [`ServeOptions::shutdown_timeout`])
//! 3. Calls the provider's `stop()` method
//! 4. Exits cleanly

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated as proto;
use crate::schema::{has_errors, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    PlanResult, ProviderMetadata, ResourceResponse, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// Operations a provider serves, in terms of JSON attribute trees.
///
/// Errors returned here are reported to the host as a single error
/// diagnostic built by [`ProviderError::to_diagnostic`].
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.keys().cloned().collect();
        resources.sort();
        ProviderMetadata {
            resources,
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider. Called once before any resource operation.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<ResourceResponse, ProviderError>;

    /// Delete a resource. Returned diagnostics are warnings about how the
    /// delete was carried out.
    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Import existing infrastructure, returning its state.
    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Value, ProviderError>;
}

/// Wrapper that implements the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn diagnostic_to_proto(d: Diagnostic) -> proto::Diagnostic {
    proto::Diagnostic {
        severity: match d.severity {
            DiagnosticSeverity::Error => proto::diagnostic::Severity::Error as i32,
            DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning as i32,
        },
        summary: d.summary,
        detail: d.detail.unwrap_or_default(),
        attribute: d.attribute.unwrap_or_default(),
    }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics.into_iter().map(diagnostic_to_proto).collect()
}

fn error_to_diagnostics(err: &ProviderError) -> Vec<proto::Diagnostic> {
    vec![diagnostic_to_proto(err.to_diagnostic())]
}

fn schema_to_proto(schema: &crate::schema::Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &crate::schema::Block) -> proto::Block {
    let mut attributes: Vec<_> = block
        .attributes
        .iter()
        .map(|(name, attr)| proto::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: false,
            default_value: attr
                .default
                .as_ref()
                .map(|v| serde_json::to_vec(v).unwrap_or_default())
                .unwrap_or_default(),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut block_types: Vec<_> = block
        .blocks
        .iter()
        .map(|(name, nested)| proto::NestedBlock {
            type_name: name.clone(),
            block: Some(block_to_proto(&nested.block)),
            nesting_mode: match nested.nesting_mode {
                BlockNestingMode::Single => proto::nested_block::NestingMode::Single as i32,
                BlockNestingMode::List => proto::nested_block::NestingMode::List as i32,
            },
            min_items: nested.min_items as i32,
            max_items: nested.max_items as i32,
        })
        .collect();
    block_types.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    proto::Block {
        attributes,
        block_types,
        description: block.description.clone().unwrap_or_default(),
    }
}

fn decode(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn log_diagnostics(operation: &str, resource_type: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(%resource_type, diagnostics = diagnostics.len(), "{} completed with errors", operation);
    } else if diagnostics.is_empty() {
        info!(%resource_type, "{} completed successfully", operation);
    } else {
        info!(%resource_type, warnings = diagnostics.len(), "{} completed with warnings", operation);
    }
}

#[tonic::async_trait]
impl<P: ProviderService> proto::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<proto::GetMetadataRequest>,
    ) -> Result<tonic::Response<proto::GetMetadataResponse>, tonic::Status> {
        debug!("GetMetadata called");
        let metadata = self.provider.metadata();
        info!(resources = metadata.resources.len(), "GetMetadata completed");
        Ok(tonic::Response::new(proto::GetMetadataResponse {
            server_capabilities: Some(proto::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<proto::GetSchemaRequest>,
    ) -> Result<tonic::Response<proto::GetSchemaResponse>, tonic::Status> {
        debug!("GetSchema called");
        let schema = self.provider.schema();
        info!(resources = schema.resources.len(), "GetSchema completed");
        Ok(tonic::Response::new(proto::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<proto::ValidateProviderConfigRequest>,
    ) -> Result<tonic::Response<proto::ValidateProviderConfigResponse>, tonic::Status> {
        debug!("ValidateProviderConfig called");
        let config = decode(&request.into_inner().config);

        let diagnostics = match self.provider.validate_provider_config(config).await {
            Ok(diagnostics) => {
                log_diagnostics("ValidateProviderConfig", "provider", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "ValidateProviderConfig failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(proto::ValidateProviderConfigResponse {
            diagnostics,
        }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<proto::ConfigureRequest>,
    ) -> Result<tonic::Response<proto::ConfigureResponse>, tonic::Status> {
        debug!("Configure called");
        let config = decode(&request.into_inner().config);

        let diagnostics = match self.provider.configure(config).await {
            Ok(diagnostics) => {
                log_diagnostics("Configure", "provider", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(proto::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<proto::StopRequest>,
    ) -> Result<tonic::Response<proto::StopResponse>, tonic::Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                String::new()
            },
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(tonic::Response::new(proto::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<proto::ValidateResourceConfigRequest>,
    ) -> Result<tonic::Response<proto::ValidateResourceConfigResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "ValidateResourceConfig called");

        let diagnostics = match self
            .provider
            .validate_resource_config(&req.resource_type, decode(&req.config))
            .await
        {
            Ok(diagnostics) => {
                log_diagnostics("ValidateResourceConfig", &req.resource_type, &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "ValidateResourceConfig failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(proto::ValidateResourceConfigResponse {
            diagnostics,
        }))
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(
        &self,
        request: tonic::Request<proto::PlanRequest>,
    ) -> Result<tonic::Response<proto::PlanResponse>, tonic::Status> {
        let req = request.into_inner();
        let is_create = req.prior_state.is_empty();
        debug!(resource_type = %req.resource_type, is_create, "Plan called");

        let prior_state = if is_create {
            None
        } else {
            serde_json::from_slice(&req.prior_state).ok()
        };

        match self
            .provider
            .plan(
                &req.resource_type,
                prior_state,
                decode(&req.proposed_state),
                decode(&req.config),
            )
            .await
        {
            Ok(result) => {
                info!(
                    resource_type = %req.resource_type,
                    changes = result.changes.len(),
                    "Plan completed"
                );
                Ok(tonic::Response::new(proto::PlanResponse {
                    planned_state: encode(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: false,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Plan failed");
                Ok(tonic::Response::new(proto::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: tonic::Request<proto::CreateRequest>,
    ) -> Result<tonic::Response<proto::CreateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Create called");

        match self
            .provider
            .create(&req.resource_type, decode(&req.planned_state))
            .await
        {
            Ok(response) => {
                log_diagnostics("Create", &req.resource_type, &response.diagnostics);
                Ok(tonic::Response::new(proto::CreateResponse {
                    state: encode(&response.state),
                    diagnostics: diagnostics_to_proto(response.diagnostics),
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Create failed");
                Ok(tonic::Response::new(proto::CreateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(
        &self,
        request: tonic::Request<proto::ReadRequest>,
    ) -> Result<tonic::Response<proto::ReadResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Read called");

        match self
            .provider
            .read(&req.resource_type, decode(&req.current_state))
            .await
        {
            Ok(state) => {
                debug!(resource_type = %req.resource_type, "Read completed successfully");
                Ok(tonic::Response::new(proto::ReadResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Read failed");
                Ok(tonic::Response::new(proto::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: tonic::Request<proto::UpdateRequest>,
    ) -> Result<tonic::Response<proto::UpdateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Update called");

        match self
            .provider
            .update(
                &req.resource_type,
                decode(&req.prior_state),
                decode(&req.planned_state),
            )
            .await
        {
            Ok(response) => {
                log_diagnostics("Update", &req.resource_type, &response.diagnostics);
                Ok(tonic::Response::new(proto::UpdateResponse {
                    state: encode(&response.state),
                    diagnostics: diagnostics_to_proto(response.diagnostics),
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Update failed");
                Ok(tonic::Response::new(proto::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: tonic::Request<proto::DeleteRequest>,
    ) -> Result<tonic::Response<proto::DeleteResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, "Delete called");

        let diagnostics = match self
            .provider
            .delete(&req.resource_type, decode(&req.current_state))
            .await
        {
            Ok(diagnostics) => {
                log_diagnostics("Delete", &req.resource_type, &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Delete failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(proto::DeleteResponse { diagnostics }))
    }

    #[instrument(skip(self, request), name = "grpc.import_resource_state")]
    async fn import_resource_state(
        &self,
        request: tonic::Request<proto::ImportResourceStateRequest>,
    ) -> Result<tonic::Response<proto::ImportResourceStateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "ImportResourceState called");

        match self
            .provider
            .import_resource(&req.resource_type, &req.id)
            .await
        {
            Ok(state) => {
                info!(resource_type = %req.resource_type, id = %req.id, "ImportResourceState completed");
                Ok(tonic::Response::new(proto::ImportResourceStateResponse {
                    imported: vec![proto::ImportedResource {
                        resource_type: req.resource_type,
                        state: encode(&state),
                    }],
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                warn!(resource_type = %req.resource_type, id = %req.id, error = %e, "ImportResourceState rejected");
                Ok(tonic::Response::new(proto::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C on Windows).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending().await;
                },
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C handler");
            return std::future::pending().await;
        }
        info!("Received CTRL+C, initiating graceful shutdown");
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Serve a provider implementation as a gRPC server.
///
/// Binds an available local port, prints the handshake
/// `HEMMER_PROVIDER|<protocol version>|<address>` on stdout, and serves until
/// a shutdown signal arrives.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options. See [`serve`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    serve_on_listener(provider, listener, addr, options).await
}

/// Serve a provider on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    serve_on_listener(provider, listener, actual_addr, ServeOptions::default()).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);

    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let grpc_service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(proto::provider_server::ProviderServer::new(grpc_service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async move {
                wait_for_shutdown_signal().await;
                let _ = signalled_tx.send(());
            },
        );
    tokio::pin!(server);

    // The timeout only starts once a signal has been received.
    tokio::select! {
        result = &mut server => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
        },
        _ = signalled_rx => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(Ok(())) => info!("Server shutdown complete"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                },
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        },
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LaunchpadProvider;
    use crate::testing::RecordingInstaller;
    use proto::provider_server::Provider as _;
    use serde_json::json;

    fn service(version: &str, installer: &RecordingInstaller) -> ProviderGrpcService<LaunchpadProvider> {
        ProviderGrpcService {
            provider: Arc::new(
                LaunchpadProvider::new(version).with_installer(Arc::new(installer.clone())),
            ),
        }
    }

    fn cluster() -> Vec<u8> {
        encode(&json!({
            "skip_destroy": false,
            "metadata": {"name": "test"},
            "spec": {
                "mcr": {"version": "23.0.8"},
                "mke": {"version": "3.7.3", "admin_password": "s3cret"},
                "host": [{
                    "role": "manager",
                    "ssh": [{"address": "m1", "key_path": "k", "user": "u"}],
                }],
            },
        }))
    }

    async fn configure(service: &ProviderGrpcService<LaunchpadProvider>) {
        let response = service
            .configure(tonic::Request::new(proto::ConfigureRequest {
                config: b"{}".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.diagnostics.is_empty());
    }

    #[test]
    fn test_block_to_proto_sorted_and_typed() {
        let schema = crate::translate::schema();
        let block = block_to_proto(&schema.block);

        let names: Vec<_> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "last_updated", "skip_destroy"]);
        assert_eq!(block.attributes[2].default_value, b"false");
        assert!(block.attributes.iter().all(|a| !a.force_new));

        let spec = block.block_types.iter().find(|b| b.type_name == "spec").unwrap();
        assert_eq!(spec.min_items, 1);
        let host = spec
            .block
            .as_ref()
            .unwrap()
            .block_types
            .iter()
            .find(|b| b.type_name == "host")
            .unwrap();
        assert_eq!(host.nesting_mode, proto::nested_block::NestingMode::List as i32);
    }

    #[test]
    fn test_error_to_diagnostics() {
        let err = ProviderError::Translate(crate::error::ConfigError::NoHosts);
        let diags = error_to_diagnostics(&err);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, proto::diagnostic::Severity::Error as i32);
        assert_eq!(
            diags[0].summary,
            "Failed to build cluster config from resource configuration"
        );
        assert_eq!(diags[0].detail, "at least one host is required");
    }

    #[tokio::test]
    async fn test_get_metadata_and_schema() {
        let service = service("test", &RecordingInstaller::new());
        let metadata = service
            .get_metadata(tonic::Request::new(proto::GetMetadataRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(metadata.resources.len(), 2);
        assert!(metadata.server_capabilities.unwrap().plan_destroy);

        let schema = service
            .get_schema(tonic::Request::new(proto::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(schema.resources.contains_key("launchpad_yaml_config"));
        assert!(schema.provider.is_some());
    }

    #[tokio::test]
    async fn test_create_in_testing_mode_returns_warning() {
        let installer = RecordingInstaller::new();
        let service = service("test", &installer);
        configure(&service).await;

        let response = service
            .create(tonic::Request::new(proto::CreateRequest {
                resource_type: "launchpad_config".into(),
                planned_state: cluster(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].severity,
            proto::diagnostic::Severity::Warning as i32
        );
        let state = decode(&response.state);
        assert_eq!(state["id"], "test");
        assert!(installer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_plan_and_delete() {
        let installer = RecordingInstaller::new();
        let service = service("0.1.0", &installer);
        configure(&service).await;

        let plan = service
            .plan(tonic::Request::new(proto::PlanRequest {
                resource_type: "launchpad_config".into(),
                prior_state: vec![],
                proposed_state: cluster(),
                config: cluster(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(plan.diagnostics.is_empty());
        assert!(!plan.requires_replace);
        assert!(plan.changes.iter().any(|c| c.path == "spec"));

        let response = service
            .delete(tonic::Request::new(proto::DeleteRequest {
                resource_type: "launchpad_config".into(),
                current_state: plan.planned_state,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.diagnostics.is_empty());
        assert_eq!(installer.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_become_error_diagnostics() {
        let installer = RecordingInstaller::new().failing("exit status: 1");
        let service = service("0.1.0", &installer);

        let response = service
            .create(tonic::Request::new(proto::CreateRequest {
                resource_type: "launchpad_config".into(),
                planned_state: cluster(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.diagnostics[0].summary.contains("not been configured"));

        configure(&service).await;
        let response = service
            .create(tonic::Request::new(proto::CreateRequest {
                resource_type: "launchpad_config".into(),
                planned_state: cluster(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.state.is_empty());
        assert_eq!(response.diagnostics[0].summary, "Launchpad apply failed");
    }

    #[tokio::test]
    async fn test_import_rejected() {
        let service = service("test", &RecordingInstaller::new());
        let response = service
            .import_resource_state(tonic::Request::new(proto::ImportResourceStateRequest {
                resource_type: "launchpad_config".into(),
                id: "prod".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.imported.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
    }
}
