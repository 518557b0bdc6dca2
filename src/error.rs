//! Error types for the Launchpad provider.
//!
//! Three layers: [`ConfigError`] covers turning attribute trees or YAML into a
//! [`ClusterConfig`](crate::cluster::ClusterConfig) and checking it,
//! [`InstallerError`] covers the delegated `launchpad` run, and
//! [`ProviderError`] is what crosses the plugin boundary.

use crate::installer::InstallOperation;
use crate::schema::Diagnostic;
use thiserror::Error;

/// Errors that can occur while serving provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider is not configured or its configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The resource attributes could not be turned into a cluster config.
    #[error("Failed to build cluster config: {0}")]
    Translate(#[from] ConfigError),

    /// The cluster config was built but failed validation.
    #[error("Launchpad config validation failed: {0}")]
    InvalidCluster(#[source] ConfigError),

    /// The delegated installer failed.
    #[error("Launchpad {operation} failed: {source}")]
    Installer {
        /// Which installer operation failed.
        operation: InstallOperation,
        /// The underlying failure.
        #[source]
        source: InstallerError,
        /// Diagnostic detail: the error plus anything the installer logged.
        detail: String,
    },
}

impl ProviderError {
    /// Wrap an installer failure together with the log captured during the run.
    pub fn installer(operation: InstallOperation, source: InstallerError, log: &str) -> Self {
        let detail = if log.is_empty() {
            source.to_string()
        } else {
            format!("{}; {}", source, log)
        };
        Self::Installer {
            operation,
            source,
            detail,
        }
    }

    /// Append extra context to the detail of an installer failure.
    ///
    /// Other variants are returned unchanged.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            Self::Installer {
                operation,
                source,
                detail,
            } => Self::Installer {
                operation,
                source,
                detail: format!("{}\n\n{}", detail, context),
            },
            other => other,
        }
    }

    /// Convert into the user-facing diagnostic reported to the host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Translate(err) => {
                Diagnostic::error("Failed to build cluster config from resource configuration")
                    .with_detail(err.to_string())
            },
            Self::InvalidCluster(err) => {
                Diagnostic::error("Launchpad config validation failed").with_detail(err.to_string())
            },
            Self::Installer {
                operation, detail, ..
            } => Diagnostic::error(format!("Launchpad {} failed", operation)).with_detail(detail),
            other => Diagnostic::error(other.to_string()),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
            err @ (ProviderError::Translate(_) | ProviderError::InvalidCluster(_)) => {
                tonic::Status::invalid_argument(err.to_string())
            },
            err @ ProviderError::Installer { .. } => tonic::Status::aborted(err.to_string()),
        }
    }
}

/// Errors building or checking a cluster configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A host has neither an `ssh` nor a `winrm` block.
    #[error("host {host}: missing connection block, one of ssh or winrm is required")]
    MissingConnectionBlock {
        /// Index of the host in the host list.
        host: usize,
    },

    /// A host has both an `ssh` and a `winrm` block.
    #[error("host {host}: only one of ssh or winrm may be set")]
    MultipleConnectionBlocks {
        /// Index of the host in the host list.
        host: usize,
    },

    /// A host role is not one of manager, worker or msr.
    #[error("host {host}: unknown role '{role}', expected manager, worker or msr")]
    UnknownRole {
        /// Index of the host in the host list.
        host: usize,
        /// The role as written.
        role: String,
    },

    /// At least one host has the msr role but there is no MSR block.
    #[error("MSR hosts were provided, but there is no MSR configuration.")]
    MsrHostsWithoutConfig,

    /// An MSR block is present but no host has the msr role.
    #[error("MSR config passed without hosts")]
    MsrConfigWithoutHosts,

    /// The attribute tree does not have the expected shape.
    #[error("malformed resource attributes: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The cluster name is empty.
    #[error("metadata.name must not be empty")]
    EmptyName,

    /// The host list is empty.
    #[error("at least one host is required")]
    NoHosts,

    /// No host has the manager role.
    #[error("at least one host must have the manager role")]
    NoManager,

    /// A product version is empty.
    #[error("{0} version must not be empty")]
    EmptyVersion(&'static str),

    /// A host connection has an empty address.
    #[error("host {host}: connection address must not be empty")]
    EmptyAddress {
        /// Index of the host in the host list.
        host: usize,
    },

    /// The launchpad YAML document could not be parsed.
    #[error("invalid launchpad yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The YAML document describes a product this provider does not install.
    #[error("unsupported product: apiVersion '{api_version}', kind '{kind}'")]
    UnsupportedProduct {
        /// The document's `apiVersion`.
        api_version: String,
        /// The document's `kind`.
        kind: String,
    },
}

/// Errors raised by the delegated installer.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The installer binary could not be started.
    #[error("failed to start {binary}: {source}")]
    Spawn {
        /// The binary that was invoked.
        binary: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while preparing the run or reading its output.
    #[error("installer i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The installer ran and reported failure.
    #[error("launchpad {operation} exited with {status}")]
    Failed {
        /// Which operation failed.
        operation: InstallOperation,
        /// Exit status as reported by the OS.
        status: String,
    },

    /// The installer did not finish in time and was killed.
    #[error("launchpad {operation} timed out after {}s", .timeout.as_secs())]
    TimedOut {
        /// Which operation timed out.
        operation: InstallOperation,
        /// The limit that was exceeded.
        timeout: std::time::Duration,
    },

    /// The cluster config could not be rendered for the installer.
    #[error("failed to render cluster config: {0}")]
    Render(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("custom_resource".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: custom_resource");

        let err = ProviderError::Translate(ConfigError::MissingConnectionBlock { host: 2 });
        assert_eq!(
            format!("{}", err),
            "Failed to build cluster config: host 2: missing connection block, one of ssh or winrm is required"
        );
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = ProviderError::Validation("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Configuration("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::Unimplemented("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Unimplemented);

        let status: tonic::Status = ProviderError::InvalidCluster(ConfigError::NoHosts).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let err = ProviderError::installer(
            InstallOperation::Reset,
            InstallerError::TimedOut {
                operation: InstallOperation::Reset,
                timeout: Duration::from_secs(60),
            },
            "",
        );
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::Aborted);
    }

    #[test]
    fn test_msr_messages() {
        assert_eq!(
            ConfigError::MsrHostsWithoutConfig.to_string(),
            "MSR hosts were provided, but there is no MSR configuration."
        );
        assert_eq!(
            ConfigError::MsrConfigWithoutHosts.to_string(),
            "MSR config passed without hosts"
        );
    }

    #[test]
    fn test_installer_error_carries_log() {
        let err = ProviderError::installer(
            InstallOperation::Apply,
            InstallerError::Failed {
                operation: InstallOperation::Apply,
                status: "exit status: 1".to_string(),
            },
            "level=error msg=\"ssh: handshake failed\"",
        );

        let diag = err.to_diagnostic();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "Launchpad apply failed");
        assert_eq!(
            diag.detail.as_deref(),
            Some("launchpad apply exited with exit status: 1; level=error msg=\"ssh: handshake failed\"")
        );
    }

    #[test]
    fn test_installer_error_without_log() {
        let err = ProviderError::installer(
            InstallOperation::Reset,
            InstallerError::TimedOut {
                operation: InstallOperation::Reset,
                timeout: Duration::from_secs(600),
            },
            "",
        );

        let diag = err.to_diagnostic();
        assert_eq!(diag.summary, "Launchpad reset failed");
        assert_eq!(
            diag.detail.as_deref(),
            Some("launchpad reset timed out after 600s")
        );
    }

    #[test]
    fn test_with_context_only_touches_installer_errors() {
        let err = ProviderError::installer(
            InstallOperation::Apply,
            InstallerError::Failed {
                operation: InstallOperation::Apply,
                status: "exit status: 2".to_string(),
            },
            "",
        )
        .with_context("apiVersion: launchpad.mirantis.com/mke/v1.4");

        let detail = err.to_diagnostic().detail.unwrap_or_default();
        assert!(detail.starts_with("launchpad apply exited with exit status: 2"));
        assert!(detail.ends_with("apiVersion: launchpad.mirantis.com/mke/v1.4"));

        let err = ProviderError::Validation("x".to_string()).with_context("ignored");
        assert_eq!(err.to_diagnostic().summary, "Validation error: x");
        assert_eq!(err.to_diagnostic().detail, None);
    }

    #[test]
    fn test_config_diagnostics() {
        let diag = ProviderError::Translate(ConfigError::UnknownRole {
            host: 0,
            role: "boss".to_string(),
        })
        .to_diagnostic();
        assert_eq!(
            diag.summary,
            "Failed to build cluster config from resource configuration"
        );
        assert_eq!(
            diag.detail.as_deref(),
            Some("host 0: unknown role 'boss', expected manager, worker or msr")
        );

        let diag = ProviderError::InvalidCluster(ConfigError::NoManager).to_diagnostic();
        assert_eq!(diag.summary, "Launchpad config validation failed");
    }
}
