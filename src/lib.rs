//! Hemmer provider for Mirantis Launchpad
//!
//! Declares MKE/MCR/MSR cluster installations as infrastructure-as-code. The
//! provider turns a resource's attribute tree into a launchpad cluster
//! document and hands it to the `launchpad` installer, which does the actual
//! work over SSH or WinRM.
//!
//! # Overview
//!
//! - **Resources**: `launchpad_config` (nested blocks) and
//!   `launchpad_yaml_config` (a launchpad document as text)
//! - **Cluster model**: typed [`cluster::ClusterConfig`] that renders to
//!   launchpad YAML
//! - **Translation**: attribute tree to cluster config, with structural checks
//! - **Installer**: the [`installer::Installer`] trait and the
//!   [`installer::LaunchpadCli`] process runner
//! - **Plugin boundary**: [`ProviderService`] and the gRPC server helpers
//!
//! Read is a no-op: launchpad cannot discover an existing installation, so
//! stored state is trusted until the next apply. Import is rejected for the
//! same reason.
//!
//! # Testing mode
//!
//! When the provider reports version `test` (see
//! [`provider::VERSION_ENV`]), create, update and delete return a warning
//! instead of running launchpad.
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it outputs a handshake string to
//! stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. Logs go to stderr.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod diff;
pub mod error;
pub mod installer;
pub mod logging;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod translate;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use cluster::ClusterConfig;
pub use error::{ConfigError, InstallerError, ProviderError};
pub use installer::{ApplyOptions, Installer, LaunchpadCli};
pub use logging::{init_logging, init_logging_with_default, try_init_logging, LogSink};
pub use provider::LaunchpadProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_on, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, PlanResult, ProviderMetadata, ResourceResponse, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate};
