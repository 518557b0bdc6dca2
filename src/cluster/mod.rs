//! The cluster configuration handed to the installer.
//!
//! [`ClusterConfig`] mirrors the launchpad cluster document
//! (`apiVersion: launchpad.mirantis.com/mke/v1.4`, `kind: mke`). Both resource
//! types build one: `launchpad_config` from its nested attributes and
//! `launchpad_yaml_config` by parsing the document directly (see [`yaml`]).

mod host;
mod product;
pub mod yaml;

pub use host::{
    AddressPool, Connection, Extra, HookCommands, HookPhase, Hooks, Host, McrDaemonConfig, Role,
    SshConnection, UnknownRole, WinRmConnection,
};
pub use product::{Flags, McrConfig, MkeCloud, MkeConfig, MsrConfig};

pub(crate) use host::{DEFAULT_POOL_SIZE, DEFAULT_SSH_PORT, DEFAULT_WINRM_PORT};
pub(crate) use product::{
    DEFAULT_ADMIN_USERNAME, DEFAULT_IMAGE_REPO, DEFAULT_MCR_CHANNEL,
    DEFAULT_MCR_INSTALL_URL_LINUX, DEFAULT_MCR_INSTALL_URL_WINDOWS, DEFAULT_MCR_REPO_URL,
    DEFAULT_REPLICA_IDS,
};

use crate::error::ConfigError;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `apiVersion` written into rendered documents.
pub const API_VERSION: &str = "launchpad.mirantis.com/mke/v1.4";

/// `kind` of an MKE cluster document.
pub const KIND: &str = "mke";

const REDACTED: &str = "<redacted>";

/// A complete cluster definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Document schema version.
    pub api_version: String,
    /// Product kind.
    pub kind: String,
    /// Cluster identity.
    pub metadata: Metadata,
    /// Everything the installer acts on.
    pub spec: Spec,
}

impl ClusterConfig {
    /// Create an MKE cluster document with the current `apiVersion`.
    pub fn new(name: impl Into<String>, spec: Spec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: Metadata { name: name.into() },
            spec,
        }
    }

    /// Check the structural rules the installer relies on.
    ///
    /// The first violation found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metadata.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let hosts = &self.spec.hosts;
        if hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        if self.hosts_with_role(Role::Manager).next().is_none() {
            return Err(ConfigError::NoManager);
        }
        if let Some(host) = hosts
            .iter()
            .position(|h| h.connection.address().trim().is_empty())
        {
            return Err(ConfigError::EmptyAddress { host });
        }

        if self.spec.mcr.version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion("mcr"));
        }
        if self.spec.mke.version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion("mke"));
        }

        let has_msr_hosts = self.hosts_with_role(Role::Msr).next().is_some();
        match (&self.spec.msr, has_msr_hosts) {
            (None, true) => Err(ConfigError::MsrHostsWithoutConfig),
            (Some(_), false) => Err(ConfigError::MsrConfigWithoutHosts),
            (Some(msr), true) if msr.version.trim().is_empty() => {
                Err(ConfigError::EmptyVersion("msr"))
            },
            _ => Ok(()),
        }
    }

    /// A copy with passwords blanked, safe to show in diagnostics.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.spec.mke.admin_password.is_empty() {
            copy.spec.mke.admin_password = REDACTED.to_string();
        }
        for host in &mut copy.spec.hosts {
            if let Connection::WinRm(winrm) = &mut host.connection {
                if !winrm.password.is_empty() {
                    winrm.password = REDACTED.to_string();
                }
            }
        }
        copy
    }

    /// Hosts with the given role.
    pub fn hosts_with_role(&self, role: Role) -> impl Iterator<Item = &Host> {
        self.spec.hosts.iter().filter(move |h| h.role == role)
    }
}

/// Cluster identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Cluster name.
    pub name: String,
}

/// Cluster-wide settings, hosts and products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Machines in the cluster.
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// Container runtime.
    #[serde(default)]
    pub mcr: McrConfig,
    /// Kubernetes engine.
    #[serde(default)]
    pub mke: MkeConfig,
    /// Registry, only when some host has the msr role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msr: Option<MsrConfig>,
    /// Cluster-wide options.
    #[serde(default)]
    pub cluster: ClusterOptions,
    /// Keys without a dedicated field.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

/// Cluster-wide options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Remove hosts that are no longer listed.
    #[serde(default)]
    pub prune: bool,
}

/// Accept any YAML scalar as a string.
///
/// Structs with flattened members see their fields already typed, so
/// `password: 123456` arrives as an integer rather than as text.
pub(crate) fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScalarString;

    impl Visitor<'_> for ScalarString {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(ScalarString)
}
