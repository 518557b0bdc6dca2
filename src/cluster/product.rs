//! Product configuration for MCR, MKE and MSR.

use super::host::Extra;
use super::scalar_string;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(crate) const DEFAULT_MCR_CHANNEL: &str = "stable";
pub(crate) const DEFAULT_MCR_REPO_URL: &str = "https://repos.mirantis.com";
pub(crate) const DEFAULT_MCR_INSTALL_URL_LINUX: &str = "https://get.mirantis.com/";
pub(crate) const DEFAULT_MCR_INSTALL_URL_WINDOWS: &str = "https://get.mirantis.com/install.ps1";
pub(crate) const DEFAULT_IMAGE_REPO: &str = "docker.io/mirantis";
pub(crate) const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub(crate) const DEFAULT_REPLICA_IDS: &str = "sequential";

/// Command line flags handed to a product installer.
///
/// Order is kept and duplicates are allowed; the installer sees them exactly
/// as listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(Vec<String>);

impl Flags {
    /// Create an empty flag list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a flag.
    pub fn push(&mut self, flag: impl Into<String>) {
        self.0.push(flag.into());
    }

    /// Whether there are no flags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the flags in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for Flags {
    fn from(flags: Vec<String>) -> Self {
        Self(flags)
    }
}

impl<S: Into<String>> FromIterator<S> for Flags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Mirantis Container Runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McrConfig {
    /// Engine version.
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Release channel.
    pub channel: String,
    /// Package repository.
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Install script for Linux hosts.
    #[serde(rename = "installURLLinux")]
    pub install_url_linux: String,
    /// Install script for Windows hosts.
    #[serde(rename = "installURLWindows")]
    pub install_url_windows: String,
    /// Keys without a dedicated field.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Default for McrConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            channel: DEFAULT_MCR_CHANNEL.to_string(),
            repo_url: DEFAULT_MCR_REPO_URL.to_string(),
            install_url_linux: DEFAULT_MCR_INSTALL_URL_LINUX.to_string(),
            install_url_windows: DEFAULT_MCR_INSTALL_URL_WINDOWS.to_string(),
            extra: Extra::new(),
        }
    }
}

/// Mirantis Kubernetes Engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MkeConfig {
    /// MKE version.
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Registry the MKE images are pulled from.
    pub image_repo: String,
    /// Initial admin user.
    #[serde(deserialize_with = "scalar_string")]
    pub admin_username: String,
    /// Initial admin password.
    #[serde(deserialize_with = "scalar_string")]
    pub admin_password: String,
    /// License file on the machine running the installer.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license_file_path: String,
    /// Flags for `mke install`.
    #[serde(skip_serializing_if = "Flags::is_empty")]
    pub install_flags: Flags,
    /// Flags for `mke upgrade`.
    #[serde(skip_serializing_if = "Flags::is_empty")]
    pub upgrade_flags: Flags,
    /// Raw MKE configuration (TOML) applied after install.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub config_data: String,
    /// Cloud provider integration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud: Option<MkeCloud>,
    /// Keys without a dedicated field.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Default for MkeConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            image_repo: DEFAULT_IMAGE_REPO.to_string(),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: String::new(),
            license_file_path: String::new(),
            install_flags: Flags::new(),
            upgrade_flags: Flags::new(),
            config_data: String::new(),
            cloud: None,
            extra: Extra::new(),
        }
    }
}

/// MKE cloud provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MkeCloud {
    /// Cloud provider name.
    pub provider: String,
    /// Provider configuration file contents.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub config_data: String,
}

/// Mirantis Secure Registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MsrConfig {
    /// MSR version.
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Registry the MSR images are pulled from.
    pub image_repo: String,
    /// Replica id strategy.
    #[serde(rename = "replicaIDs")]
    pub replica_ids: String,
    /// Flags for `msr install`.
    #[serde(skip_serializing_if = "Flags::is_empty")]
    pub install_flags: Flags,
    /// Flags for `msr upgrade`.
    #[serde(skip_serializing_if = "Flags::is_empty")]
    pub upgrade_flags: Flags,
    /// Keys without a dedicated field.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Default for MsrConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            image_repo: DEFAULT_IMAGE_REPO.to_string(),
            replica_ids: DEFAULT_REPLICA_IDS.to_string(),
            install_flags: Flags::new(),
            upgrade_flags: Flags::new(),
            extra: Extra::new(),
        }
    }
}
