//! Managed hosts: role, connection, hooks and daemon overrides.

use super::scalar_string;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Keys a document sets that this model has no field for.
pub type Extra = BTreeMap<String, serde_yaml::Value>;

/// One machine managed by the installer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// What the host runs.
    pub role: Role,
    /// How the installer reaches the host.
    #[serde(flatten)]
    pub connection: Connection,
    /// Commands run around installer phases.
    #[serde(default, skip_serializing_if = "Hooks::is_empty")]
    pub hooks: Hooks,
    /// Container runtime daemon overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcr_config: Option<McrDaemonConfig>,
    /// Host keys without a dedicated field, passed through untouched.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Host {
    /// Create a host with no hooks or daemon overrides.
    pub fn new(role: Role, connection: Connection) -> Self {
        Self {
            role,
            connection,
            hooks: Hooks::default(),
            mcr_config: None,
            extra: Extra::new(),
        }
    }
}

/// Host role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runs the MKE control plane.
    Manager,
    /// Runs workloads.
    Worker,
    /// Runs the MSR registry.
    Msr,
}

impl Role {
    /// The role as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Worker => "worker",
            Self::Msr => "msr",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`Role`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Self::Manager),
            "worker" => Ok(Self::Worker),
            "msr" => Ok(Self::Msr),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Transport used to reach a host. Exactly one per host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Connection {
    /// SSH transport.
    #[serde(rename = "ssh")]
    Ssh(SshConnection),
    /// WinRM transport.
    #[serde(rename = "winRM")]
    WinRm(WinRmConnection),
}

impl Connection {
    /// The address the transport connects to.
    pub fn address(&self) -> &str {
        match self {
            Self::Ssh(ssh) => &ssh.address,
            Self::WinRm(winrm) => &winrm.address,
        }
    }
}

/// SSH connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConnection {
    /// Host address.
    #[serde(deserialize_with = "scalar_string")]
    pub address: String,
    /// Private key path on the machine running the installer.
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub key_path: String,
    /// Login user.
    #[serde(default = "default_ssh_user", deserialize_with = "scalar_string")]
    pub user: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

/// WinRM connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRmConnection {
    /// Host address.
    #[serde(deserialize_with = "scalar_string")]
    pub address: String,
    /// Login user.
    #[serde(default = "default_winrm_user", deserialize_with = "scalar_string")]
    pub user: String,
    /// Login password.
    #[serde(default, deserialize_with = "scalar_string")]
    pub password: String,
    /// WinRM port.
    #[serde(default = "default_winrm_port")]
    pub port: u16,
    /// Connect over HTTPS.
    #[serde(default = "default_true", rename = "useHTTPS")]
    pub use_https: bool,
    /// Skip certificate verification.
    #[serde(default = "default_true")]
    pub insecure: bool,
}

pub(crate) const DEFAULT_SSH_PORT: u16 = 22;
pub(crate) const DEFAULT_WINRM_PORT: u16 = 5985;

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_winrm_user() -> String {
    "Administrator".to_string()
}

fn default_winrm_port() -> u16 {
    DEFAULT_WINRM_PORT
}

fn default_true() -> bool {
    true
}

/// Installer phases that accept hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Around `launchpad apply`.
    Apply,
    /// Around `launchpad reset`.
    Reset,
}

/// Ordered shell commands run before and after a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCommands {
    /// Commands run before the phase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    /// Commands run after the phase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

impl HookCommands {
    /// Whether neither list has a command.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Per-host hooks keyed by phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
    /// Hooks for the apply phase.
    #[serde(default, skip_serializing_if = "HookCommands::is_empty")]
    pub apply: HookCommands,
    /// Hooks for the reset phase.
    #[serde(default, skip_serializing_if = "HookCommands::is_empty")]
    pub reset: HookCommands,
}

impl Hooks {
    /// Commands registered for `phase`.
    pub fn phase(&self, phase: HookPhase) -> &HookCommands {
        match phase {
            HookPhase::Apply => &self.apply,
            HookPhase::Reset => &self.reset,
        }
    }

    /// Mutable access to the commands for `phase`.
    pub fn phase_mut(&mut self, phase: HookPhase) -> &mut HookCommands {
        match phase {
            HookPhase::Apply => &mut self.apply,
            HookPhase::Reset => &mut self.reset,
        }
    }

    /// Whether no phase has any command.
    pub fn is_empty(&self) -> bool {
        self.apply.is_empty() && self.reset.is_empty()
    }
}

/// Container runtime daemon overrides (rendered into `daemon.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McrDaemonConfig {
    /// Enable daemon debug logging.
    #[serde(default)]
    pub debug: bool,
    /// Bridge IP in CIDR form.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bip: String,
    /// Address pools handed out to networks.
    #[serde(
        default,
        rename = "default-address-pools",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub default_address_pools: Vec<AddressPool>,
    /// Other daemon keys, passed through untouched.
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: Extra,
}

/// A network address pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    /// Pool base CIDR.
    pub base: String,
    /// Subnet prefix length carved from the pool.
    #[serde(default = "default_pool_size")]
    pub size: u8,
}

pub(crate) const DEFAULT_POOL_SIZE: u8 = 16;

fn default_pool_size() -> u8 {
    DEFAULT_POOL_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("manager".parse::<Role>(), Ok(Role::Manager));
        assert_eq!("msr".parse::<Role>(), Ok(Role::Msr));
        assert_eq!(
            "Manager".parse::<Role>(),
            Err(UnknownRole("Manager".to_string()))
        );
        assert_eq!(Role::Worker.to_string(), "worker");
    }

    #[test]
    fn test_hooks_by_phase() {
        let mut hooks = Hooks::default();
        assert!(hooks.is_empty());

        hooks.phase_mut(HookPhase::Apply).before.push("echo hi".to_string());
        assert!(!hooks.is_empty());
        assert_eq!(hooks.phase(HookPhase::Apply).before, vec!["echo hi"]);
        assert!(hooks.phase(HookPhase::Apply).after.is_empty());
        assert!(hooks.phase(HookPhase::Reset).is_empty());
    }

    #[test]
    fn test_connection_address() {
        let ssh = Connection::Ssh(SshConnection {
            address: "10.0.0.1".to_string(),
            key_path: String::new(),
            user: "root".to_string(),
            port: 22,
        });
        assert_eq!(ssh.address(), "10.0.0.1");
    }

    #[test]
    fn test_host_yaml_layout() {
        let yaml = r#"
role: worker
winRM:
  address: 10.0.0.9
  user: Administrator
  password: hunter2
imageDir: /var/images
mcrConfig:
  bip: 172.24.0.1/16
  default-address-pools:
    - base: 172.30.0.0/16
  log-driver: json-file
"#;
        let host: Host = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(host.role, Role::Worker);
        match &host.connection {
            Connection::WinRm(winrm) => {
                assert_eq!(winrm.port, 5985);
                assert!(winrm.use_https);
                assert!(winrm.insecure);
            },
            other => panic!("expected winrm, got {:?}", other),
        }
        assert!(host.extra.contains_key("imageDir"));

        let daemon = host.mcr_config.as_ref().unwrap();
        assert_eq!(daemon.default_address_pools[0].size, 16);
        assert!(daemon.other.contains_key("log-driver"));

        let rendered = serde_yaml::to_string(&host).unwrap();
        assert!(rendered.contains("winRM:"));
        assert!(rendered.contains("useHTTPS: true"));
        assert!(rendered.contains("imageDir: /var/images"));
        assert!(rendered.contains("log-driver: json-file"));
        assert!(!rendered.contains("hooks"));
    }

    #[test]
    fn test_numeric_connection_scalars() {
        let yaml = r#"
role: worker
winRM:
  address: 10.0.0.9
  user: 1001
  password: 123456
"#;
        let host: Host = serde_yaml::from_str(yaml).unwrap();
        match &host.connection {
            Connection::WinRm(winrm) => {
                assert_eq!(winrm.user, "1001");
                assert_eq!(winrm.password, "123456");
            },
            other => panic!("expected winrm, got {:?}", other),
        }

        let host: Host = serde_yaml::from_str("role: manager\nssh:\n  address: 42\n").unwrap();
        assert_eq!(host.connection.address(), "42");
    }

    #[test]
    fn test_empty_bip_is_omitted() {
        let daemon = McrDaemonConfig {
            debug: true,
            ..Default::default()
        };
        let rendered = serde_yaml::to_string(&daemon).unwrap();
        assert!(rendered.contains("debug: true"));
        assert!(!rendered.contains("bip"));
    }
}
