//! Attribute tree to [`ClusterConfig`] translation for `launchpad_config`.
//!
//! The resource schema and the serde models that read it live together here
//! so they cannot drift apart. Translation always works on a tree with
//! schema defaults applied, and list-shaped single blocks (`msr`, `ssh`,
//! `hooks`, ...) are collapsed into the typed cluster model.

use crate::cluster::{
    AddressPool, ClusterConfig, ClusterOptions, Connection, Extra, HookCommands, Hooks, Host,
    McrConfig, McrDaemonConfig, MkeCloud, MkeConfig, MsrConfig, Role, Spec, SshConnection,
    UnknownRole, WinRmConnection, DEFAULT_ADMIN_USERNAME, DEFAULT_IMAGE_REPO,
    DEFAULT_MCR_CHANNEL, DEFAULT_MCR_INSTALL_URL_LINUX, DEFAULT_MCR_INSTALL_URL_WINDOWS,
    DEFAULT_MCR_REPO_URL, DEFAULT_POOL_SIZE, DEFAULT_REPLICA_IDS, DEFAULT_SSH_PORT,
    DEFAULT_WINRM_PORT,
};
use crate::error::ConfigError;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Resource type name.
pub const RESOURCE_TYPE: &str = "launchpad_config";

/// Schema of the `launchpad_config` resource.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("A Mirantis Launchpad cluster (MCR, MKE and optionally MSR)")
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("The cluster name"),
        )
        .with_attribute(
            "last_updated",
            Attribute::computed_string().with_description("When the cluster was last applied"),
        )
        .with_attribute(
            "skip_destroy",
            Attribute::bool_with_default(false)
                .with_description("Leave the cluster running when the resource is destroyed"),
        )
        .with_block(
            "metadata",
            NestedBlock::required_single(
                Block::new().with_attribute("name", Attribute::required_string()),
            ),
        )
        .with_block("spec", NestedBlock::required_single(spec_block()))
}

fn spec_block() -> Block {
    Block::new()
        .with_block(
            "cluster",
            NestedBlock::single(
                Block::new().with_attribute(
                    "prune",
                    Attribute::bool_with_default(false)
                        .with_description("Remove hosts that are no longer listed"),
                ),
            ),
        )
        .with_block("mcr", NestedBlock::required_single(mcr_block()))
        .with_block("mke", NestedBlock::required_single(mke_block()))
        .with_block("msr", NestedBlock::list(msr_block()).with_max_items(1))
        .with_block("host", NestedBlock::list(host_block()).with_min_items(1))
}

fn mcr_block() -> Block {
    Block::new()
        .with_description("Mirantis Container Runtime")
        .with_attribute("version", Attribute::required_string())
        .with_attribute("channel", Attribute::string_with_default(DEFAULT_MCR_CHANNEL))
        .with_attribute("repo_url", Attribute::string_with_default(DEFAULT_MCR_REPO_URL))
        .with_attribute(
            "install_url_linux",
            Attribute::string_with_default(DEFAULT_MCR_INSTALL_URL_LINUX),
        )
        .with_attribute(
            "install_url_windows",
            Attribute::string_with_default(DEFAULT_MCR_INSTALL_URL_WINDOWS),
        )
}

fn mke_block() -> Block {
    Block::new()
        .with_description("Mirantis Kubernetes Engine")
        .with_attribute("version", Attribute::required_string())
        .with_attribute("image_repo", Attribute::string_with_default(DEFAULT_IMAGE_REPO))
        .with_attribute(
            "admin_username",
            Attribute::string_with_default(DEFAULT_ADMIN_USERNAME),
        )
        .with_attribute("admin_password", Attribute::required_string().sensitive())
        .with_attribute("license_file_path", Attribute::string_with_default(""))
        .with_attribute("install_flags", Attribute::optional_string_list())
        .with_attribute("upgrade_flags", Attribute::optional_string_list())
        .with_attribute(
            "config_data",
            Attribute::string_with_default("").with_description("MKE configuration TOML"),
        )
        .with_block(
            "cloud",
            NestedBlock::single(
                Block::new()
                    .with_attribute("provider", Attribute::required_string())
                    .with_attribute("config_data", Attribute::string_with_default("")),
            ),
        )
}

fn msr_block() -> Block {
    Block::new()
        .with_description("Mirantis Secure Registry")
        .with_attribute("version", Attribute::required_string())
        .with_attribute("image_repo", Attribute::string_with_default(DEFAULT_IMAGE_REPO))
        .with_attribute("replica_ids", Attribute::string_with_default(DEFAULT_REPLICA_IDS))
        .with_attribute("install_flags", Attribute::optional_string_list())
        .with_attribute("upgrade_flags", Attribute::optional_string_list())
}

fn host_block() -> Block {
    let hook_commands = || {
        NestedBlock::list(
            Block::new()
                .with_attribute("before", Attribute::optional_string_list())
                .with_attribute("after", Attribute::optional_string_list()),
        )
        .with_max_items(1)
    };

    Block::new()
        .with_attribute(
            "role",
            Attribute::required_string().with_description("One of manager, worker or msr"),
        )
        .with_block(
            "hooks",
            NestedBlock::list(
                Block::new()
                    .with_block("apply", hook_commands())
                    .with_block("reset", hook_commands()),
            )
            .with_max_items(1),
        )
        .with_block(
            "mcr_config",
            NestedBlock::list(
                Block::new()
                    .with_attribute("debug", Attribute::bool_with_default(false))
                    .with_attribute("bip", Attribute::string_with_default(""))
                    .with_block(
                        "default_address_pools",
                        NestedBlock::list(
                            Block::new()
                                .with_attribute("base", Attribute::required_string())
                                .with_attribute(
                                    "size",
                                    Attribute::int64_with_default(i64::from(DEFAULT_POOL_SIZE)),
                                ),
                        ),
                    ),
            )
            .with_max_items(1),
        )
        .with_block(
            "ssh",
            NestedBlock::list(
                Block::new()
                    .with_attribute("address", Attribute::required_string())
                    .with_attribute("key_path", Attribute::required_string())
                    .with_attribute("user", Attribute::required_string())
                    .with_attribute(
                        "port",
                        Attribute::int64_with_default(i64::from(DEFAULT_SSH_PORT)),
                    ),
            )
            .with_max_items(1),
        )
        .with_block(
            "winrm",
            NestedBlock::list(
                Block::new()
                    .with_attribute("address", Attribute::required_string())
                    .with_attribute("user", Attribute::required_string())
                    .with_attribute("password", Attribute::required_string().sensitive())
                    .with_attribute(
                        "port",
                        Attribute::int64_with_default(i64::from(DEFAULT_WINRM_PORT)),
                    )
                    .with_attribute("use_https", Attribute::bool_with_default(true))
                    .with_attribute("insecure", Attribute::bool_with_default(true)),
            )
            .with_max_items(1),
        )
}

/// Null and absent both mean "empty" in a state tree.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The parts of a `launchpad_config` state that describe the cluster.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ConfigModel {
    /// Cluster identity.
    pub metadata: MetadataModel,
    /// Cluster contents.
    pub spec: SpecModel,
}

impl ConfigModel {
    /// Decode a state tree, filling schema defaults first.
    pub fn from_state(state: &Value) -> Result<Self, ConfigError> {
        let filled = schema().with_defaults(state);
        Ok(serde_json::from_value(filled)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct MetadataModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct SpecModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster: Option<ClusterModel>,
    pub mcr: McrModel,
    pub mke: MkeModel,
    #[serde(default, deserialize_with = "null_as_default")]
    pub msr: Vec<MsrModel>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub host: Vec<HostModel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ClusterModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub prune: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct McrModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub channel: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repo_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub install_url_linux: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub install_url_windows: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct MkeModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_repo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub admin_username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub admin_password: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub license_file_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub install_flags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub upgrade_flags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config_data: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cloud: Option<MkeCloudModel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct MkeCloudModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config_data: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct MsrModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_repo: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub replica_ids: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub install_flags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub upgrade_flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct HostModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hooks: Vec<HooksModel>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mcr_config: Vec<McrConfigModel>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ssh: Vec<SshModel>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub winrm: Vec<WinRmModel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct HooksModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub apply: Vec<HookCommandsModel>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reset: Vec<HookCommandsModel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct HookCommandsModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub before: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct McrConfigModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub debug: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub default_address_pools: Vec<AddressPoolModel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct AddressPoolModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub base: String,
    pub size: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct SshModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct WinRmModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub password: String,
    pub port: u16,
    pub use_https: bool,
    pub insecure: bool,
}

/// Build the cluster config described by a `launchpad_config` state tree.
///
/// Fails on the first host with a missing or doubled connection block or an
/// unknown role; nothing is returned for a partially valid tree. Cross-host
/// rules (MSR hosts and MSR config agree, a manager exists) are left to
/// [`ClusterConfig::validate`].
pub fn cluster_config(state: &Value) -> Result<ClusterConfig, ConfigError> {
    ConfigModel::from_state(state)?.into_cluster_config()
}

impl ConfigModel {
    /// Convert into the typed cluster config.
    pub fn into_cluster_config(self) -> Result<ClusterConfig, ConfigError> {
        let SpecModel {
            cluster,
            mcr,
            mke,
            msr,
            host,
        } = self.spec;

        let hosts = host
            .into_iter()
            .enumerate()
            .map(|(index, host)| host.into_host(index))
            .collect::<Result<Vec<_>, _>>()?;

        let spec = Spec {
            hosts,
            mcr: mcr.into(),
            mke: mke.into(),
            msr: msr.into_iter().next().map(Into::into),
            cluster: ClusterOptions {
                prune: cluster.is_some_and(|c| c.prune),
            },
            extra: Extra::new(),
        };

        Ok(ClusterConfig::new(self.metadata.name, spec))
    }
}

impl HostModel {
    fn into_host(self, index: usize) -> Result<Host, ConfigError> {
        let role: Role = self
            .role
            .parse()
            .map_err(|UnknownRole(role)| ConfigError::UnknownRole { host: index, role })?;

        if self.ssh.len() + self.winrm.len() > 1 {
            return Err(ConfigError::MultipleConnectionBlocks { host: index });
        }
        let connection = match (self.ssh.into_iter().next(), self.winrm.into_iter().next()) {
            (Some(ssh), _) => Connection::Ssh(SshConnection {
                address: ssh.address,
                key_path: ssh.key_path,
                user: ssh.user,
                port: ssh.port,
            }),
            (None, Some(winrm)) => Connection::WinRm(WinRmConnection {
                address: winrm.address,
                user: winrm.user,
                password: winrm.password,
                port: winrm.port,
                use_https: winrm.use_https,
                insecure: winrm.insecure,
            }),
            (None, None) => return Err(ConfigError::MissingConnectionBlock { host: index }),
        };

        let hooks = self
            .hooks
            .into_iter()
            .next()
            .map(|hooks| Hooks {
                apply: first_commands(hooks.apply),
                reset: first_commands(hooks.reset),
            })
            .unwrap_or_default();

        let mcr_config = self
            .mcr_config
            .into_iter()
            .next()
            .map(|daemon| McrDaemonConfig {
                debug: daemon.debug,
                bip: daemon.bip,
                default_address_pools: daemon
                    .default_address_pools
                    .into_iter()
                    .map(|pool| AddressPool {
                        base: pool.base,
                        size: pool.size,
                    })
                    .collect(),
                other: Extra::new(),
            });

        Ok(Host {
            role,
            connection,
            hooks,
            mcr_config,
            extra: Extra::new(),
        })
    }
}

fn first_commands(phases: Vec<HookCommandsModel>) -> HookCommands {
    phases
        .into_iter()
        .next()
        .map(|phase| HookCommands {
            before: phase.before,
            after: phase.after,
        })
        .unwrap_or_default()
}

impl From<McrModel> for McrConfig {
    fn from(mcr: McrModel) -> Self {
        Self {
            version: mcr.version,
            channel: mcr.channel,
            repo_url: mcr.repo_url,
            install_url_linux: mcr.install_url_linux,
            install_url_windows: mcr.install_url_windows,
            extra: Extra::new(),
        }
    }
}

impl From<MkeModel> for MkeConfig {
    fn from(mke: MkeModel) -> Self {
        Self {
            version: mke.version,
            image_repo: mke.image_repo,
            admin_username: mke.admin_username,
            admin_password: mke.admin_password,
            license_file_path: mke.license_file_path,
            install_flags: mke.install_flags.into(),
            upgrade_flags: mke.upgrade_flags.into(),
            config_data: mke.config_data,
            cloud: mke.cloud.map(|cloud| MkeCloud {
                provider: cloud.provider,
                config_data: cloud.config_data,
            }),
            extra: Extra::new(),
        }
    }
}

impl From<MsrModel> for MsrConfig {
    fn from(msr: MsrModel) -> Self {
        Self {
            version: msr.version,
            image_repo: msr.image_repo,
            replica_ids: msr.replica_ids,
            install_flags: msr.install_flags.into(),
            upgrade_flags: msr.upgrade_flags.into(),
            extra: Extra::new(),
        }
    }
}
