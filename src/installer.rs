//! The delegated installer.
//!
//! Installing, upgrading and tearing down a cluster is done by the
//! `launchpad` binary. [`LaunchpadCli`] renders the cluster document to a
//! private temporary file and runs the binary against it; its output is
//! relayed line by line into the caller's [`LogSink`].

use crate::cluster::{yaml, ClusterConfig};
use crate::error::InstallerError;
use crate::logging::LogSink;
use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, instrument, warn};

/// Default bound on a whole apply run.
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How long a single output line may wait for the relay before it is dropped.
pub const DEFAULT_LINE_TIMEOUT: Duration = Duration::from_secs(30);

const LINE_BUFFER: usize = 256;

/// Installer entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallOperation {
    /// Install or upgrade to the desired state.
    Apply,
    /// Tear the cluster down.
    Reset,
}

impl InstallOperation {
    /// The `launchpad` subcommand.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for InstallOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`Installer::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Continue past failed pre-flight checks.
    pub force: bool,
    /// Ask the installer for debug output.
    pub verbose: bool,
    /// Bound on the whole run.
    pub timeout: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            force: false,
            verbose: false,
            timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }
}

/// Something that can converge and tear down a cluster.
///
/// Implementations record what they print into `sink`; on failure the caller
/// attaches the sink contents to the error it reports.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install or upgrade the cluster to match `config`.
    async fn apply(
        &self,
        config: &ClusterConfig,
        options: &ApplyOptions,
        sink: &LogSink,
    ) -> Result<(), InstallerError>;

    /// Tear down the cluster described by `config`.
    async fn reset(&self, config: &ClusterConfig, sink: &LogSink) -> Result<(), InstallerError>;
}

/// Runs the `launchpad` command line tool.
#[derive(Debug, Clone)]
pub struct LaunchpadCli {
    binary: PathBuf,
    disable_telemetry: bool,
    reset_timeout: Duration,
    line_timeout: Duration,
}

impl LaunchpadCli {
    /// Use the given binary (a path, or a name looked up on `PATH`).
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            disable_telemetry: true,
            reset_timeout: DEFAULT_APPLY_TIMEOUT,
            line_timeout: DEFAULT_LINE_TIMEOUT,
        }
    }

    /// Pass `--disable-telemetry` to every run.
    pub fn with_disable_telemetry(mut self, disable: bool) -> Self {
        self.disable_telemetry = disable;
        self
    }

    /// Bound on a reset run.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// How long one output line may wait for the relay.
    pub fn with_line_timeout(mut self, timeout: Duration) -> Self {
        self.line_timeout = timeout;
        self
    }

    /// The binary this runs.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn args(
        &self,
        operation: InstallOperation,
        config_path: &Path,
        force: bool,
        verbose: bool,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.disable_telemetry {
            args.push("--disable-telemetry".into());
        }
        if verbose {
            args.push("--debug".into());
        }
        args.push(operation.as_str().into());
        args.push("--config".into());
        args.push(config_path.as_os_str().to_owned());
        if force {
            args.push("--force".into());
        }
        args
    }

    async fn run(
        &self,
        operation: InstallOperation,
        config: &ClusterConfig,
        force: bool,
        verbose: bool,
        timeout: Duration,
        sink: &LogSink,
    ) -> Result<(), InstallerError> {
        let rendered = yaml::to_yaml(config)?;
        let mut file = tempfile::Builder::new()
            .prefix("launchpad-")
            .suffix(".yaml")
            .tempfile()?;
        file.write_all(rendered.as_bytes())?;
        file.flush()?;

        let args = self.args(operation, file.path(), force, verbose);
        debug!(binary = %self.binary.display(), ?args, "Running launchpad");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InstallerError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone(), self.line_timeout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone(), self.line_timeout));
        }
        drop(tx);

        let relay_sink = sink.clone();
        let relay = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                relay_sink.record(line);
            }
        });

        let outcome = tokio::time::timeout(timeout, child.wait()).await;
        if outcome.is_err() {
            if let Err(err) = child.kill().await {
                warn!(error = %err, "Failed to kill timed out launchpad process");
            }
        }

        // The readers end once the pipes close; don't let a stray holder of
        // the pipe keep the call alive.
        if tokio::time::timeout(self.line_timeout, relay).await.is_err() {
            warn!("Installer output relay did not finish, some lines may be missing");
        }

        let status = match outcome {
            Ok(status) => status?,
            Err(_) => return Err(InstallerError::TimedOut { operation, timeout }),
        };

        if status.success() {
            info!(%operation, "launchpad finished");
            Ok(())
        } else {
            Err(InstallerError::Failed {
                operation,
                status: status.to_string(),
            })
        }
    }
}

impl Default for LaunchpadCli {
    fn default() -> Self {
        Self::new("launchpad")
    }
}

#[async_trait]
impl Installer for LaunchpadCli {
    #[instrument(skip_all, fields(cluster = %config.metadata.name))]
    async fn apply(
        &self,
        config: &ClusterConfig,
        options: &ApplyOptions,
        sink: &LogSink,
    ) -> Result<(), InstallerError> {
        self.run(
            InstallOperation::Apply,
            config,
            options.force,
            options.verbose,
            options.timeout,
            sink,
        )
        .await
    }

    #[instrument(skip_all, fields(cluster = %config.metadata.name))]
    async fn reset(&self, config: &ClusterConfig, sink: &LogSink) -> Result<(), InstallerError> {
        // reset asks for confirmation unless forced
        self.run(
            InstallOperation::Reset,
            config,
            true,
            false,
            self.reset_timeout,
            sink,
        )
        .await
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>, line_timeout: Duration)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match tx.send_timeout(line, line_timeout).await {
                Ok(()) => {},
                Err(SendTimeoutError::Timeout(line)) => {
                    warn!(%line, "Dropped installer output line, relay is not keeping up");
                },
                Err(SendTimeoutError::Closed(_)) => break,
            },
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "Failed to read installer output");
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Connection, Host, McrConfig, MkeConfig, Role, Spec, SshConnection};

    fn config() -> ClusterConfig {
        ClusterConfig::new(
            "test",
            Spec {
                hosts: vec![Host::new(
                    Role::Manager,
                    Connection::Ssh(SshConnection {
                        address: "10.0.0.1".to_string(),
                        key_path: String::new(),
                        user: "root".to_string(),
                        port: 22,
                    }),
                )],
                mcr: McrConfig {
                    version: "23.0.8".to_string(),
                    ..Default::default()
                },
                mke: MkeConfig {
                    version: "3.7.3".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_apply_args() {
        let cli = LaunchpadCli::default();
        let args = cli.args(
            InstallOperation::Apply,
            Path::new("/tmp/c.yaml"),
            true,
            true,
        );
        assert_eq!(
            args,
            vec![
                "--disable-telemetry",
                "--debug",
                "apply",
                "--config",
                "/tmp/c.yaml",
                "--force"
            ]
        );

        let cli = LaunchpadCli::new("/opt/launchpad").with_disable_telemetry(false);
        let args = cli.args(
            InstallOperation::Reset,
            Path::new("/tmp/c.yaml"),
            true,
            false,
        );
        assert_eq!(args, vec!["reset", "--config", "/tmp/c.yaml", "--force"]);
        assert_eq!(cli.binary(), Path::new("/opt/launchpad"));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(InstallOperation::Apply.to_string(), "apply");
        assert_eq!(InstallOperation::Reset.to_string(), "reset");
        assert_eq!(ApplyOptions::default().timeout, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = LaunchpadCli::new("/nonexistent/launchpad-binary");
        let sink = LogSink::new();

        let err = cli
            .apply(&config(), &ApplyOptions::default(), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallerError::Spawn { .. }));
        assert!(sink.is_empty());
    }

    #[cfg(unix)]
    mod script {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_launchpad(dir: &tempfile::TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("launchpad");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_apply_relays_output() {
            let dir = tempfile::tempdir().unwrap();
            let cli = LaunchpadCli::new(fake_launchpad(
                &dir,
                "echo \"INFO[0000] args: $*\"\necho \"WARN[0001] slow host\" >&2",
            ));
            let sink = LogSink::new();

            cli.apply(&config(), &ApplyOptions::default(), &sink)
                .await
                .unwrap();

            let log = sink.contents();
            assert!(log.contains("args: --disable-telemetry apply --config"));
            assert!(log.contains("WARN[0001] slow host"));
        }

        #[tokio::test]
        async fn test_config_file_is_rendered_document() {
            let dir = tempfile::tempdir().unwrap();
            let cli = LaunchpadCli::new(fake_launchpad(&dir, "cat \"$3\""))
                .with_disable_telemetry(false);
            let sink = LogSink::new();

            cli.reset(&config(), &sink).await.unwrap();

            let log = sink.contents();
            assert!(log.contains("apiVersion: launchpad.mirantis.com/mke/v1.4"));
            assert!(log.contains("address: 10.0.0.1"));
        }

        #[tokio::test]
        async fn test_nonzero_exit_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let cli = LaunchpadCli::new(fake_launchpad(
                &dir,
                "echo \"ERRO[0002] ssh: handshake failed\" >&2\nexit 3",
            ));
            let sink = LogSink::new();

            let err = cli.reset(&config(), &sink).await.unwrap_err();
            match err {
                InstallerError::Failed { operation, status } => {
                    assert_eq!(operation, InstallOperation::Reset);
                    assert!(status.contains('3'));
                },
                other => panic!("unexpected error: {}", other),
            }
            assert!(sink.contents().contains("ssh: handshake failed"));
        }

        #[tokio::test]
        async fn test_run_is_bounded_by_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let cli = LaunchpadCli::new(fake_launchpad(&dir, "exec sleep 30"))
                .with_line_timeout(Duration::from_secs(1));
            let sink = LogSink::new();
            let options = ApplyOptions {
                timeout: Duration::from_millis(200),
                ..Default::default()
            };

            let err = cli.apply(&config(), &options, &sink).await.unwrap_err();
            assert!(matches!(
                err,
                InstallerError::TimedOut {
                    operation: InstallOperation::Apply,
                    ..
                }
            ));
        }
    }
}
