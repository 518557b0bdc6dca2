//! Reading and writing launchpad cluster documents.

use super::{ClusterConfig, KIND};
use crate::error::ConfigError;
use serde::Deserialize;

const API_GROUP: &str = "launchpad.mirantis.com/mke/";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
}

/// Parse a launchpad document into a [`ClusterConfig`].
///
/// Only MKE documents (`kind: mke`, `apiVersion: launchpad.mirantis.com/mke/v1.x`)
/// are accepted; the document's `apiVersion` is kept as written.
pub fn product_from_yaml(text: &str) -> Result<ClusterConfig, ConfigError> {
    let header: Header = serde_yaml::from_str(text)?;
    if header.kind != KIND || !header.api_version.starts_with(API_GROUP) {
        return Err(ConfigError::UnsupportedProduct {
            api_version: header.api_version,
            kind: header.kind,
        });
    }
    Ok(serde_yaml::from_str(text)?)
}

/// Render a [`ClusterConfig`] as a launchpad document.
pub fn to_yaml(config: &ClusterConfig) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Connection, Role};

    const DOC: &str = r#"
apiVersion: launchpad.mirantis.com/mke/v1.3
kind: mke
metadata:
  name: prod
spec:
  hosts:
    - role: manager
      ssh:
        address: 10.0.0.1
        user: ubuntu
        keyPath: ~/.ssh/id_rsa
      hooks:
        apply:
          before:
            - apt-get update
    - role: msr
      ssh:
        address: 10.0.0.2
        user: ubuntu
  mcr:
    version: 23.0.8
  mke:
    version: 3.7.3
    adminPassword: s3cret
    installFlags:
      - --default-node-orchestrator=kubernetes
  msr:
    version: 2.9.16
  cluster:
    prune: true
"#;

    #[test]
    fn test_product_from_yaml() {
        let config = product_from_yaml(DOC).unwrap();
        assert_eq!(config.api_version, "launchpad.mirantis.com/mke/v1.3");
        assert_eq!(config.metadata.name, "prod");
        assert_eq!(config.spec.hosts.len(), 2);
        assert_eq!(config.spec.hosts[1].role, Role::Msr);
        assert_eq!(
            config.spec.hosts[0].hooks.apply.before,
            vec!["apt-get update"]
        );
        match &config.spec.hosts[0].connection {
            Connection::Ssh(ssh) => {
                assert_eq!(ssh.port, 22);
                assert_eq!(ssh.key_path, "~/.ssh/id_rsa");
            },
            other => panic!("expected ssh, got {:?}", other),
        }
        assert_eq!(config.spec.mcr.channel, "stable");
        assert_eq!(
            config.spec.msr.as_ref().map(|m| m.replica_ids.as_str()),
            Some("sequential")
        );
        assert!(config.spec.cluster.prune);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rendered_document_parses_back() {
        let config = product_from_yaml(DOC).unwrap();
        let rendered = to_yaml(&config).unwrap();
        assert!(rendered.starts_with("apiVersion: launchpad.mirantis.com/mke/v1.3\nkind: mke\n"));
        assert_eq!(product_from_yaml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_numeric_scalars_read_as_text() {
        let doc = r#"
apiVersion: launchpad.mirantis.com/mke/v1.4
kind: mke
metadata:
  name: numbers
spec:
  hosts:
    - role: manager
      ssh:
        address: 10.0.0.1
    - role: worker
      winRM:
        address: w1
        password: 123456
  mcr:
    version: 23.0.8
  mke:
    version: 3.7.3
    adminPassword: 987654
"#;
        let config = product_from_yaml(doc).unwrap();
        match &config.spec.hosts[1].connection {
            Connection::WinRm(winrm) => assert_eq!(winrm.password, "123456"),
            other => panic!("expected winrm, got {:?}", other),
        }
        assert_eq!(config.spec.mke.admin_password, "987654");
    }

    #[test]
    fn test_rejects_other_products() {
        let err = product_from_yaml("apiVersion: launchpad.mirantis.com/v1\nkind: k0s\n")
            .unwrap_err();
        match err {
            ConfigError::UnsupportedProduct { api_version, kind } => {
                assert_eq!(api_version, "launchpad.mirantis.com/v1");
                assert_eq!(kind, "k0s");
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(matches!(
            product_from_yaml("apiVersion: [unterminated"),
            Err(ConfigError::Yaml(_))
        ));

        let missing_connection = r#"
apiVersion: launchpad.mirantis.com/mke/v1.4
kind: mke
metadata:
  name: prod
spec:
  hosts:
    - role: manager
"#;
        assert!(matches!(
            product_from_yaml(missing_connection),
            Err(ConfigError::Yaml(_))
        ));
    }
}
