//! Tunnel configuration file model and loading

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::ConfigError;
use crate::login::AccountResolver;

pub const DEFAULT_CONFIG_FILE: &str = "iapgo.yaml";
pub const DEFAULT_CONFIG_SECTION: &str = "default";
pub const DEFAULT_REMOTE_NIC: &str = "nic0";

/// Private key used for the nested SSH session, relative to the home directory.
pub const DEFAULT_PRIVATE_KEY_FILE: &str = ".ssh/google_compute_engine";

/// One section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    pub project_id: String,

    pub zone: String,

    /// Instance the outer tunnel terminates on
    pub instance: String,

    /// Port on the instance, or on `ssh_tunnel.tunnel_to` when nested tunnelling is used
    pub remote_port: u16,

    /// Local listening port (0 = ephemeral)
    #[serde(default)]
    pub local_port: u16,

    #[serde(default = "default_remote_nic")]
    pub remote_nic: String,

    /// Command (and arguments) to run once the tunnel is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_tunnel: Option<NestedTunnelConfig>,

    /// Stop the tunnel as soon as the exec command finishes
    #[serde(default)]
    pub terminate_after_exec: bool,
}

/// SSH session carried over the outer tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedTunnelConfig {
    /// Host reachable from the instance that forwarded streams connect to.
    /// Missing and blank values are both rejected by `validate`.
    #[serde(default)]
    pub tunnel_to: String,

    /// POSIX account on the instance; resolved through OS Login when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,

    /// When set, the instance host key must be listed in this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts_file: Option<PathBuf>,
}

fn default_remote_nic() -> String {
    DEFAULT_REMOTE_NIC.to_string()
}

impl TunnelConfig {
    pub fn has_nested_tunnel(&self) -> bool {
        self.ssh_tunnel.is_some()
    }

    pub fn exec_command(&self) -> Option<&[String]> {
        self.exec.as_deref()
    }

    /// Validate the section after parsing
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ssh) = &self.ssh_tunnel {
            if ssh.tunnel_to.trim().is_empty() {
                return Err(ConfigError::SshTunnelToNoValue);
            }
        }

        if let Some(exec) = &self.exec {
            if exec.first().map_or(true, |program| program.is_empty()) {
                return Err(ConfigError::EmptyExec);
            }
        }

        Ok(())
    }

    /// Fill in the SSH account name through OS Login if it was not configured.
    ///
    /// Runs at most one lookup and must complete before the configuration is
    /// shared with any component.
    pub async fn resolve_account(
        &mut self,
        resolver: &dyn AccountResolver,
    ) -> Result<(), ConfigError> {
        let Some(ssh) = self.ssh_tunnel.as_mut() else {
            return Ok(());
        };

        if ssh.account_name().is_some() {
            return Ok(());
        }

        debug!("no posix account name found in config so attempting to resolve from OS Login");

        let login = resolver.cloud_login().await.map_err(|e| {
            error!(error = %e, "failed to get cloud login");
            e
        })?;

        let account = resolver.posix_login(&login).await?;
        debug!(account_name = %account, "successfully resolved from OS Login");

        ssh.account_name = Some(account);
        Ok(())
    }
}

impl NestedTunnelConfig {
    /// Configured account name, ignoring an empty value.
    pub fn account_name(&self) -> Option<&str> {
        self.account_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Explicit private key file, else `~/.ssh/google_compute_engine`.
    pub fn private_key_path(&self) -> PathBuf {
        match &self.private_key_file {
            Some(path) => path.clone(),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join(DEFAULT_PRIVATE_KEY_FILE),
        }
    }
}

/// Parse every section of a configuration file.
pub fn parse_sections(content: &str) -> Result<HashMap<String, TunnelConfig>, ConfigError> {
    let sections: HashMap<String, TunnelConfig> = serde_yaml::from_str(content)?;
    Ok(sections)
}

/// Load `section` from the file at `path`, validate it and resolve the SSH
/// account name if needed.
pub async fn load_config(
    path: &Path,
    section: &str,
    resolver: &dyn AccountResolver,
) -> Result<TunnelConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

    if content.trim().is_empty() {
        return Err(ConfigError::EmptyFile(path.to_path_buf()));
    }

    let mut sections = parse_sections(&content)?;

    let mut config = sections
        .remove(section)
        .ok_or_else(|| ConfigError::SectionNotFound(section.to_string()))?;

    config.validate()?;
    config.resolve_account(resolver).await?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AccountResolver for FixedResolver {
        async fn cloud_login(&self) -> Result<String, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("fred@example.com".to_string())
        }

        async fn posix_login(&self, identity: &str) -> Result<String, ConfigError> {
            assert_eq!(identity, "fred@example.com");
            Ok("fred_example_com".to_string())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl AccountResolver for FailingResolver {
        async fn cloud_login(&self) -> Result<String, ConfigError> {
            Err(ConfigError::CloudLogin("gcloud not found".to_string()))
        }

        async fn posix_login(&self, _identity: &str) -> Result<String, ConfigError> {
            unreachable!("posix login requested after cloud login failed")
        }
    }

    fn section(yaml: &str, name: &str) -> TunnelConfig {
        parse_sections(yaml).unwrap().remove(name).unwrap()
    }

    #[test]
    fn test_parse_minimal_section() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
"#;
        let config = section(yaml, "default");
        assert_eq!(config.remote_port, 200);
        assert_eq!(config.local_port, 0);
        assert_eq!(config.remote_nic, "nic0");
        assert!(config.exec.is_none());
        assert!(config.ssh_tunnel.is_none());
        assert!(!config.terminate_after_exec);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
  remote_prot: 300
"#;
        let err = parse_sections(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_nested_field_rejected() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
  ssh_tunnel:
    tunnel_to: 10.0.0.2
    acount_name: typo
"#;
        assert!(matches!(parse_sections(yaml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_tunnel_to_rejected() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
  ssh_tunnel:
    tunnel_to: ""
"#;
        let config = section(yaml, "default");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SshTunnelToNoValue)
        ));
    }

    #[test]
    fn test_empty_exec_rejected() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
  exec: []
"#;
        let config = section(yaml, "default");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyExec)));
    }

    #[test]
    fn test_private_key_path() {
        let mut ssh = NestedTunnelConfig {
            tunnel_to: "10.0.0.2".to_string(),
            account_name: None,
            private_key_file: None,
            known_hosts_file: None,
        };
        assert!(ssh.private_key_path().ends_with(DEFAULT_PRIVATE_KEY_FILE));

        ssh.private_key_file = Some(PathBuf::from("/tmp/id_ed25519"));
        assert_eq!(ssh.private_key_path(), PathBuf::from("/tmp/id_ed25519"));
    }

    #[tokio::test]
    async fn test_resolve_account_when_missing() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
  ssh_tunnel:
    tunnel_to: 10.0.0.2
    account_name: ""
"#;
        let mut config = section(yaml, "default");
        let resolver = FixedResolver {
            calls: AtomicUsize::new(0),
        };

        config.resolve_account(&resolver).await.unwrap();
        config.resolve_account(&resolver).await.unwrap();

        let ssh = config.ssh_tunnel.as_ref().unwrap();
        assert_eq!(ssh.account_name(), Some("fred_example_com"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_account_skipped_without_ssh() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
"#;
        let mut config = section(yaml, "default");
        config.resolve_account(&FailingResolver).await.unwrap();
        assert!(config.ssh_tunnel.is_none());
    }

    #[tokio::test]
    async fn test_resolve_account_failure_propagates() {
        let yaml = r#"
default:
  project_id: project
  zone: zone
  instance: instance
  remote_port: 200
  ssh_tunnel:
    tunnel_to: 10.0.0.2
"#;
        let mut config = section(yaml, "default");
        let err = config.resolve_account(&FailingResolver).await.unwrap_err();
        assert!(matches!(err, ConfigError::CloudLogin(_)));
    }
}
