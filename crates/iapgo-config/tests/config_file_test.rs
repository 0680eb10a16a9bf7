//! Loading configuration sections from files on disk

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use iapgo_config::{load_config, AccountResolver, ConfigError, EXAMPLE_CONFIG};
use tempfile::NamedTempFile;

#[derive(Default)]
struct CountingResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl AccountResolver for CountingResolver {
    async fn cloud_login(&self) -> Result<String, ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("fred@example.com".to_string())
    }

    async fn posix_login(&self, _identity: &str) -> Result<String, ConfigError> {
        Ok("fred_example_com".to_string())
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_example_config_round_trip() {
    let file = write_config(EXAMPLE_CONFIG);
    let resolver = CountingResolver::default();

    let config = load_config(file.path(), "example", &resolver).await.unwrap();
    assert_eq!(config.remote_port, 80);
    assert_eq!(config.remote_nic, "nic0");
    assert_eq!(config.instance, "my-jumpbox");

    let ssh = config.ssh_tunnel.as_ref().unwrap();
    assert_eq!(ssh.tunnel_to, "1.2.3.4");
    assert_eq!(ssh.account_name(), Some("fred_example_com"));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    let default = load_config(file.path(), "default", &resolver).await.unwrap();
    assert!(default.terminate_after_exec);
    assert_eq!(default.exec_command().unwrap()[0], "bash");
    assert!(default.ssh_tunnel.is_none());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_valid_config() {
    let file = write_config(
        r#"
valid:
  project_id: project_id
  zone: zone
  instance: instance
  remote_port: 200
  local_port: 100
"#,
    );

    let config = load_config(file.path(), "valid", &CountingResolver::default())
        .await
        .unwrap();
    assert_eq!(config.project_id, "project_id");
    assert_eq!(config.local_port, 100);
    assert_eq!(config.remote_port, 200);
    assert_eq!(config.remote_nic, "nic0");
    assert!(!config.terminate_after_exec);
}

#[tokio::test]
async fn test_explicit_account_name_not_resolved() {
    let file = write_config(
        r#"
nested:
  project_id: project_id
  zone: zone
  instance: instance
  remote_port: 5432
  ssh_tunnel:
    tunnel_to: 10.1.2.3
    account_name: deploy
"#,
    );
    let resolver = CountingResolver::default();

    let config = load_config(file.path(), "nested", &resolver).await.unwrap();
    assert_eq!(
        config.ssh_tunnel.as_ref().and_then(|s| s.account_name()),
        Some("deploy")
    );
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_file() {
    let err = load_config(
        Path::new("/nonexistent/iapgo.yaml"),
        "default",
        &CountingResolver::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[tokio::test]
async fn test_empty_file() {
    let file = write_config("");
    let err = load_config(file.path(), "default", &CountingResolver::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyFile(_)));
}

#[tokio::test]
async fn test_invalid_yaml() {
    let file = write_config("default: [unterminated\n");
    let err = load_config(file.path(), "default", &CountingResolver::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[tokio::test]
async fn test_section_not_found() {
    let file = write_config(EXAMPLE_CONFIG);
    let err = load_config(file.path(), "missing", &CountingResolver::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::SectionNotFound(name) if name == "missing"));
}

#[tokio::test]
async fn test_ssh_tunnel_to_no_value() {
    let file = write_config(
        r#"
nested:
  project_id: project_id
  zone: zone
  instance: instance
  remote_port: 5432
  ssh_tunnel:
    tunnel_to: ""
"#,
    );
    let resolver = CountingResolver::default();

    let err = load_config(file.path(), "nested", &resolver).await.unwrap_err();
    assert!(matches!(err, ConfigError::SshTunnelToNoValue));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ssh_tunnel_to_missing() {
    let file = write_config(
        r#"
nested:
  project_id: project_id
  zone: zone
  instance: instance
  remote_port: 5432
  ssh_tunnel:
    account_name: deploy
"#,
    );
    let resolver = CountingResolver::default();

    let err = load_config(file.path(), "nested", &resolver).await.unwrap_err();
    assert!(matches!(err, ConfigError::SshTunnelToNoValue));
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}
