//! Resolution of the SSH account name through OS Login

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::ConfigError;

/// Looks up the identities needed to fill in a missing SSH account name.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// The cloud identity the local tooling is logged in as.
    async fn cloud_login(&self) -> Result<String, ConfigError>;

    /// The primary POSIX username OS Login assigns to `identity`.
    async fn posix_login(&self, identity: &str) -> Result<String, ConfigError>;
}

/// Resolver backed by the `gcloud` command line tool.
#[derive(Debug, Clone)]
pub struct GcloudAccountResolver {
    program: PathBuf,
}

impl GcloudAccountResolver {
    pub fn new() -> Self {
        Self::with_program("gcloud")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, String> {
        debug!(program = %self.program.display(), ?args, "running gcloud");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.program.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} ({})", stderr.trim(), output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for GcloudAccountResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountResolver for GcloudAccountResolver {
    async fn cloud_login(&self) -> Result<String, ConfigError> {
        let account = self
            .run(&["config", "get", "account"])
            .await
            .map_err(ConfigError::CloudLogin)?;

        if account.is_empty() {
            return Err(ConfigError::CloudLogin(
                "no active account is configured".to_string(),
            ));
        }

        Ok(account)
    }

    async fn posix_login(&self, identity: &str) -> Result<String, ConfigError> {
        let account_flag = format!("--account={}", identity);
        let profile = self
            .run(&[
                &account_flag,
                "compute",
                "os-login",
                "describe-profile",
                "--format=json",
            ])
            .await
            .map_err(|reason| ConfigError::PosixLogin {
                identity: identity.to_string(),
                reason,
            })?;

        select_primary_account(identity, &profile)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginProfile {
    #[serde(default)]
    posix_accounts: Vec<PosixAccount>,
}

#[derive(Debug, Deserialize)]
struct PosixAccount {
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    username: String,
}

/// Pick the username of the primary POSIX account from a login profile document.
pub fn select_primary_account(identity: &str, profile: &str) -> Result<String, ConfigError> {
    let profile: LoginProfile =
        serde_json::from_str(profile).map_err(|e| ConfigError::PosixLogin {
            identity: identity.to_string(),
            reason: format!("unreadable login profile: {}", e),
        })?;

    profile
        .posix_accounts
        .into_iter()
        .find(|account| account.primary)
        .map(|account| account.username)
        .ok_or_else(|| ConfigError::NoPrimaryPosixAccount(identity.to_string()))
}
