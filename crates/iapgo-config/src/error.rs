use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or completing a configuration.
///
/// All of these are fatal and are reported before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {0:?} is empty")]
    EmptyFile(PathBuf),

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config section not found: {0}")]
    SectionNotFound(String),

    #[error("If ssh_tunnel is configured then ssh_tunnel.tunnel_to must have a value")]
    SshTunnelToNoValue,

    #[error("exec must name a command when present")]
    EmptyExec,

    #[error("Failed to get cloud login: {0}\n\nThe 'gcloud' command may not be in your PATH, or you may not be logged in (gcloud auth login)")]
    CloudLogin(String),

    #[error("Failed to get POSIX login for {identity}: {reason}")]
    PosixLogin { identity: String, reason: String },

    #[error("No primary POSIX account found for {0}")]
    NoPrimaryPosixAccount(String),
}
