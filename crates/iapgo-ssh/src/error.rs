use std::io;
use std::path::PathBuf;

use iapgo_connection::ListenError;
use thiserror::Error;

/// Failures of an [`SshTunnel`](crate::SshTunnel).
#[derive(Debug, Error)]
pub enum SshError {
    #[error("Failed to dial nested SSH session: {0}")]
    NestedDialFailed(#[source] InitError),

    #[error(transparent)]
    Listen(#[from] ListenError),

    #[error("Error on SSH tunnel listener: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to open forwarded channel to {host}:{port}: {source}")]
    Forward {
        host: String,
        port: u16,
        source: SessionError,
    },

    #[error("SSH tunnel already started")]
    AlreadyStarted,
}

/// Failures while preparing and dialling the nested session.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("No ssh_tunnel section in config")]
    NotConfigured,

    #[error("Private key file {path:?} not found: {source}")]
    PrivateKeyFileNotFound { path: PathBuf, source: io::Error },

    #[error("Invalid private key file {path:?}: {source}")]
    InvalidPrivateKeyFile {
        path: PathBuf,
        source: russh::keys::Error,
    },

    #[error("SSH account name is not set and was not resolved")]
    AccountNameUnresolved,

    #[error(transparent)]
    Dial(#[from] SessionError),
}

/// Errors raised by an SSH session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("SSH connection failed: {0}")]
    Connect(#[from] russh::Error),

    #[error("SSH authentication failed: {0}")]
    Authentication(#[source] russh::Error),

    #[error("SSH server rejected public key for user {user}")]
    AuthenticationRejected { user: String },

    #[error("Failed to open SSH channel: {0}")]
    Channel(#[source] russh::Error),

    #[error("Host key for {host} does not match known_hosts line {line}")]
    HostKeyMismatch { host: String, line: usize },

    #[error("Host key for {host} is not listed in {path:?}")]
    UnknownHostKey { host: String, path: PathBuf },

    #[error("Failed to read known_hosts file {path:?}: {source}")]
    KnownHosts {
        path: PathBuf,
        source: russh::keys::Error,
    },
}
