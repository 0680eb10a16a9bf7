use iapgo_connection::ListenError;
use iapgo_iap::IapError;
use iapgo_ssh::SshError;
use thiserror::Error;

/// Startup failures. Each one ends the run before any command is executed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to listen for the IAP tunnel: {0}")]
    Listen(#[from] ListenError),

    #[error("Failed to start IAP tunnel: {0}")]
    Iap(#[from] IapError),

    #[error("Failed to start SSH tunnel: {0}")]
    Ssh(#[from] SshError),
}
