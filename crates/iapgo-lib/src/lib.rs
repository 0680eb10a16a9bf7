//! iapgo library - public API for running an IAP tunnel from Rust
//!
//! Re-exports the tunnel crates and provides the [`Orchestrator`] that wires
//! them together: the outer IAP tunnel, the optional nested SSH tunnel and the
//! optional command run against the resulting local port.
//!
//! # Quick Start
//!
//! ```ignore
//! use iapgo_lib::{load_config, GcloudAccountResolver, Lifecycle, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("iapgo.yaml".as_ref(), "default", &GcloudAccountResolver::new()).await?;
//!
//!     let lifecycle = Lifecycle::new();
//!     let tunnel = Orchestrator::new(config, lifecycle).start().await?;
//!     println!("listening on 127.0.0.1:{}", tunnel.active_port());
//!
//!     let cause = tunnel.run().await;
//!     println!("stopped: {}", cause);
//!     Ok(())
//! }
//! ```

mod error;
pub mod exec;
mod orchestrator;

pub use error::OrchestratorError;
pub use exec::{run_command, ExecError, LISTEN_PORT_ENV};
pub use orchestrator::{ManagerFactory, Orchestrator, RunningTunnel};

// Re-export the building blocks
pub use iapgo_config::{
    load_config, AccountResolver, ConfigError, GcloudAccountResolver, NestedTunnelConfig,
    TunnelConfig, DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_SECTION, EXAMPLE_CONFIG,
};
pub use iapgo_connection::{Cause, Lifecycle};
pub use iapgo_iap::{IapError, IapTunnel, IapTunnelManager, TunnelServer, TunnelTarget};
pub use iapgo_ssh::{RusshDialer, SshDialer, SshError, SshTunnel};
