//! Outer tunnel supervision
//!
//! The IAP transport itself is provided by a [`TunnelServer`]. The production
//! server ([`IapTunnelManager`]) hands every accepted connection to the Google
//! Cloud CLI; tests substitute their own. [`IapTunnel`] starts the server
//! against a bound listener and waits a bounded time for it to become ready.

pub mod error;
pub mod manager;
pub mod server;
pub mod signals;
pub mod target;
pub mod tunnel;

pub use error::{IapError, ServeError};
pub use manager::{IapTunnelManager, ManagerOptions};
pub use server::TunnelServer;
pub use signals::{ErrorWatch, ReadyWatch, TunnelSignals};
pub use target::TunnelTarget;
pub use tunnel::{IapTunnel, READY_TIMEOUT};
