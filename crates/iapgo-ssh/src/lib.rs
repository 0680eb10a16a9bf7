//! Nested SSH tunnel carried over the outer tunnel
//!
//! [`SshTunnel`] authenticates an SSH session through the outer tunnel's
//! local port and then forwards every connection accepted on its own local
//! listener as a direct-tcpip channel to the configured destination.
//!
//! The SSH transport sits behind the [`SshDialer`] and [`SshSession`] traits;
//! [`RusshDialer`] is the production implementation.

pub mod client;
pub mod error;
pub mod session;
pub mod tunnel;

pub use client::RusshDialer;
pub use error::{InitError, SessionError, SshError};
pub use session::{BoxedStream, ClientConfig, HostKeyCheck, SshDialer, SshSession, TunnelStream};
pub use tunnel::SshTunnel;
