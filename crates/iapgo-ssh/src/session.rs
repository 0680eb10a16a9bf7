//! SSH transport seams

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::PrivateKey;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SessionError;

/// A duplex byte stream that can be handed to a relay task.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedStream = Box<dyn TunnelStream>;

/// How the server's host key is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyCheck {
    /// Accept any key. The outer tunnel has already authenticated the instance.
    AcceptAny,
    /// Require the key to be listed for `host` in the known_hosts file at `path`.
    KnownHosts { path: PathBuf, host: String },
}

/// Everything needed to authenticate a nested session.
#[derive(Clone)]
pub struct ClientConfig {
    pub user: String,
    pub key: Arc<PrivateKey>,
    pub host_key: HostKeyCheck,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("user", &self.user)
            .field("key", &self.key.algorithm().as_str())
            .field("host_key", &self.host_key)
            .finish()
    }
}

/// Opens authenticated SSH sessions.
#[async_trait]
pub trait SshDialer: Send + Sync {
    async fn dial(
        &self,
        addr: SocketAddr,
        config: ClientConfig,
    ) -> Result<Box<dyn SshSession>, SessionError>;
}

/// An authenticated SSH session.
#[async_trait]
pub trait SshSession: Send + Sync {
    /// Open a direct-tcpip channel to `host:port` on behalf of `originator`.
    async fn dial_tcp(
        &self,
        host: &str,
        port: u16,
        originator: SocketAddr,
    ) -> Result<BoxedStream, SessionError>;

    async fn close(&self);
}
