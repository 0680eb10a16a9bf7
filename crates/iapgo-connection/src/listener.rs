//! Loopback listener binding

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("Failed to listen on {address}: {source}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to read back listener port: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Bind a loopback listener on `port` (0 picks an ephemeral port) and return
/// it together with the port actually assigned.
pub async fn bind_local(port: u16) -> Result<(TcpListener, u16), ListenError> {
    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenError::Bind { address, source })?;

    let bound = listener.local_addr().map_err(ListenError::LocalAddr)?.port();
    debug!(requested = port, port = bound, "listener bound");

    Ok((listener, bound))
}
