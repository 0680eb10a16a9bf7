//! Full-duplex byte relay between a local connection and a tunnel stream
//!
//! Each direction is copied independently. A clean end-of-stream on one side
//! half-closes the opposite writer but never aborts the other direction, so a
//! peer that finishes sending can still receive.

use std::io;

use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, Instrument, Span};

/// Result of both copy directions once a relay has finished.
///
/// `Ok(bytes)` means the source reached a clean end-of-stream.
#[derive(Debug)]
pub struct RelayOutcome {
    pub local_to_tunnel: io::Result<u64>,
    pub tunnel_to_local: io::Result<u64>,
}

impl RelayOutcome {
    /// True when neither direction reported an error.
    pub fn is_clean(&self) -> bool {
        self.local_to_tunnel.is_ok() && self.tunnel_to_local.is_ok()
    }
}

/// Pairs a local connection with a tunnel-side connection.
///
/// The relay owns both streams for its whole lifetime and closes them when
/// [`Relay::handle`] returns.
pub struct Relay<L, T> {
    local: L,
    tunnel: T,
    span: Span,
}

impl<L, T> Relay<L, T>
where
    L: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(local: L, tunnel: T, parent: &Span) -> Self {
        Self {
            local,
            tunnel,
            span: tracing::debug_span!(parent: parent, "relay"),
        }
    }

    /// Copy in both directions until both sources end, then close both streams.
    pub async fn handle(self) -> RelayOutcome {
        let Self {
            local,
            tunnel,
            span,
        } = self;

        async move {
            debug!("started relaying connection");

            let (mut local_read, mut local_write) = split(local);
            let (mut tunnel_read, mut tunnel_write) = split(tunnel);

            let local_to_tunnel = async {
                let result = tokio::io::copy(&mut local_read, &mut tunnel_write).await;
                if result.is_ok() {
                    // Propagate the half-close; the reverse direction keeps running.
                    let _ = tunnel_write.shutdown().await;
                }
                debug!(result = ?result, "local to tunnel copy finished");
                result
            };

            let tunnel_to_local = async {
                let result = tokio::io::copy(&mut tunnel_read, &mut local_write).await;
                if result.is_ok() {
                    let _ = local_write.shutdown().await;
                }
                debug!(result = ?result, "tunnel to local copy finished");
                result
            };

            let (local_to_tunnel, tunnel_to_local) = tokio::join!(local_to_tunnel, tunnel_to_local);

            let mut local = local_read.unsplit(local_write);
            let mut tunnel = tunnel_read.unsplit(tunnel_write);
            let _ = local.shutdown().await;
            let _ = tunnel.shutdown().await;
            drop(local);
            drop(tunnel);

            debug!("relay closed both connections");

            RelayOutcome {
                local_to_tunnel,
                tunnel_to_local,
            }
        }
        .instrument(span)
        .await
    }
}
