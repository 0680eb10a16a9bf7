//! Outer tunnel supervisor

use std::sync::Arc;
use std::time::Duration;

use iapgo_config::TunnelConfig;
use iapgo_connection::Lifecycle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument, Span};

use crate::error::IapError;
use crate::manager::{IapTunnelManager, ManagerOptions};
use crate::server::TunnelServer;
use crate::signals::ErrorWatch;
use crate::target::TunnelTarget;

/// How long the tunnel server has to become ready after it is started.
pub const READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs a [`TunnelServer`] against a bound local listener.
///
/// The server keeps running in the background after [`IapTunnel::start`]
/// succeeds; later failures surface through [`IapTunnel::errors`]. Dropping
/// the supervisor stops the server.
pub struct IapTunnel {
    manager: Arc<dyn TunnelServer>,
    listener: Option<TcpListener>,
    port: u16,
    shutdown: CancellationToken,
    span: Span,
}

impl IapTunnel {
    /// Supervise the gcloud-backed manager for the target described by `config`.
    pub fn new(
        config: &TunnelConfig,
        listener: TcpListener,
        parent: &Span,
    ) -> Result<Self, IapError> {
        let target = TunnelTarget::from_config(config);
        debug!(parent: parent, remote_port = target.port, "creating IAP tunnel manager");

        let manager = IapTunnelManager::new(target, ManagerOptions::default());
        Self::with_manager(Arc::new(manager), listener, parent)
    }

    pub fn with_manager(
        manager: Arc<dyn TunnelServer>,
        listener: TcpListener,
        parent: &Span,
    ) -> Result<Self, IapError> {
        let port = listener.local_addr().map_err(IapError::LocalAddr)?.port();

        Ok(Self {
            manager,
            listener: Some(listener),
            port,
            shutdown: CancellationToken::new(),
            span: tracing::info_span!(parent: parent, "iap", port),
        })
    }

    /// Local port the outer tunnel listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Error signal of the underlying server. Yields at most one error.
    pub fn errors(&self) -> ErrorWatch {
        self.manager.errors()
    }

    /// Start the server and wait up to [`READY_TIMEOUT`] for it to become
    /// ready. On failure the server is stopped before returning.
    pub async fn start(&mut self, lifecycle: &Lifecycle) -> Result<(), IapError> {
        let listener = self.listener.take().ok_or(IapError::AlreadyStarted)?;

        // Stop with the lifecycle, or on our own when startup fails.
        self.shutdown = lifecycle.token().child_token();

        let manager = Arc::clone(&self.manager);
        let shutdown = self.shutdown.clone();
        tokio::spawn(
            async move {
                debug!("tunnel manager starting to wait for connections");
                match manager.serve(listener, shutdown).await {
                    Ok(()) => debug!("tunnel manager exited normally"),
                    Err(e) => error!(error = %e, "tunnel manager failed"),
                }
            }
            .instrument(self.span.clone()),
        );

        let mut errors = self.manager.errors();
        let mut ready = self.manager.ready();

        let result = tokio::select! {
            biased;

            Some(e) = errors.wait() => Err(IapError::TunnelReturnedError(e)),
            _ = ready.wait() => Ok(()),
            _ = tokio::time::sleep(READY_TIMEOUT) => Err(IapError::ReadyTimeout(READY_TIMEOUT)),
        };

        match &result {
            Ok(()) => info!(parent: &self.span, "IAP tunnel is ready"),
            Err(e) => {
                error!(parent: &self.span, error = %e, "IAP tunnel failed to start");
                self.shutdown.cancel();
            }
        }

        result
    }
}

impl Drop for IapTunnel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
