use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::ServeError;
use crate::signals::{ErrorWatch, ReadyWatch};

/// Carries connections accepted on a local listener through the outer tunnel.
///
/// Implementations signal readiness once they are able to forward traffic and
/// report at most one fatal error. Both signals must be observable before
/// `serve` is called.
#[async_trait]
pub trait TunnelServer: Send + Sync + 'static {
    /// Serve connections from `listener` until `shutdown` fires or a fatal
    /// error occurs. A fatal error is also published on [`errors`](Self::errors).
    async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Arc<ServeError>>;

    fn errors(&self) -> ErrorWatch;

    fn ready(&self) -> ReadyWatch;
}
