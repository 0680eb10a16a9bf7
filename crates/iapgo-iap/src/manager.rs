//! Tunnel server backed by the Google Cloud CLI
//!
//! The IAP wire protocol is handled by `gcloud compute start-iap-tunnel`
//! running in `--listen-on-stdin` mode: every accepted connection gets its
//! own child process and is relayed through the child's stdin and stdout.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use iapgo_connection::Relay;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument, Span};

use crate::error::ServeError;
use crate::server::TunnelServer;
use crate::signals::{ErrorWatch, ReadyWatch, TunnelSignals};
use crate::target::TunnelTarget;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Cloud CLI executable
    pub program: PathBuf,
    /// Value passed to `--verbosity`
    pub verbosity: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gcloud"),
            verbosity: "warning".to_string(),
        }
    }
}

pub struct IapTunnelManager {
    target: TunnelTarget,
    options: ManagerOptions,
    signals: TunnelSignals,
}

impl IapTunnelManager {
    pub fn new(target: TunnelTarget, options: ManagerOptions) -> Self {
        Self {
            target,
            options,
            signals: TunnelSignals::new(),
        }
    }

    pub fn target(&self) -> &TunnelTarget {
        &self.target
    }

    /// Arguments for one `start-iap-tunnel` invocation.
    pub fn command_args(&self) -> Vec<String> {
        vec![
            "compute".to_string(),
            "start-iap-tunnel".to_string(),
            self.target.instance.clone(),
            self.target.port.to_string(),
            "--listen-on-stdin".to_string(),
            format!("--project={}", self.target.project),
            format!("--zone={}", self.target.zone),
            format!("--network-interface={}", self.target.interface),
            format!("--verbosity={}", self.options.verbosity),
        ]
    }

    fn spawn_tunnel(&self) -> Result<IapStream, ServeError> {
        let program = self.options.program.display().to_string();

        let mut child = Command::new(&self.options.program)
            .args(self.command_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServeError::Spawn {
                program: program.clone(),
                source,
            })?;

        match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => Ok(IapStream {
                _child: child,
                stdin: Some(stdin),
                stdout,
            }),
            _ => Err(ServeError::Spawn {
                program,
                source: io::Error::new(io::ErrorKind::BrokenPipe, "child stdio was not captured"),
            }),
        }
    }

    fn fail(&self, error: ServeError) -> Arc<ServeError> {
        error!("IAP tunnel manager failed: {}", error);
        self.signals.report(error)
    }
}

#[async_trait]
impl TunnelServer for IapTunnelManager {
    async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), Arc<ServeError>> {
        info!(
            instance = %self.target.instance,
            port = self.target.port,
            "IAP tunnel manager accepting connections"
        );
        self.signals.mark_ready();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("IAP tunnel manager shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let (socket, peer_addr) = accepted.map_err(|e| self.fail(ServeError::Accept(e)))?;
            debug!("Accepted connection from {}", peer_addr);

            let stream = self.spawn_tunnel().map_err(|e| self.fail(e))?;

            let span = tracing::debug_span!("iap_connection", peer = %peer_addr);
            tokio::spawn(
                async move {
                    let outcome = Relay::new(socket, stream, &Span::current()).handle().await;
                    debug!(clean = outcome.is_clean(), "IAP connection finished");
                }
                .instrument(span),
            );
        }
    }

    fn errors(&self) -> ErrorWatch {
        self.signals.errors()
    }

    fn ready(&self) -> ReadyWatch {
        self.signals.ready()
    }
}

/// Duplex stream over a `start-iap-tunnel` child process. Dropping the stream
/// kills the child.
struct IapStream {
    _child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

impl AsyncRead for IapStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for IapStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_write(cx, buf),
            None => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Closing stdin is how the child sees end-of-stream.
        if let Some(stdin) = self.stdin.as_mut() {
            ready!(Pin::new(stdin).poll_flush(cx))?;
        }
        self.stdin = None;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TunnelTarget {
        TunnelTarget {
            project: "my-project".to_string(),
            zone: "us-central1-a".to_string(),
            instance: "jumpbox".to_string(),
            port: 22,
            interface: "nic0".to_string(),
        }
    }

    #[test]
    fn test_command_args() {
        let manager = IapTunnelManager::new(target(), ManagerOptions::default());
        assert_eq!(
            manager.command_args(),
            vec![
                "compute",
                "start-iap-tunnel",
                "jumpbox",
                "22",
                "--listen-on-stdin",
                "--project=my-project",
                "--zone=us-central1-a",
                "--network-interface=nic0",
                "--verbosity=warning",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_reports_spawn_error() {
        let manager = Arc::new(IapTunnelManager::new(
            target(),
            ManagerOptions {
                program: PathBuf::from("/nonexistent/iapgo-test/gcloud"),
                ..ManagerOptions::default()
            },
        ));
        let (listener, port) = iapgo_connection::bind_local(0).await.unwrap();
        let mut errors = manager.errors();

        let serve = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.serve(listener, CancellationToken::new()).await })
        };

        manager.ready().wait().await;
        let _client = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();

        let reported = errors.wait().await.unwrap();
        assert!(matches!(*reported, ServeError::Spawn { .. }));

        let returned = serve.await.unwrap().unwrap_err();
        assert!(Arc::ptr_eq(&reported, &returned));
    }

    #[tokio::test]
    async fn test_shutdown_stops_serving() {
        let manager = IapTunnelManager::new(target(), ManagerOptions::default());
        let (listener, _port) = iapgo_connection::bind_local(0).await.unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        manager.serve(listener, shutdown).await.unwrap();
        assert!(manager.ready().is_ready());
        assert!(manager.errors().current().is_none());
    }
}
