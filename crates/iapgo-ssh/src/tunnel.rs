//! Nested tunnel client

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use iapgo_config::{NestedTunnelConfig, TunnelConfig};
use iapgo_connection::{bind_local, Cause, Lifecycle, Relay};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument, Span};

use crate::error::{InitError, SshError};
use crate::session::{ClientConfig, HostKeyCheck, SshDialer, SshSession};

/// Local listener whose connections are forwarded through a nested SSH
/// session to `ssh_tunnel.tunnel_to` on `remote_port`.
pub struct SshTunnel {
    config: Arc<TunnelConfig>,
    dialer: Arc<dyn SshDialer>,
    /// Local port of the outer tunnel the session is dialled through
    dest_port: u16,
    local_port: Mutex<u16>,
    started: AtomicBool,
    shutdown: CancellationToken,
    span: Span,
}

impl SshTunnel {
    pub fn new(
        config: Arc<TunnelConfig>,
        dialer: Arc<dyn SshDialer>,
        dest_port: u16,
        parent: &Span,
    ) -> Self {
        Self {
            local_port: Mutex::new(config.local_port),
            config,
            dialer,
            dest_port,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            span: tracing::info_span!(parent: parent, "ssh", dest_port),
        }
    }

    /// Dial the nested session, bind the local listener and start forwarding
    /// in the background.
    ///
    /// Fatal errors in the accept loop cancel `lifecycle`. A tunnel can only
    /// be started once, whether or not the first attempt succeeded.
    pub async fn start(&self, lifecycle: &Lifecycle) -> Result<(), SshError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SshError::AlreadyStarted);
        }

        let tunnel_to = self.nested()?.tunnel_to.clone();

        let session = self
            .init()
            .instrument(self.span.clone())
            .await
            .map_err(SshError::NestedDialFailed)?;
        debug!(parent: &self.span, "underlying SSH session started okay");

        let listener = match bind_local(self.config.local_port).await {
            Ok((listener, port)) => {
                *self.local_port.lock().unwrap_or_else(|e| e.into_inner()) = port;
                listener
            }
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };
        info!(parent: &self.span, port = self.listener_port(), "SSH tunnel listening");

        let forward = Forward {
            session: Arc::from(session),
            tunnel_to,
            remote_port: self.config.remote_port,
        };

        tokio::spawn(
            forward
                .accept_loop(listener, self.shutdown.clone(), lifecycle.clone())
                .instrument(self.span.clone()),
        );

        Ok(())
    }

    /// Port of the local listener. Before [`start`](Self::start) binds it
    /// this is the configured port.
    pub fn listener_port(&self) -> u16 {
        *self.local_port.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop accepting connections and close the session. Safe to call more
    /// than once.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    fn nested(&self) -> Result<&NestedTunnelConfig, SshError> {
        self.config
            .ssh_tunnel
            .as_ref()
            .ok_or(SshError::NestedDialFailed(InitError::NotConfigured))
    }

    async fn init(&self) -> Result<Box<dyn SshSession>, InitError> {
        let ssh = self
            .config
            .ssh_tunnel
            .as_ref()
            .ok_or(InitError::NotConfigured)?;

        let path = ssh.private_key_path();
        debug!(path = %path.display(), "private key path");

        let pem = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| InitError::PrivateKeyFileNotFound {
                path: path.clone(),
                source,
            })?;

        let key = russh::keys::decode_secret_key(&pem, None)
            .map_err(|source| InitError::InvalidPrivateKeyFile { path, source })?;

        let user = ssh
            .account_name()
            .ok_or(InitError::AccountNameUnresolved)?
            .to_string();

        let host_key = match &ssh.known_hosts_file {
            Some(path) => HostKeyCheck::KnownHosts {
                path: path.clone(),
                host: self.config.instance.clone(),
            },
            None => HostKeyCheck::AcceptAny,
        };

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.dest_port));
        debug!(%addr, "starting ssh tunnel");

        let session = self
            .dialer
            .dial(
                addr,
                ClientConfig {
                    user,
                    key: Arc::new(key),
                    host_key,
                },
            )
            .await?;

        Ok(session)
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Forward {
    session: Arc<dyn SshSession>,
    tunnel_to: String,
    remote_port: u16,
}

impl Forward {
    async fn accept_loop(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
        lifecycle: Lifecycle,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("listener closed");
                    break;
                }
                _ = lifecycle.cancelled() => {
                    debug!("listener closed");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            let (local, peer_addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "error on SSH listener");
                    lifecycle.cancel(Cause::failed(SshError::Accept(e)));
                    break;
                }
            };
            debug!(peer = %peer_addr, "SSH tunnel listener accepted a connection");

            let tunnel = match self
                .session
                .dial_tcp(&self.tunnel_to, self.remote_port, peer_addr)
                .await
            {
                Ok(tunnel) => tunnel,
                Err(source) => {
                    error!(error = %source, "error dialing ssh tunnel");
                    lifecycle.cancel(Cause::failed(SshError::Forward {
                        host: self.tunnel_to.clone(),
                        port: self.remote_port,
                        source,
                    }));
                    break;
                }
            };
            debug!(
                tunnel_to = %self.tunnel_to,
                remote_port = self.remote_port,
                "successfully dialled ssh tunnel"
            );

            tokio::spawn(
                async move {
                    let outcome = Relay::new(local, tunnel, &Span::current()).handle().await;
                    debug!(
                        local_to_tunnel = ?outcome.local_to_tunnel,
                        tunnel_to_local = ?outcome.tunnel_to_local,
                        "handler exited"
                    );
                }
                .in_current_span(),
            );
        }

        drop(listener);
        self.session.close().await;
    }
}
