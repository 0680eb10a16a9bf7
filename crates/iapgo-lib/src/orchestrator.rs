//! Wires the outer tunnel, the nested tunnel and the command together

use std::sync::Arc;

use iapgo_config::TunnelConfig;
use iapgo_connection::{bind_local, Cause, Lifecycle};
use iapgo_iap::{IapTunnel, IapTunnelManager, ManagerOptions, TunnelServer, TunnelTarget};
use iapgo_ssh::{RusshDialer, SshDialer, SshTunnel};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::error::OrchestratorError;
use crate::exec::run_command;

/// Builds the tunnel server for a target. Swapped out in tests.
pub type ManagerFactory = Box<dyn FnOnce(TunnelTarget) -> Arc<dyn TunnelServer> + Send>;

pub struct Orchestrator {
    config: Arc<TunnelConfig>,
    lifecycle: Lifecycle,
    ssh_dialer: Arc<dyn SshDialer>,
    manager_factory: ManagerFactory,
    span: Span,
}

impl Orchestrator {
    pub fn new(config: TunnelConfig, lifecycle: Lifecycle) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle,
            ssh_dialer: Arc::new(RusshDialer::new()),
            manager_factory: Box::new(|target| -> Arc<dyn TunnelServer> {
                Arc::new(IapTunnelManager::new(target, ManagerOptions::default()))
            }),
            span: Span::current(),
        }
    }

    pub fn with_ssh_dialer(mut self, dialer: Arc<dyn SshDialer>) -> Self {
        self.ssh_dialer = dialer;
        self
    }

    pub fn with_manager_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(TunnelTarget) -> Arc<dyn TunnelServer> + Send + 'static,
    {
        self.manager_factory = Box::new(factory);
        self
    }

    /// Parent span for every component's logging.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Start the outer tunnel and, when configured, the nested SSH tunnel.
    ///
    /// Returns once both are accepting connections. Later failures of either
    /// cancel the lifecycle.
    pub async fn start(self) -> Result<RunningTunnel, OrchestratorError> {
        let Self {
            config,
            lifecycle,
            ssh_dialer,
            manager_factory,
            span,
        } = self;

        // With nested tunnelling the outer tunnel's port is internal.
        let iap_port = if config.has_nested_tunnel() {
            0
        } else {
            config.local_port
        };
        let (listener, _) = bind_local(iap_port).await?;

        let manager = manager_factory(TunnelTarget::from_config(&config));
        let mut iap = IapTunnel::with_manager(manager, listener, &span)?;
        iap.start(&lifecycle).await?;

        let mut errors = iap.errors();
        let forwarder = lifecycle.clone();
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = forwarder.cancelled() => {}
                    reported = errors.wait() => {
                        if let Some(e) = reported {
                            error!(error = %e, "iap tunnel manager returned an error");
                            forwarder.cancel(Cause::Failed(e));
                        }
                    }
                }
            }
            .instrument(span.clone()),
        );

        let ssh = if config.has_nested_tunnel() {
            let ssh = SshTunnel::new(Arc::clone(&config), ssh_dialer, iap.port(), &span);
            ssh.start(&lifecycle).await?;
            debug!(parent: &span, "ssh tunnel started");
            Some(ssh)
        } else {
            None
        };

        let running = RunningTunnel {
            config,
            lifecycle,
            iap,
            ssh,
            span,
        };
        info!(
            parent: &running.span,
            port = running.active_port(),
            "tunnel ready on 127.0.0.1"
        );

        Ok(running)
    }
}

/// A started tunnel. Dropping it stops both tunnels.
pub struct RunningTunnel {
    config: Arc<TunnelConfig>,
    lifecycle: Lifecycle,
    iap: IapTunnel,
    ssh: Option<SshTunnel>,
    span: Span,
}

impl RunningTunnel {
    pub fn iap_port(&self) -> u16 {
        self.iap.port()
    }

    pub fn ssh_port(&self) -> Option<u16> {
        self.ssh.as_ref().map(SshTunnel::listener_port)
    }

    /// The port local clients should connect to.
    pub fn active_port(&self) -> u16 {
        self.ssh_port().unwrap_or_else(|| self.iap_port())
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Run the configured command, then wait until the lifecycle ends and
    /// return its cause.
    pub async fn run(self) -> Cause {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Cause {
        match self.config.exec_command() {
            Some(command) => {
                let port = self.active_port();
                tokio::select! {
                    _ = self.lifecycle.cancelled() => {
                        debug!("lifecycle ended while command was running");
                    }
                    result = run_command(command, port) => {
                        match result {
                            Ok(status) if status.success() => debug!("command completed"),
                            Ok(status) => warn!(%status, "command exited unsuccessfully"),
                            Err(e) => error!(error = %e, "failed to run command"),
                        }

                        if self.config.terminate_after_exec {
                            self.lifecycle.cancel(Cause::Completed);
                        } else {
                            debug!("terminate_after_exec is not set so wait forever. Enter Control-C to exit.");
                        }
                    }
                }
            }
            None => debug!("no exec command so wait forever. Enter Control-C to exit."),
        }

        self.lifecycle.cancelled().await;
        let cause = self.lifecycle.cause().unwrap_or(Cause::Interrupted);
        if cause.is_failure() {
            error!(error = %cause, "lifecycle cancelled with error");
        } else {
            debug!(cause = %cause, "lifecycle ended");
        }

        self.shutdown();
        cause
    }

    /// Stop both tunnels.
    pub fn shutdown(self) {
        if let Some(ssh) = &self.ssh {
            debug!(parent: &self.span, "closing SSH listener");
            ssh.close();
        }
        debug!(parent: &self.span, "closing IAP listener");
        drop(self.iap);
    }
}
