//! Readiness and error signals published by a tunnel server
//!
//! Readiness latches: once set it stays set. The error slot is single
//! assignment: the first reported error is kept and later reports are
//! dropped, so a late failure can never mask the one that ended the run.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::ServeError;

#[derive(Debug)]
pub struct TunnelSignals {
    ready: watch::Sender<bool>,
    error: watch::Sender<Option<Arc<ServeError>>>,
}

impl TunnelSignals {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        let (error, _) = watch::channel(None);
        Self { ready, error }
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    /// Record `error` unless one was already reported. Returns the error that
    /// is now on record.
    pub fn report(&self, error: ServeError) -> Arc<ServeError> {
        let error = Arc::new(error);
        let candidate = Arc::clone(&error);
        self.error.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(candidate);
            true
        });

        self.error.borrow().clone().unwrap_or(error)
    }

    pub fn ready(&self) -> ReadyWatch {
        ReadyWatch(self.ready.subscribe())
    }

    pub fn errors(&self) -> ErrorWatch {
        ErrorWatch(self.error.subscribe())
    }
}

impl Default for TunnelSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ReadyWatch(watch::Receiver<bool>);

impl ReadyWatch {
    pub fn is_ready(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the server is ready. Never resolves if the server goes
    /// away without becoming ready.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|ready| *ready).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorWatch(watch::Receiver<Option<Arc<ServeError>>>);

impl ErrorWatch {
    pub fn current(&self) -> Option<Arc<ServeError>> {
        self.0.borrow().clone()
    }

    /// Resolves with the first reported error, or `None` if the server went
    /// away without reporting one.
    pub async fn wait(&mut self) -> Option<Arc<ServeError>> {
        match self.0.wait_for(|error| error.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn accept_error(message: &str) -> ServeError {
        ServeError::Accept(io::Error::new(io::ErrorKind::Other, message.to_string()))
    }

    #[tokio::test]
    async fn test_first_error_is_kept() {
        let signals = TunnelSignals::new();
        let mut errors = signals.errors();

        let first = signals.report(accept_error("first"));
        let second = signals.report(accept_error("second"));
        assert!(Arc::ptr_eq(&first, &second));

        let observed = errors.wait().await.unwrap();
        assert!(observed.to_string().contains("first"));
    }

    #[tokio::test]
    async fn test_ready_latches_for_late_subscribers() {
        let signals = TunnelSignals::new();
        assert!(!signals.ready().is_ready());

        signals.mark_ready();

        let mut ready = signals.ready();
        assert!(ready.is_ready());
        ready.wait().await;
    }

    #[tokio::test]
    async fn test_error_wait_ends_when_server_dropped() {
        let signals = TunnelSignals::new();
        let mut errors = signals.errors();
        drop(signals);

        assert!(errors.wait().await.is_none());
    }
}
