use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Fatal failures of a running tunnel server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to accept connection on IAP listener: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
}

#[derive(Debug, Error)]
pub enum IapError {
    #[error("IAP tunnel was not ready after {0:?}")]
    ReadyTimeout(Duration),

    #[error("IAP tunnel returned an error: {0}")]
    TunnelReturnedError(#[source] Arc<ServeError>),

    #[error("Failed to read IAP listener port: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("IAP tunnel already started")]
    AlreadyStarted,
}
