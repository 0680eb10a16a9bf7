//! Process-wide lifecycle signal
//!
//! A cancellation token paired with a single-assignment cause. The first
//! caller of [`Lifecycle::cancel`] records why the run is ending; later
//! callers still cancel (a no-op) but never overwrite that cause.

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why the lifecycle ended.
#[derive(Clone)]
pub enum Cause {
    /// Interrupt or terminate signal from the user or the OS.
    Interrupted,
    /// The post-ready command finished and the run was told to stop with it.
    Completed,
    /// A background task failed.
    Failed(Arc<dyn StdError + Send + Sync>),
}

impl Cause {
    pub fn failed<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Cause::Failed(Arc::new(error))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Cause::Failed(_))
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Interrupted => write!(f, "Interrupted"),
            Cause::Completed => write!(f, "Completed"),
            Cause::Failed(e) => f.debug_tuple("Failed").field(&e.to_string()).finish(),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Interrupted => write!(f, "interrupted"),
            Cause::Completed => write!(f, "command completed"),
            Cause::Failed(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
    cause: Arc<OnceLock<Cause>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the lifecycle. Returns true if this call recorded the cause.
    pub fn cancel(&self, cause: Cause) -> bool {
        // Record before firing the token so every woken waiter sees the cause.
        let recorded = self.cause.set(cause).is_ok();
        self.token.cancel();
        recorded
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The first recorded cause, if the lifecycle has been cancelled.
    pub fn cause(&self) -> Option<Cause> {
        self.cause.get().cloned()
    }

    /// Token that fires together with this lifecycle.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("cancelled", &self.is_cancelled())
            .field("cause", &self.cause.get())
            .finish()
    }
}
