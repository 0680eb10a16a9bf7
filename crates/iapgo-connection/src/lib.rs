//! Connection plumbing shared by the outer and nested tunnels
//!
//! Provides the full-duplex byte relay, the process-wide lifecycle signal and
//! loopback listener binding.

pub mod lifecycle;
pub mod listener;
pub mod relay;

pub use lifecycle::{Cause, Lifecycle};
pub use listener::{bind_local, ListenError};
pub use relay::{Relay, RelayOutcome};
