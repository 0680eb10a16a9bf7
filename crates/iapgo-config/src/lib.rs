//! Configuration for iapgo
//!
//! A configuration file maps section names to tunnel definitions. Loading is
//! strict: unknown fields are rejected and a nested SSH tunnel must name its
//! destination. When the SSH account name is omitted it is resolved once,
//! through the cloud CLI, before the configuration is handed out.

mod config;
mod error;
mod example;
pub mod login;

pub use config::{
    load_config, parse_sections, NestedTunnelConfig, TunnelConfig, DEFAULT_CONFIG_FILE,
    DEFAULT_CONFIG_SECTION, DEFAULT_PRIVATE_KEY_FILE, DEFAULT_REMOTE_NIC,
};
pub use error::ConfigError;
pub use example::EXAMPLE_CONFIG;
pub use login::{AccountResolver, GcloudAccountResolver};
