use iapgo_config::TunnelConfig;

/// Port the outer tunnel targets when it carries the nested SSH session.
pub const SSH_PORT: u16 = 22;

/// Where the outer tunnel terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    pub project: String,
    pub zone: String,
    pub instance: String,
    pub port: u16,
    pub interface: String,
}

impl TunnelTarget {
    pub fn from_config(config: &TunnelConfig) -> Self {
        // With nested tunnelling the outer tunnel carries SSH, not the
        // application protocol.
        let port = if config.has_nested_tunnel() {
            SSH_PORT
        } else {
            config.remote_port
        };

        Self {
            project: config.project_id.clone(),
            zone: config.zone.clone(),
            instance: config.instance.clone(),
            port,
            interface: config.remote_nic.clone(),
        }
    }
}
