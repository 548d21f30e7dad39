use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the gateway listener to
    pub listen: SocketAddr,
}
