//! Server configuration.

use std::net::SocketAddr;

use crate::config::ServerSection;
use crate::error::{FulcrumError, Result};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Enable request tracing
    pub logging: bool,
    /// CORS enabled
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_body_size: 1024 * 1024, // 1MB
            logging: true,
            cors_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` config section.
    pub fn from_section(section: &ServerSection) -> Result<Self> {
        let addr: SocketAddr = section.listen_addr().parse().map_err(|e| {
            FulcrumError::Config(format!("Invalid listen address {}: {e}", section.listen_addr()))
        })?;
        Ok(Self {
            addr,
            cors_enabled: section.cors_enabled,
            ..Self::default()
        })
    }

    /// Bind to all interfaces
    pub fn bind_all(mut self) -> Self {
        self.addr = SocketAddr::from(([0, 0, 0, 0], self.addr.port()));
        self
    }

    /// Disable request tracing
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }
}
