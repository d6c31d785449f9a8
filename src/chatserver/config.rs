// Server configuration

use crate::chatserver::client::DEFAULT_POLL_TIMEOUT_MS;
use crate::chatserver::message::DEFAULT_STORAGE_LIMIT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use thiserror::Error;

/// Default client endpoint port
pub const DEFAULT_CLIENT_PORT: u16 = 2077;

/// Default admin endpoint port
pub const DEFAULT_ADMIN_PORT: u16 = 2078;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Chat server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address both endpoints bind to (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Client endpoint port (default: 2077)
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// Admin endpoint port (default: 2078)
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Maximum number of retained messages
    #[serde(default = "default_storage_limit")]
    pub storage_limit: usize,

    /// Admin shared secret; generated at startup when absent
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Poll interval advertised to clients in milliseconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    /// Largest accepted request body (bytes)
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_client_port() -> u16 {
    DEFAULT_CLIENT_PORT
}

fn default_admin_port() -> u16 {
    DEFAULT_ADMIN_PORT
}

fn default_storage_limit() -> usize {
    DEFAULT_STORAGE_LIMIT
}

fn default_poll_timeout() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_max_request_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            client_port: default_client_port(),
            admin_port: default_admin_port(),
            storage_limit: default_storage_limit(),
            admin_token: None,
            poll_timeout_ms: default_poll_timeout(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_limit == 0 {
            return Err(ConfigError::Invalid("storage_limit cannot be 0".into()));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Invalid("max_request_bytes cannot be 0".into()));
        }
        if self.client_port != 0 && self.client_port == self.admin_port {
            return Err(ConfigError::Invalid(format!(
                "client and admin endpoints share port {}",
                self.client_port
            )));
        }
        if let Some(token) = &self.admin_token {
            if token.is_empty() {
                return Err(ConfigError::Invalid("admin_token cannot be empty".into()));
            }
        }
        Ok(())
    }

    /// Client endpoint address
    pub fn client_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.client_port)
    }

    /// Admin endpoint address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.admin_port)
    }

    /// Configuration bound to ephemeral loopback ports
    pub fn ephemeral() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            client_port: 0,
            admin_port: 0,
            ..Self::default()
        }
    }
}
