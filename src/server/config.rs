//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::peer::IceServer;

/// Default signaling port, matching the `PORT` fallback of the pages
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent signaling connections (0 = unlimited)
    pub max_connections: usize,

    /// ICE servers for the broadcaster's connection
    pub broadcaster_ice_servers: Vec<IceServer>,

    /// ICE servers for each viewer's connection
    pub viewer_ice_servers: Vec<IceServer>,

    /// Single origin allowed by CORS (None = any origin)
    pub allowed_origin: Option<String>,

    /// Directory holding `broadcast.html`, `viewer.html` and their assets
    pub static_dir: PathBuf,

    /// Capacity of each client's outbound signaling queue
    pub outbound_buffer: usize,

    /// Evict viewers that have not completed negotiation within this time
    /// (None = wait for disconnect)
    pub negotiation_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            broadcaster_ice_servers: vec![
                IceServer::new("stun:stun.stunprotocol.org:3478"),
                IceServer::new("stun:stun.l.google.com:19302"),
            ],
            viewer_ice_servers: vec![IceServer::new("stun:stun.l.google.com:19302")],
            allowed_origin: None,
            static_dir: PathBuf::from("public"),
            outbound_buffer: 64,
            negotiation_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Defaults overlaid with `PORT`, `RELAY_ALLOWED_ORIGIN` and
    /// `RELAY_STATIC_DIR` from the environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid PORT: {}", port)))?;
            config.bind_addr.set_port(port);
        }
        if let Some(origin) = lookup("RELAY_ALLOWED_ORIGIN").filter(|o| !o.is_empty()) {
            config.allowed_origin = Some(origin);
        }
        if let Some(dir) = lookup("RELAY_STATIC_DIR").filter(|d| !d.is_empty()) {
            config.static_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Replace the broadcaster's ICE servers
    pub fn broadcaster_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.broadcaster_ice_servers = servers;
        self
    }

    /// Replace the viewers' ICE servers
    pub fn viewer_ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.viewer_ice_servers = servers;
        self
    }

    /// Restrict CORS to one origin
    pub fn allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = Some(origin.into());
        self
    }

    /// Set the static page directory
    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Set the outbound queue capacity
    pub fn outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity.max(1);
        self
    }

    /// Evict viewers stuck negotiating for longer than `timeout`
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = Some(timeout);
        self
    }
}
