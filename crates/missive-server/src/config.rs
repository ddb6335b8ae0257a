//! Server configuration.

/// Default TCP port, kept from earlier deployments of the protocol.
pub const DEFAULT_PORT: u16 = 65432;

/// Default host to listen on.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host or address to listen on.
    pub host: String,

    /// TCP port to listen on. Port 0 asks the OS for a free one.
    pub port: u16,

    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration with the given listen address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// The `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
