//! Configuration for Marina
//!
//! Server and client settings with sensible defaults and builders.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{MarinaError, Result};

/// What a worker pool does when its queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait for queue space
    Block,

    /// Fail the submission immediately
    Reject,
}

impl std::str::FromStr for Backpressure {
    type Err = MarinaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Backpressure::Block),
            "reject" => Ok(Backpressure::Reject),
            other => Err(MarinaError::Config(format!(
                "unknown backpressure policy '{}' (expected 'block' or 'reject')",
                other
            ))),
        }
    }
}

/// Resolve a `host:port` string, mapping every failure to a configuration error
pub fn resolve_addr(addr: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| MarinaError::Config(format!("invalid address '{}': {}", addr, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(MarinaError::Config(format!(
            "address '{}' did not resolve",
            addr
        )));
    }
    Ok(addrs)
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the server role
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections (admission capacity)
    pub max_connections: usize,

    /// How often the acceptor re-checks for shutdown while idle (milliseconds)
    pub accept_poll_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Worker Configuration
    // -------------------------------------------------------------------------
    /// Threads in the shared compute pool
    pub worker_threads: usize,

    /// Pending computations the compute pool queues before applying backpressure
    pub task_queue_capacity: usize,

    /// Compute pool policy when the queue is full
    pub backpressure: Backpressure,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7474".to_string(),
            max_connections: 64,
            accept_poll_interval_ms: 50,
            worker_threads: 4,
            task_queue_capacity: 128,
            backpressure: Backpressure::Block,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Check values that would make the server unable to start
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(MarinaError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(MarinaError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        resolve_addr(&self.listen_addr)?;
        Ok(())
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_interval_ms.max(1))
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the accept poll interval (in milliseconds)
    pub fn accept_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_interval_ms = ms;
        self
    }

    /// Set the number of compute threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the compute queue capacity
    pub fn task_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.task_queue_capacity = capacity;
        self
    }

    /// Set the compute pool backpressure policy
    pub fn backpressure(mut self, policy: Backpressure) -> Self {
        self.config.backpressure = policy;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the client role
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (host:port)
    pub server_addr: String,

    /// Pause between reconnection attempts (milliseconds).
    /// Signed so a bad value can be reported instead of rejected at parse time.
    pub reconnect_delay_ms: i64,

    /// Consecutive failed connection attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Per-address connect timeout (milliseconds, 0 = OS default)
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7474".to_string(),
            reconnect_delay_ms: 2000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: 5000,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Check values that no amount of retrying can fix
    pub fn validate(&self) -> Result<()> {
        if self.max_reconnect_attempts == 0 {
            return Err(MarinaError::Config(
                "max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The backoff delay, or `None` if the configured value is unusable
    pub fn reconnect_delay(&self) -> Option<Duration> {
        u64::try_from(self.reconnect_delay_ms)
            .ok()
            .map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the server address
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the reconnection delay (in milliseconds)
    pub fn reconnect_delay_ms(mut self, ms: i64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    /// Set the maximum number of consecutive connection attempts
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
