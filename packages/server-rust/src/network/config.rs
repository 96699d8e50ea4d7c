//! Listener configuration for a service instance.

use std::time::Duration;

/// Default port when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8080;

/// Grace period granted to in-flight requests once shutdown starts.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Listener configuration: bind address, timeouts, and request limits.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time to read a request and produce its response.
    pub request_timeout: Duration,
    /// Upper bound on the combined size of request header names and values.
    pub max_header_bytes: usize,
    /// Upper bound on request body size.
    pub max_body_bytes: usize,
    /// Time in-flight requests may take to finish after shutdown begins.
    pub shutdown_grace: Duration,
}

impl NetworkConfig {
    /// Returns the `host:port` string the listener binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            request_timeout: Duration::from_secs(20),
            max_header_bytes: 1 << 20, // 1 MiB
            max_body_bytes: 1 << 20,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}
