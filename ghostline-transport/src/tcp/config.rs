//! Configuration for establishing and running the TCP mesh.

use std::time::Duration;

/// Connection parameters for [`TcpTransport`](super::TcpTransport).
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Initial delay before retrying a failed connect
    pub initial_reconnect_delay: Duration,

    /// Maximum delay between connect attempts
    pub max_reconnect_delay: Duration,

    /// Maximum number of connect attempts per lower-ranked peer
    /// None means retry until the peer's listener comes up
    pub max_connect_attempts: Option<u32>,

    /// Timeout for a single connect attempt and for reading the hello
    pub connection_timeout: Duration,

    /// How long to wait for every higher-ranked peer to connect
    pub accept_timeout: Duration,

    /// Disable Nagle's algorithm on every connection
    pub nodelay: bool,

    /// Worker threads of the private IO runtime
    pub io_threads: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(5),
            max_connect_attempts: None,
            connection_timeout: Duration::from_secs(5),
            accept_timeout: Duration::from_secs(60),
            nodelay: true,
            io_threads: 1,
        }
    }
}

impl TcpConfig {
    /// Create a configuration for low-latency local networking.
    pub fn local_network() -> Self {
        Self {
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(500),
            max_connect_attempts: Some(200),
            connection_timeout: Duration::from_millis(500),
            accept_timeout: Duration::from_secs(10),
            nodelay: true,
            io_threads: 1,
        }
    }

    /// Set the number of IO worker threads.
    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = io_threads.max(1);
        self
    }

    /// Bound the number of connect attempts.
    pub fn with_max_connect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_connect_attempts = attempts;
        self
    }
}
