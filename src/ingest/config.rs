//! Ingestion configuration

use std::net::SocketAddr;

/// Largest UDP payload
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Back-to-back receive failures tolerated before the socket is rebound
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 64;

/// Datagram ingestion options
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Address to bind the datagram socket to
    pub bind_addr: SocketAddr,

    /// Receive buffer size; longer datagrams are truncated by the OS
    pub recv_buffer_size: usize,

    /// Consecutive receive failures before rebinding (0 = never rebind)
    pub max_consecutive_errors: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 12224)),
            recv_buffer_size: MAX_DATAGRAM_SIZE,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl IngestConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the receive buffer size (capped at the largest UDP payload)
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.clamp(1, MAX_DATAGRAM_SIZE);
        self
    }

    /// Set the consecutive error threshold for rebinding
    pub fn max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }
}
