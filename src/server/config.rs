//! Server configuration

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::feed::FeedConfig;
use crate::ingest::IngestConfig;

/// Default HTTP/WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 12223;

/// Default datagram ingestion port
pub const DEFAULT_UDP_PORT: u16 = 12224;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the HTTP and subscriber endpoints
    pub http_addr: SocketAddr,

    /// Path of the schema description file
    pub schema_path: PathBuf,

    /// Root message type within the schema
    pub message_type: String,

    /// Maximum concurrent subscribers (0 = unlimited)
    pub max_subscribers: usize,

    /// Stats log interval (zero disables)
    pub stats_interval: Duration,

    /// Broadcast buffer options
    pub feed: FeedConfig,

    /// Datagram ingestion options
    pub ingest: IngestConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            schema_path: PathBuf::from("pb.proto"),
            message_type: "Envelope".to_string(),
            max_subscribers: 0, // Unlimited
            stats_interval: Duration::from_secs(30),
            feed: FeedConfig::default(),
            ingest: IngestConfig::with_addr(SocketAddr::from(([0, 0, 0, 0], DEFAULT_UDP_PORT))),
        }
    }
}

impl ServerConfig {
    /// Set the HTTP bind address
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Set the datagram bind address
    pub fn udp_addr(mut self, addr: SocketAddr) -> Self {
        self.ingest.bind_addr = addr;
        self
    }

    /// Set the schema file and its root message type
    pub fn schema(mut self, path: impl Into<PathBuf>, message_type: impl Into<String>) -> Self {
        self.schema_path = path.into();
        self.message_type = message_type.into();
        self
    }

    /// Set maximum concurrent subscribers
    pub fn max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    /// Set the stats log interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the feed options
    pub fn feed(mut self, feed: FeedConfig) -> Self {
        self.feed = feed;
        self
    }

    /// Set the ingestion options
    pub fn ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }
}

/// Parse a listen address
///
/// Accepts `host:port`, `ip:port`, or a bare `:port` meaning all interfaces.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr> {
    let value = value.trim();

    if let Some(port) = value.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| Error::Config(format!("invalid port in listen address {:?}", value)))?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }

    if let Ok(addr) = value.parse() {
        return Ok(addr);
    }

    value
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("cannot resolve listen address {:?}: {}", value, e)))?
        .next()
        .ok_or_else(|| Error::Config(format!("listen address {:?} resolved to nothing", value)))
}
