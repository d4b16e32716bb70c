//! Relay server
//!
//! Wires the datagram ingestion loop, the shared feed, and the HTTP surface
//! together.

pub mod config;
pub mod listener;

pub use config::{parse_listen_addr, ServerConfig, DEFAULT_HTTP_PORT, DEFAULT_UDP_PORT};
pub use listener::FeedcastServer;
