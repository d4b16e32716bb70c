//! Live datagram feed relay
//!
//! `feedcast` receives a binary feed over UDP and fans it out to any number of
//! WebSocket subscribers. Each subscriber sees the feed live from the moment it
//! attaches; nothing before that is replayed. A schema side-channel tells
//! subscribers how to decode what they receive.
//!
//! ```text
//!   UDP datagrams ──► Ingestor ──► FeedWriter::append()
//!                                       │
//!                                  [ Feed buffer ]
//!                                       │
//!        GET /stream ──► Relay ──► Cursor::read() ──► binary message
//! ```
//!
//! # Example
//!
//! ```no_run
//! use feedcast::{FeedcastServer, ServerConfig};
//!
//! # async fn example() -> feedcast::Result<()> {
//! let config = ServerConfig::default().schema("pb.proto", "Envelope");
//! let server = FeedcastServer::bind(config).await?;
//! server.run().await
//! # }
//! ```

pub mod error;
pub mod feed;
pub mod http;
pub mod ingest;
pub mod relay;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use feed::{Cursor, Feed, FeedConfig, FeedError, FeedWriter, Retention};
pub use ingest::{IngestConfig, Ingestor};
pub use relay::{Relay, RelayOutcome};
pub use server::{FeedcastServer, ServerConfig};
