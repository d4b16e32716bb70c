//! Datagram ingestion
//!
//! One [`Ingestor`] per process owns the feed's writer and appends every
//! received datagram payload to it, unframed and unvalidated.

pub mod config;
pub mod receiver;
pub mod source;

pub use config::{IngestConfig, MAX_DATAGRAM_SIZE};
pub use receiver::{IngestPhase, Ingestor};
pub use source::{DatagramSource, UdpSource};
