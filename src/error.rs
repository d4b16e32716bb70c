//! Error types

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::feed::FeedError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// A listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The schema description file could not be loaded
    #[error("failed to read schema file {}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Feed failure
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Other I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
