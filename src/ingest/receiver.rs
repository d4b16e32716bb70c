//! Datagram receive loop
//!
//! Receives datagrams and appends each payload verbatim to the feed. A failed
//! receive is logged and skipped; only a socket that cannot be rebound stops
//! the loop.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::feed::FeedWriter;
use crate::stats::Counters;

use super::config::IngestConfig;
use super::source::{DatagramSource, UdpSource};

/// Ingestion loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// Socket bound, loop not started
    Listening,
    /// Waiting for the next datagram
    Receiving,
    /// Appending a received payload to the feed
    Appending,
    /// Loop finished (shutdown or unrecoverable transport failure)
    Stopped,
}

/// The single producer of the feed
pub struct Ingestor<S = UdpSource> {
    config: IngestConfig,
    source: S,
    writer: FeedWriter,
    counters: Arc<Counters>,
    phase: IngestPhase,
}

impl Ingestor<UdpSource> {
    /// Bind the datagram socket
    ///
    /// A bind failure is fatal and returned as [`Error::Bind`](crate::Error::Bind).
    pub async fn bind(
        config: IngestConfig,
        writer: FeedWriter,
        counters: Arc<Counters>,
    ) -> Result<Self> {
        let source = UdpSource::bind(config.bind_addr).await?;

        tracing::info!(addr = %source.local_addr(), "UDP ingestion listening");

        Ok(Self::with_source(config, source, writer, counters))
    }
}

impl<S: DatagramSource> Ingestor<S> {
    /// Create an ingestor over an already opened source
    pub fn with_source(
        config: IngestConfig,
        source: S,
        writer: FeedWriter,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            config,
            source,
            writer,
            counters,
            phase: IngestPhase::Listening,
        }
    }

    /// Address the source is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.source.local_addr()
    }

    /// Current loop state
    pub fn phase(&self) -> IngestPhase {
        self.phase
    }

    /// Run until `shutdown` is cancelled or the socket cannot be rebound
    ///
    /// The feed is closed when the loop returns, for either reason.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let result = self.receive_loop(&shutdown).await;

        self.phase = IngestPhase::Stopped;
        self.writer.feed().close();

        let addr = self.source.local_addr();
        match &result {
            Ok(()) => tracing::info!(addr = %addr, "UDP ingestion stopped"),
            Err(e) => tracing::error!(addr = %addr, error = %e, "UDP ingestion failed"),
        }

        result
    }

    async fn receive_loop(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut consecutive_errors = 0u32;

        loop {
            self.phase = IngestPhase::Receiving;

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                received = self.source.recv_from(&mut buf) => received,
            };

            match received {
                Ok((0, _)) => consecutive_errors = 0,
                Ok((len, peer)) => {
                    consecutive_errors = 0;
                    self.phase = IngestPhase::Appending;

                    self.writer.append(Bytes::copy_from_slice(&buf[..len]));
                    self.counters.datagram_received(len);

                    tracing::trace!(peer = %peer, bytes = len, "Datagram appended");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.counters.receive_error();

                    tracing::warn!(
                        addr = %self.source.local_addr(),
                        error = %e,
                        consecutive = consecutive_errors,
                        "Datagram receive failed"
                    );

                    let limit = self.config.max_consecutive_errors;
                    if limit > 0 && consecutive_errors >= limit {
                        tracing::warn!(addr = %self.source.local_addr(), "Rebinding UDP socket");
                        self.source.rebind().await?;
                        self.counters.socket_rebound();
                        consecutive_errors = 0;
                    }
                }
            }
        }
    }
}

impl<S: DatagramSource> std::fmt::Debug for Ingestor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("local_addr", &self.source.local_addr())
            .field("phase", &self.phase)
            .finish()
    }
}
