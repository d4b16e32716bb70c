//! Relay server
//!
//! Binds both transports, then runs the ingestion loop and the HTTP endpoint
//! side by side until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::feed::{self, Feed};
use crate::http::{create_router, AppState, Schema};
use crate::ingest::Ingestor;
use crate::server::config::ServerConfig;
use crate::stats::{Counters, ServerStats};

/// Feed relay server
pub struct FeedcastServer {
    config: ServerConfig,
    listener: TcpListener,
    http_addr: SocketAddr,
    ingestor: Ingestor,
    feed: Feed,
    schema: Schema,
    counters: Arc<Counters>,
}

impl FeedcastServer {
    /// Load the schema file and bind both listening sockets
    ///
    /// Any failure here is fatal: nothing has started yet.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let schema = Schema::load(&config.schema_path, config.message_type.clone()).await?;
        Self::bind_with_schema(config, schema).await
    }

    /// Bind both listening sockets with an in-memory schema
    pub async fn bind_with_schema(config: ServerConfig, schema: Schema) -> Result<Self> {
        let counters = Arc::new(Counters::new());
        let (writer, feed) = feed::channel(config.feed.clone());

        let ingestor = Ingestor::bind(config.ingest.clone(), writer, Arc::clone(&counters)).await?;

        let listener = TcpListener::bind(config.http_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.http_addr,
                source,
            })?;
        let http_addr = listener.local_addr()?;
        tracing::info!(addr = %http_addr, "HTTP server listening");

        Ok(Self {
            config,
            listener,
            http_addr,
            ingestor,
            feed,
            schema,
            counters,
        })
    }

    /// Address of the HTTP and subscriber endpoints
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Address of the datagram socket
    pub fn udp_addr(&self) -> SocketAddr {
        self.ingestor.local_addr()
    }

    /// Reader handle to the feed
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Shared counters
    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Snapshot of server statistics
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    /// Run the server
    ///
    /// Returns only if ingestion stops on an unrecoverable transport failure.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            listener,
            mut ingestor,
            feed,
            schema,
            counters,
            ..
        } = self;

        let token = CancellationToken::new();

        let ingest_token = token.clone();
        let mut ingest_handle = tokio::spawn(async move { ingestor.run(ingest_token).await });

        let stats_handle = spawn_stats_task(feed.clone(), Arc::clone(&counters), config.stats_interval);

        let state = AppState::new(feed.clone(), schema, counters, config.max_subscribers);
        let app = create_router(state);
        let serve_token = token.clone();
        let serve_handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await
        });

        let mut ingest_done = false;
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            joined = &mut ingest_handle => {
                ingest_done = true;
                flatten(joined)
            }
        };

        // Stop ingestion and release every subscriber
        token.cancel();
        feed.close();
        if let Some(handle) = stats_handle {
            handle.abort();
        }

        if !ingest_done {
            flatten(ingest_handle.await)?;
        }
        serve_handle
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        result
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Periodically log server statistics
fn spawn_stats_task(
    feed: Feed,
    counters: Arc<Counters>,
    interval: Duration,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let stats = counters.snapshot();
            if !stats.has_activity() {
                continue;
            }
            let feed_stats = feed.stats();

            tracing::info!(
                datagrams = stats.datagrams_received,
                bytes_ingested = stats.bytes_ingested,
                receive_errors = stats.receive_errors,
                subscribers = stats.subscribers_active,
                chunks_forwarded = stats.chunks_forwarded,
                bytes_forwarded = stats.bytes_forwarded,
                retained_bytes = feed_stats.retained_bytes,
                dropped_bytes = feed_stats.dropped_bytes,
                uptime_secs = stats.uptime.as_secs(),
                "Relay stats"
            );
        }
    }))
}
