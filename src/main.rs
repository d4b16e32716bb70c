//! feedcast binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Defaults: HTTP on :12223, UDP on :12224, schema pb.proto, root type Envelope
//! feedcast
//!
//! # Custom addresses and schema
//! feedcast --http-addr 127.0.0.1:8080 --udp-addr :9000 \
//!   --pb-file schemas/feed.proto --pb-message-type Frame
//!
//! # With logging
//! RUST_LOG=debug feedcast
//! ```
//!
//! # Environment Variables
//!
//! When set to a non-empty value these take precedence over the matching flags.
//!
//! - `PORT`: HTTP port on all interfaces (overrides `--http-addr` and `--port`)
//! - `UDPADDRESS`: datagram listen address
//! - `PBFILE`: schema file path
//! - `PBMESSAGE`: root message type
//! - `RUST_LOG`: log filter (default: `info`)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use feedcast::server::parse_listen_addr;
use feedcast::{Error, FeedConfig, FeedcastServer, ServerConfig};

/// Relay a live UDP feed to WebSocket subscribers
///
/// `PORT`, `UDPADDRESS`, `PBFILE` and `PBMESSAGE` take precedence over the
/// matching flags when set to a non-empty value.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP and subscriber listen address
    #[arg(long, default_value = ":12223", value_parser = parse_listen_addr)]
    http_addr: SocketAddr,

    /// HTTP port on all interfaces; overrides --http-addr [env: PORT]
    #[arg(long)]
    port: Option<u16>,

    /// Datagram listen address [env: UDPADDRESS]
    #[arg(long, default_value = ":12224", value_parser = parse_listen_addr)]
    udp_addr: SocketAddr,

    /// Schema description file served at /proto [env: PBFILE]
    #[arg(long, default_value = "pb.proto")]
    pb_file: PathBuf,

    /// Root message type within the schema [env: PBMESSAGE]
    #[arg(long, default_value = "Envelope")]
    pb_message_type: String,

    /// Maximum concurrent subscribers (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_subscribers: usize,

    /// Largest chunk forwarded in one message, in bytes
    #[arg(long, default_value_t = feedcast::feed::DEFAULT_MAX_CHUNK_SIZE)]
    max_chunk_size: usize,

    /// Cap on bytes held for slow subscribers; those that fall further behind are dropped
    #[arg(long)]
    max_retained_bytes: Option<usize>,
}

impl Args {
    /// Apply environment overrides on top of the parsed flags
    ///
    /// Empty values are treated as unset.
    fn apply_env<F>(mut self, lookup: F) -> feedcast::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(port) = var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid PORT {:?}", port)))?;
            self.port = Some(port);
        }
        if let Some(addr) = var("UDPADDRESS") {
            self.udp_addr = parse_listen_addr(&addr)?;
        }
        if let Some(file) = var("PBFILE") {
            self.pb_file = PathBuf::from(file);
        }
        if let Some(message_type) = var("PBMESSAGE") {
            self.pb_message_type = message_type;
        }

        Ok(self)
    }

    fn into_config(self) -> ServerConfig {
        let http_addr = match self.port {
            Some(port) => SocketAddr::from(([0, 0, 0, 0], port)),
            None => self.http_addr,
        };

        let mut feed = FeedConfig::default().max_chunk_size(self.max_chunk_size);
        if let Some(max) = self.max_retained_bytes {
            feed = feed.max_retained_bytes(max);
        }

        ServerConfig::default()
            .http_addr(http_addr)
            .udp_addr(self.udp_addr)
            .schema(self.pb_file, self.pb_message_type)
            .max_subscribers(self.max_subscribers)
            .feed(feed)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Args::parse().apply_env(|key| std::env::var(key).ok()) {
        Ok(args) => args.into_config(),
        Err(e) => {
            error!(error = %e, "Invalid environment");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        http_addr = %config.http_addr,
        udp_addr = %config.ingest.bind_addr,
        schema = %config.schema_path.display(),
        message_type = %config.message_type,
        "feedcast starting"
    );

    let server = match FeedcastServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    match server.run_until(shutdown).await {
        Ok(()) => {
            info!("feedcast stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
