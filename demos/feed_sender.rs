//! Test feed generator
//!
//! Sends a numbered datagram to a feedcast ingestion socket at a fixed rate.
//!
//! Run with: cargo run --example feed_sender [TARGET_ADDR] [INTERVAL_MS]
//!
//! Examples:
//!   cargo run --example feed_sender                      # sends to 127.0.0.1:12224 every 100ms
//!   cargo run --example feed_sender 127.0.0.1:9000 20    # sends to 127.0.0.1:9000 every 20ms
//!
//! Watch the output by opening http://localhost:12223/ while it runs.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let target: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:12224".to_string())
        .parse()?;
    let interval_ms: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(100);

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));

    tracing::info!(target = %target, interval_ms = interval_ms, "Sending feed");

    let mut seq: u64 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        let mut payload = seq.to_be_bytes().to_vec();
        payload.extend_from_slice(b"feedcast");
        if let Err(e) = socket.send_to(&payload, target).await {
            tracing::warn!(error = %e, seq = seq, "Send failed");
        }

        seq += 1;
        if seq % 100 == 0 {
            tracing::info!(sent = seq, "Progress");
        }
    }

    tracing::info!(sent = seq, "Stopped");
    Ok(())
}
