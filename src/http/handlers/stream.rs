//! Subscriber WebSocket endpoint
//!
//! The cursor is opened before the upgrade response goes out, so a subscriber
//! sees everything ingested after its handshake completes. After the upgrade
//! the server only sends binary messages, one per chunk.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::Extensions,
    response::Response,
};
use bytes::Bytes;
use futures::stream::{SplitStream, StreamExt};
use futures::{future, SinkExt};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::feed::Cursor;
use crate::http::error::AppError;
use crate::http::state::AppState;
use crate::relay::{Relay, SubscriberContext};

pub async fn stream_handler(
    State(state): State<AppState>,
    extensions: Extensions,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let permit = state.try_acquire_subscriber()?;

    let mut ctx = SubscriberContext::new(state.next_subscriber_id());
    if let Some(ConnectInfo(peer)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        ctx = ctx.with_peer(*peer);
    }

    // Dropped, and therefore closed, if the upgrade never completes
    let cursor = state.feed.open_cursor();
    let subscriber_id = ctx.subscriber_id;

    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!(subscriber_id = subscriber_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| serve_subscriber(socket, ctx, cursor, state, permit)))
}

async fn serve_subscriber(
    socket: WebSocket,
    ctx: SubscriberContext,
    cursor: Cursor,
    state: AppState,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let (sender, receiver) = socket.split();
    let subscriber_id = ctx.subscriber_id;

    let watcher = tokio::spawn(watch_for_close(
        receiver,
        cursor.cancellation(),
        subscriber_id,
    ));

    let sink = sender.with(|chunk: Bytes| future::ready(Ok::<_, axum::Error>(Message::Binary(chunk))));
    let report = Relay::new(ctx, cursor, sink, Arc::clone(&state.counters))
        .run()
        .await;

    // The relay closed the cursor, which cancels the watcher
    let _ = watcher.await;

    tracing::debug!(
        subscriber_id = subscriber_id,
        outcome = ?report.outcome,
        bitrate = report.stats.bitrate,
        "Subscriber connection closed"
    );
}

/// Notice the subscriber going away and cancel its cursor
///
/// Incoming messages carry nothing for the relay; they are read only so close
/// frames and dropped connections are seen while the cursor is parked.
async fn watch_for_close(
    mut receiver: SplitStream<WebSocket>,
    cancel: CancellationToken,
    subscriber_id: u64,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber_id = subscriber_id, error = %e, "Subscriber receive failed");
                    break;
                }
            },
        }
    }

    cancel.cancel();
}
