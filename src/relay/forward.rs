//! Per-subscriber forwarding loop
//!
//! Drains the subscriber's cursor and sends each chunk as one message. The
//! relay owns both the cursor and the sending half of the connection; both are
//! closed on every exit path.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio_util::sync::CancellationToken;

use crate::feed::{Cursor, FeedError};
use crate::stats::{Counters, RelayStats};

use super::context::SubscriberContext;
use super::state::{RelayFailure, RelayOutcome, RelayPhase};

/// How long teardown waits for the connection close handshake
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a finished relay
#[derive(Debug, Clone)]
pub struct RelayReport {
    /// How the relay ended
    pub outcome: RelayOutcome,
    /// What it forwarded
    pub stats: RelayStats,
}

/// Forwarding loop for one subscriber
pub struct Relay<S> {
    ctx: SubscriberContext,
    cursor: Cursor,
    cancel: CancellationToken,
    sink: S,
    counters: Arc<Counters>,
    phase: RelayPhase,
    stats: RelayStats,
    close_timeout: Duration,
}

impl<S> Relay<S>
where
    S: Sink<Bytes> + Unpin,
    S::Error: Display,
{
    /// Create a relay over an already opened cursor
    ///
    /// Cancelling the cursor's token ends the relay as `Detached`.
    pub fn new(ctx: SubscriberContext, cursor: Cursor, sink: S, counters: Arc<Counters>) -> Self {
        let cancel = cursor.cancellation();

        Self {
            ctx,
            cursor,
            cancel,
            sink,
            counters,
            phase: RelayPhase::Attached,
            stats: RelayStats::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Bound the close handshake on teardown
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Current phase
    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    /// Run until the subscriber detaches, the feed fails, or a send fails
    pub async fn run(mut self) -> RelayReport {
        self.counters.subscriber_attached();

        tracing::info!(
            subscriber_id = self.ctx.subscriber_id,
            peer = ?self.ctx.peer_addr,
            position = self.cursor.position(),
            "Subscriber attached"
        );

        let outcome = self.forward_loop().await;
        self.phase.advance(outcome.phase());

        self.cursor.close();
        // A stalled peer must not hold the task (and its subscriber slot)
        match tokio::time::timeout(self.close_timeout, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!(
                subscriber_id = self.ctx.subscriber_id,
                error = %e,
                "Connection close failed"
            ),
            Err(_) => tracing::debug!(
                subscriber_id = self.ctx.subscriber_id,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Connection close timed out"
            ),
        }
        self.counters.subscriber_detached();

        self.stats.duration = self.ctx.attached_for();
        self.stats.calculate_bitrate();

        match &outcome {
            RelayOutcome::Detached => tracing::info!(
                subscriber_id = self.ctx.subscriber_id,
                chunks = self.stats.chunks_forwarded,
                bytes = self.stats.bytes_forwarded,
                "Subscriber detached"
            ),
            RelayOutcome::Failed(failure) => tracing::info!(
                subscriber_id = self.ctx.subscriber_id,
                chunks = self.stats.chunks_forwarded,
                bytes = self.stats.bytes_forwarded,
                reason = %failure,
                "Subscriber relay failed"
            ),
        }

        RelayReport {
            outcome,
            stats: self.stats,
        }
    }

    async fn forward_loop(&mut self) -> RelayOutcome {
        loop {
            self.phase.advance(RelayPhase::Draining);

            let chunk = match self.cursor.read().await {
                Ok(chunk) => chunk,
                Err(FeedError::Closed) if self.cursor.is_cancelled() => {
                    return RelayOutcome::Detached;
                }
                Err(e) => return RelayOutcome::Failed(RelayFailure::Feed(e)),
            };

            self.phase.advance(RelayPhase::Forwarding);
            let len = chunk.len();

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return RelayOutcome::Detached,
                sent = self.sink.send(chunk) => {
                    if let Err(e) = sent {
                        return RelayOutcome::Failed(RelayFailure::Send(e.to_string()));
                    }
                }
            }

            self.stats.on_chunk(len);
            self.counters.chunk_forwarded(len);

            tracing::trace!(
                subscriber_id = self.ctx.subscriber_id,
                bytes = len,
                position = self.cursor.position(),
                "Chunk forwarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures::channel::mpsc;
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::feed::{channel, Feed, FeedConfig};

    fn spawn_relay(
        feed: &Feed,
        id: u64,
        counters: &Arc<Counters>,
    ) -> (
        mpsc::Receiver<Bytes>,
        CancellationToken,
        JoinHandle<RelayReport>,
    ) {
        let cursor = feed.open_cursor();
        let cancel = cursor.cancellation();
        let (tx, rx) = mpsc::channel(16);
        let relay = Relay::new(SubscriberContext::new(id), cursor, tx, Arc::clone(counters));
        assert_eq!(relay.phase(), RelayPhase::Attached);

        (rx, cancel, tokio::spawn(relay.run()))
    }

    async fn next_message(rx: &mut mpsc::Receiver<Bytes>) -> Bytes {
        timeout(Duration::from_secs(1), rx.next())
            .await
            .expect("no message forwarded")
            .expect("relay closed the connection")
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_new_data() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        writer.append(Bytes::from_static(b"AA"));
        writer.append(Bytes::from_static(b"BB"));

        let (mut rx, cancel, handle) = spawn_relay(&feed, 1, &counters);
        writer.append(Bytes::from_static(b"CC"));

        assert_eq!(next_message(&mut rx).await, Bytes::from_static(b"CC"));

        cancel.cancel();
        let report = handle.await.unwrap();
        assert_eq!(report.outcome, RelayOutcome::Detached);
        assert_eq!(report.stats.chunks_forwarded, 1);
        assert_eq!(report.stats.bytes_forwarded, 2);

        // The relay closed its end of the connection
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_attached_at_different_times() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        let (mut first, cancel_first, first_handle) = spawn_relay(&feed, 1, &counters);
        writer.append(Bytes::from_static(b"XX"));
        assert_eq!(next_message(&mut first).await, Bytes::from_static(b"XX"));

        let (mut second, cancel_second, second_handle) = spawn_relay(&feed, 2, &counters);
        writer.append(Bytes::from_static(b"YY"));

        assert_eq!(next_message(&mut first).await, Bytes::from_static(b"YY"));
        assert_eq!(next_message(&mut second).await, Bytes::from_static(b"YY"));

        cancel_first.cancel();
        cancel_second.cancel();
        first_handle.await.unwrap();
        second_handle.await.unwrap();
        assert_eq!(counters.snapshot().subscribers_total, 2);
        assert_eq!(counters.snapshot().subscribers_active, 0);
    }

    #[tokio::test]
    async fn test_disconnect_does_not_affect_others() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        let (gone, _cancel, gone_handle) = spawn_relay(&feed, 1, &counters);
        drop(gone);
        writer.append(Bytes::from_static(b"lost"));

        let report = timeout(Duration::from_secs(1), gone_handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            report.outcome,
            RelayOutcome::Failed(RelayFailure::Send(_))
        ));
        assert_eq!(feed.cursor_count(), 0);

        let (mut fresh, cancel, handle) = spawn_relay(&feed, 2, &counters);
        writer.append(Bytes::from_static(b"next"));

        assert_eq!(next_message(&mut fresh).await, Bytes::from_static(b"next"));
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_blocked_detaches() {
        let (_writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        let (_rx, cancel, handle) = spawn_relay(&feed, 1, &counters);
        tokio::task::yield_now().await;
        cancel.cancel();

        let report = timeout(Duration::from_secs(1), handle)
            .await
            .expect("blocked read was not unblocked")
            .unwrap();
        assert_eq!(report.outcome, RelayOutcome::Detached);
        assert_eq!(feed.cursor_count(), 0);
    }

    #[tokio::test]
    async fn test_feed_close_fails_relay() {
        let (writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        let (_rx, _cancel, handle) = spawn_relay(&feed, 1, &counters);
        writer.close();

        let report = timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            report.outcome,
            RelayOutcome::Failed(RelayFailure::Feed(FeedError::Closed))
        );
    }

    #[tokio::test]
    async fn test_messages_carry_exactly_the_bytes_read() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        let (mut rx, cancel, handle) = spawn_relay(&feed, 1, &counters);

        writer.append(Bytes::from_static(b"a much longer payload"));
        assert_eq!(
            next_message(&mut rx).await,
            Bytes::from_static(b"a much longer payload")
        );

        writer.append(Bytes::from_static(b"s"));
        assert_eq!(next_message(&mut rx).await, Bytes::from_static(b"s"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_lagged_subscriber_fails() {
        let (mut writer, feed) = channel(FeedConfig::default().max_retained_bytes(4));
        let counters = Arc::new(Counters::new());

        // The feed moves past the retention cap before the relay reads once
        let cursor = feed.open_cursor();
        let (tx, _rx) = mpsc::channel(16);
        let relay = Relay::new(SubscriberContext::new(1), cursor, tx, Arc::clone(&counters));

        for _ in 0..8 {
            writer.append(Bytes::from_static(b"AAAA"));
        }
        let handle = tokio::spawn(relay.run());

        let report = timeout(Duration::from_secs(1), handle)
            .await
            .expect("lagged relay kept running")
            .unwrap();
        assert!(matches!(
            report.outcome,
            RelayOutcome::Failed(RelayFailure::Feed(FeedError::Lagged { .. }))
        ));
    }

    /// Connection whose peer never drains: sends and closes never finish
    struct StalledSink;

    impl Sink<Bytes> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _: Bytes) -> Result<(), Infallible> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_stalled_close_is_bounded() {
        let (writer, feed) = channel(FeedConfig::default());
        let counters = Arc::new(Counters::new());

        let relay = Relay::new(
            SubscriberContext::new(1),
            feed.open_cursor(),
            StalledSink,
            Arc::clone(&counters),
        )
        .close_timeout(Duration::from_millis(50));
        let handle = tokio::spawn(relay.run());

        writer.close();

        let report = timeout(Duration::from_secs(1), handle)
            .await
            .expect("teardown waited on a stalled peer")
            .unwrap();
        assert_eq!(
            report.outcome,
            RelayOutcome::Failed(RelayFailure::Feed(FeedError::Closed))
        );
        assert_eq!(feed.cursor_count(), 0);
        assert_eq!(counters.snapshot().subscribers_active, 0);
    }
}
