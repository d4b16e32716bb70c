//! Per-subscriber read cursor

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::error::FeedError;
use super::store::Shared;

/// Independent read position into a feed
///
/// Opened at the append position current at creation time. Reading advances
/// only this cursor. Dropping the cursor closes it.
pub struct Cursor {
    id: u64,
    position: u64,
    shared: Arc<Shared>,
    head_rx: watch::Receiver<u64>,
    cancel: CancellationToken,
    closed: bool,
}

impl Cursor {
    pub(super) fn open(shared: Arc<Shared>) -> Self {
        let (id, position, head_rx) = shared.open_cursor();

        tracing::trace!(cursor_id = id, position = position, "Cursor opened");

        Self {
            id,
            position,
            shared,
            head_rx,
            cancel: CancellationToken::new(),
            closed: false,
        }
    }

    /// Cursor identifier, unique within its feed
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Feed offset of the next byte this cursor will read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Token that cancels this cursor from another task
    ///
    /// Cancelling makes a pending or future `read` fail with `Closed`.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the cursor was cancelled through its token
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the cursor has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for and return the next run of bytes
    ///
    /// Suspends until at least one byte exists past the cursor position, then
    /// returns the largest contiguous run available (capped by the feed's
    /// maximum chunk size) and advances past it.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Closed`] if the cursor is closed or cancelled, or if the
    ///   feed is closed and everything appended before the close was read
    /// - [`FeedError::Lagged`] if the retention cap released unread bytes
    ///
    /// # Cancel safety
    ///
    /// Cancel safe: dropping the future before it completes consumes nothing.
    pub async fn read(&mut self) -> Result<Bytes, FeedError> {
        loop {
            if self.closed || self.cancel.is_cancelled() {
                return Err(FeedError::Closed);
            }

            // Mark the current head as seen before looking at the log, so an
            // append racing with this check still wakes the wait below
            self.head_rx.borrow_and_update();

            if let Some(chunk) = self.shared.read_at(&mut self.position)? {
                return Ok(chunk);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FeedError::Closed),
                changed = self.head_rx.changed() => {
                    if changed.is_err() {
                        return Err(FeedError::Closed);
                    }
                }
            }
        }
    }

    /// Close the cursor and release what it was holding
    ///
    /// Idempotent. Also cancels the cursor's token.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.shared.close_cursor(self.position);

        tracing::trace!(cursor_id = self.id, position = self.position, "Cursor closed");
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready_err, task};

    use super::*;
    use crate::feed::{channel, FeedConfig};

    async fn read_all(cursor: &mut Cursor, len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < len {
            let chunk = cursor.read().await.unwrap();
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_live_tail_skips_history() {
        let (mut writer, feed) = channel(FeedConfig::default());

        writer.append(Bytes::from_static(b"AA"));
        writer.append(Bytes::from_static(b"BB"));

        let mut cursor = feed.open_cursor();
        assert_eq!(cursor.position(), 4);

        writer.append(Bytes::from_static(b"CC"));

        let chunk = cursor.read().await.unwrap();
        assert_eq!(chunk, Bytes::from_static(b"CC"));
        assert_eq!(cursor.position(), 6);
    }

    #[tokio::test]
    async fn test_cursors_are_independent() {
        let (mut writer, feed) = channel(FeedConfig::default());

        let mut first = feed.open_cursor();
        writer.append(Bytes::from_static(b"XX"));
        let mut second = feed.open_cursor();
        writer.append(Bytes::from_static(b"YY"));

        assert_eq!(read_all(&mut first, 4).await, b"XXYY");
        assert_eq!(second.position(), 2);
        assert_eq!(read_all(&mut second, 2).await, b"YY");
    }

    #[tokio::test]
    async fn test_read_coalesces_pending_appends() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let mut cursor = feed.open_cursor();

        writer.append(Bytes::from_static(b"AA"));
        writer.append(Bytes::from_static(b"BB"));

        assert_eq!(cursor.read().await.unwrap(), Bytes::from_static(b"AABB"));
    }

    #[tokio::test]
    async fn test_read_capped_by_chunk_size() {
        let (mut writer, feed) = channel(FeedConfig::default().max_chunk_size(3));
        let mut cursor = feed.open_cursor();

        writer.append(Bytes::from_static(b"ABCDEFG"));

        assert_eq!(cursor.read().await.unwrap(), Bytes::from_static(b"ABC"));
        assert_eq!(cursor.read().await.unwrap(), Bytes::from_static(b"DEF"));
        assert_eq!(cursor.read().await.unwrap(), Bytes::from_static(b"G"));
    }

    #[tokio::test]
    async fn test_blocked_read_wakes_on_append() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let mut cursor = feed.open_cursor();

        let reader = tokio::spawn(async move { cursor.read().await });
        tokio::task::yield_now().await;

        writer.append(Bytes::from_static(b"late"));

        let chunk = timeout(Duration::from_secs(1), reader)
            .await
            .expect("read did not wake")
            .unwrap()
            .unwrap();
        assert_eq!(chunk, Bytes::from_static(b"late"));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let (_writer, feed) = channel(FeedConfig::default());
        let mut cursor = feed.open_cursor();
        let token = cursor.cancellation();

        let mut read = task::spawn(cursor.read());
        assert_pending!(read.poll());

        token.cancel();

        assert!(read.is_woken());
        assert_eq!(assert_ready_err!(read.poll()), FeedError::Closed);
    }

    #[tokio::test]
    async fn test_feed_close_drains_then_fails() {
        let (mut writer, feed) = channel(FeedConfig::default());
        let mut cursor = feed.open_cursor();

        writer.append(Bytes::from_static(b"last"));
        writer.close();

        assert_eq!(cursor.read().await.unwrap(), Bytes::from_static(b"last"));
        assert_eq!(cursor.read().await, Err(FeedError::Closed));
    }

    #[tokio::test]
    async fn test_feed_close_unblocks_pending_read() {
        let (writer, feed) = channel(FeedConfig::default());
        let mut cursor = feed.open_cursor();

        let reader = tokio::spawn(async move { cursor.read().await });
        tokio::task::yield_now().await;

        drop(writer);

        let result = timeout(Duration::from_secs(1), reader)
            .await
            .expect("read did not wake")
            .unwrap();
        assert_eq!(result, Err(FeedError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_writer, feed) = channel(FeedConfig::default());
        let mut cursor = feed.open_cursor();
        assert_eq!(feed.cursor_count(), 1);

        cursor.close();
        cursor.close();

        assert!(cursor.is_closed());
        assert_eq!(feed.cursor_count(), 0);
        assert_eq!(cursor.read().await, Err(FeedError::Closed));

        drop(cursor);
        assert_eq!(feed.cursor_count(), 0);
    }

    #[tokio::test]
    async fn test_lagged_cursor_fails() {
        let (mut writer, feed) = channel(FeedConfig::default().max_retained_bytes(4));
        let mut slow = feed.open_cursor();

        writer.append(Bytes::from_static(b"AAAA"));
        writer.append(Bytes::from_static(b"BBBB"));

        assert_eq!(slow.read().await, Err(FeedError::Lagged { missed: 4 }));
    }

    #[tokio::test]
    async fn test_concurrent_append_loses_nothing() {
        let (mut writer, feed) = channel(FeedConfig::default().max_chunk_size(7));
        let mut cursor = feed.open_cursor();

        let expected: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let payload = expected.clone();

        let producer = tokio::spawn(async move {
            for part in payload.chunks(13) {
                writer.append(Bytes::copy_from_slice(part));
                tokio::task::yield_now().await;
            }
            writer
        });

        let received = timeout(Duration::from_secs(5), read_all(&mut cursor, expected.len()))
            .await
            .expect("reader stalled");
        let _writer = producer.await.unwrap();

        assert_eq!(received, expected);
        assert_eq!(cursor.position(), expected.len() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_each_get_their_suffix() {
        let (mut writer, feed) = channel(FeedConfig::default().max_chunk_size(11));

        let expected: Vec<u8> = (0..3000u32).map(|i| (i % 241) as u8).collect();
        let total = expected.len();
        let payload = expected.clone();

        let spawn_reader = move |mut cursor: Cursor| {
            tokio::spawn(async move {
                let start = cursor.position() as usize;
                let data = read_all(&mut cursor, total - start).await;
                (start, data, cursor.position())
            })
        };

        let first = spawn_reader(feed.open_cursor());
        let opener = feed.clone();
        let producer = tokio::spawn(async move {
            let mut late = Vec::new();
            for (i, part) in payload.chunks(17).enumerate() {
                // Attach new readers while appends are in flight
                if i % 40 == 20 {
                    late.push(spawn_reader(opener.open_cursor()));
                }
                writer.append(Bytes::copy_from_slice(part));
                tokio::task::yield_now().await;
            }
            (writer, late)
        });

        let (_writer, late) = producer.await.unwrap();
        assert_eq!(late.len(), 4);

        let mut readers = vec![first];
        readers.extend(late);

        for reader in readers {
            let (start, data, end) = timeout(Duration::from_secs(5), reader)
                .await
                .expect("reader stalled")
                .unwrap();
            assert_eq!(data, &expected[start..]);
            assert_eq!(end, total as u64);
        }
    }
}
