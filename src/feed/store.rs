//! Feed storage and handles
//!
//! [`FeedWriter`] is the single producer; [`Feed`] is the cloneable handle
//! used to open cursors. Both share one lock-protected segment log. The lock is
//! only held for bookkeeping, never across an await point, so an append never
//! waits on a reader.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;

use super::config::{FeedConfig, Retention};
use super::cursor::Cursor;
use super::error::FeedError;
use super::segments::{LogRead, SegmentLog};

/// Create a feed, returning its single writer and a reader handle
pub fn channel(config: FeedConfig) -> (FeedWriter, Feed) {
    let (head_tx, _) = watch::channel(0);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            log: SegmentLog::new(),
            positions: BTreeMap::new(),
            cursors: 0,
            closed: false,
        }),
        head_tx,
        next_cursor_id: AtomicU64::new(1),
        appends: AtomicU64::new(0),
        dropped_bytes: AtomicU64::new(0),
        config,
    });

    (
        FeedWriter {
            shared: Arc::clone(&shared),
        },
        Feed { shared },
    )
}

/// Point-in-time view of a feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Current append position (total bytes ever appended)
    pub append_position: u64,
    /// Number of non-empty appends
    pub appends: u64,
    /// Bytes still held for attached cursors
    pub retained_bytes: usize,
    /// Segments still held for attached cursors
    pub retained_segments: usize,
    /// Attached cursors
    pub cursors: usize,
    /// Bytes discarded by the retention cap before every cursor read them
    pub dropped_bytes: u64,
    /// Whether the feed has been closed
    pub closed: bool,
}

struct State {
    log: SegmentLog,
    /// Multiset of attached cursor positions (position -> count)
    positions: BTreeMap<u64, usize>,
    cursors: usize,
    closed: bool,
}

impl State {
    fn add_position(&mut self, pos: u64) {
        *self.positions.entry(pos).or_insert(0) += 1;
    }

    fn remove_position(&mut self, pos: u64) {
        if let Some(count) = self.positions.get_mut(&pos) {
            *count -= 1;
            if *count == 0 {
                self.positions.remove(&pos);
            }
        }
    }

    /// Release everything no attached cursor still needs
    fn release(&mut self) {
        let oldest = self
            .positions
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.log.head());
        self.log.release_before(oldest);
    }
}

pub(super) struct Shared {
    state: Mutex<State>,
    /// Carries the append position; every change wakes parked readers
    head_tx: watch::Sender<u64>,
    next_cursor_id: AtomicU64,
    appends: AtomicU64,
    dropped_bytes: AtomicU64,
    config: FeedConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, data: Bytes) {
        if data.is_empty() {
            return;
        }

        let head = {
            let mut state = self.lock();
            if state.closed {
                return;
            }

            state.log.push(data);
            if state.cursors == 0 {
                state.release();
            } else if let Retention::Bounded { max_bytes } = self.config.retention {
                let dropped = state.log.enforce_cap(max_bytes);
                if dropped > 0 {
                    self.dropped_bytes
                        .fetch_add(dropped as u64, Ordering::Relaxed);
                    tracing::debug!(
                        dropped_bytes = dropped,
                        base = state.log.base(),
                        "Retention cap reached, dropped oldest segments"
                    );
                }
            }
            state.log.head()
        };

        self.appends.fetch_add(1, Ordering::Relaxed);
        self.head_tx.send_replace(head);
    }

    fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        // Wake every parked reader so it observes the close
        self.head_tx.send_modify(|_| {});
        tracing::debug!("Feed closed");
    }

    /// Register a cursor at the current append position
    pub(super) fn open_cursor(&self) -> (u64, u64, watch::Receiver<u64>) {
        let mut state = self.lock();
        let id = self.next_cursor_id.fetch_add(1, Ordering::Relaxed);
        let pos = state.log.head();
        state.add_position(pos);
        state.cursors += 1;

        // Subscribing under the lock marks the current head as seen
        (id, pos, self.head_tx.subscribe())
    }

    /// Read the next chunk for a cursor at `*pos`, advancing it on success
    ///
    /// Returns `Ok(None)` when the cursor is caught up and the feed is open.
    pub(super) fn read_at(&self, pos: &mut u64) -> Result<Option<Bytes>, FeedError> {
        let mut state = self.lock();

        match state.log.read_from(*pos, self.config.max_chunk_size) {
            LogRead::Data(chunk) => {
                let old = *pos;
                let new = old + chunk.len() as u64;
                state.remove_position(old);
                state.add_position(new);
                *pos = new;

                if state.log.base() < new {
                    state.release();
                }
                Ok(Some(chunk))
            }
            LogRead::Empty if state.closed => Err(FeedError::Closed),
            LogRead::Empty => Ok(None),
            LogRead::Lagged { missed } => Err(FeedError::Lagged { missed }),
        }
    }

    /// Detach a cursor at `pos`
    pub(super) fn close_cursor(&self, pos: u64) {
        let mut state = self.lock();
        state.remove_position(pos);
        state.cursors = state.cursors.saturating_sub(1);
        state.release();
    }

    fn stats(&self) -> FeedStats {
        let state = self.lock();
        FeedStats {
            append_position: state.log.head(),
            appends: self.appends.load(Ordering::Relaxed),
            retained_bytes: state.log.retained_bytes(),
            retained_segments: state.log.segment_count(),
            cursors: state.cursors,
            dropped_bytes: self.dropped_bytes.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }
}

/// The single writer of a feed
///
/// Not cloneable: one writer per feed. Dropping the writer closes the feed.
pub struct FeedWriter {
    shared: Arc<Shared>,
}

impl FeedWriter {
    /// Append bytes at the head of the feed and wake waiting cursors
    ///
    /// Empty payloads are ignored. Appends after close are discarded.
    pub fn append(&mut self, data: impl Into<Bytes>) {
        self.shared.append(data.into());
    }

    /// Get a reader handle for this feed
    pub fn feed(&self) -> Feed {
        Feed {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Close the feed; cursors drain what was appended, then fail with `Closed`
    pub fn close(self) {
        // Drop does the work
    }
}

impl Drop for FeedWriter {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for FeedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedWriter")
            .field("stats", &self.shared.stats())
            .finish()
    }
}

/// Cloneable reader handle to a feed
#[derive(Clone)]
pub struct Feed {
    shared: Arc<Shared>,
}

impl Feed {
    /// Open a cursor positioned at the current append position
    ///
    /// The cursor only ever observes bytes appended after this call.
    pub fn open_cursor(&self) -> Cursor {
        Cursor::open(Arc::clone(&self.shared))
    }

    /// Current append position
    pub fn append_position(&self) -> u64 {
        self.shared.lock().log.head()
    }

    /// Number of attached cursors
    pub fn cursor_count(&self) -> usize {
        self.shared.lock().cursors
    }

    /// Close the feed from any handle (used on shutdown)
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether the feed has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Snapshot of feed statistics
    pub fn stats(&self) -> FeedStats {
        self.shared.stats()
    }

    /// Get the feed configuration
    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("stats", &self.shared.stats())
            .finish()
    }
}
