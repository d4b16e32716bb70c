//! Statistics for ingestion and subscriber relays

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-relay statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Chunks forwarded to the subscriber
    pub chunks_forwarded: u64,
    /// Bytes forwarded to the subscriber
    pub bytes_forwarded: u64,
    /// How long the subscriber was attached
    pub duration: Duration,
    /// Average forwarding rate (bits/sec)
    pub bitrate: u64,
}

impl RelayStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one forwarded chunk
    pub fn on_chunk(&mut self, len: usize) {
        self.chunks_forwarded += 1;
        self.bytes_forwarded += len as u64;
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_forwarded * 8) / secs;
        }
    }
}

/// Server-wide counters, shared by the ingestion loop and every relay
#[derive(Debug)]
pub struct Counters {
    started_at: Instant,
    datagrams_received: AtomicU64,
    bytes_ingested: AtomicU64,
    receive_errors: AtomicU64,
    rebinds: AtomicU64,
    subscribers_active: AtomicU64,
    subscribers_total: AtomicU64,
    subscribers_rejected: AtomicU64,
    chunks_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            datagrams_received: AtomicU64::new(0),
            bytes_ingested: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            rebinds: AtomicU64::new(0),
            subscribers_active: AtomicU64::new(0),
            subscribers_total: AtomicU64::new(0),
            subscribers_rejected: AtomicU64::new(0),
            chunks_forwarded: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn datagram_received(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_ingested.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn socket_rebound(&self) {
        self.rebinds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_attached(&self) {
        self.subscribers_active.fetch_add(1, Ordering::Relaxed);
        self.subscribers_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_detached(&self) {
        // Saturating: never wrap below zero
        let _ = self
            .subscribers_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn subscriber_rejected(&self) {
        self.subscribers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn chunk_forwarded(&self, bytes: usize) {
        self.chunks_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_ingested: self.bytes_ingested.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            rebinds: self.rebinds.load(Ordering::Relaxed),
            subscribers_active: self.subscribers_active.load(Ordering::Relaxed),
            subscribers_total: self.subscribers_total.load(Ordering::Relaxed),
            subscribers_rejected: self.subscribers_rejected.load(Ordering::Relaxed),
            chunks_forwarded: self.chunks_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Datagrams appended to the feed
    pub datagrams_received: u64,
    /// Payload bytes appended to the feed
    pub bytes_ingested: u64,
    /// Datagram receive failures
    pub receive_errors: u64,
    /// Times the ingestion socket was rebound
    pub rebinds: u64,
    /// Currently attached subscribers
    pub subscribers_active: u64,
    /// Subscribers ever attached
    pub subscribers_total: u64,
    /// Subscribers turned away by the connection limit
    pub subscribers_rejected: u64,
    /// Chunks forwarded across all subscribers
    pub chunks_forwarded: u64,
    /// Bytes forwarded across all subscribers
    pub bytes_forwarded: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    /// Whether anything has happened since start
    pub fn has_activity(&self) -> bool {
        self.datagrams_received > 0 || self.subscribers_total > 0 || self.receive_errors > 0
    }
}
