//! Subscriber context
//!
//! Identity of one attached subscriber, carried through the relay for logging.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Information about an attached subscriber
#[derive(Debug, Clone)]
pub struct SubscriberContext {
    /// Unique subscriber ID
    pub subscriber_id: u64,

    /// Remote peer address, when the transport exposes one
    pub peer_addr: Option<SocketAddr>,

    /// When the subscriber attached
    pub attached_at: Instant,
}

impl SubscriberContext {
    /// Create a new context
    pub fn new(subscriber_id: u64) -> Self {
        Self {
            subscriber_id,
            peer_addr: None,
            attached_at: Instant::now(),
        }
    }

    /// Attach the remote address
    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// Time since the subscriber attached
    pub fn attached_for(&self) -> Duration {
        self.attached_at.elapsed()
    }
}
