//! Relay state machine
//!
//! Tracks one subscriber from attach to detach.

use std::fmt;

use crate::feed::FeedError;

/// Relay lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// Cursor opened, loop not started
    Attached,
    /// Waiting on the cursor for new bytes
    Draining,
    /// Sending a chunk to the subscriber
    Forwarding,
    /// Subscriber went away cleanly
    Detached,
    /// Cursor read or send failed
    Failed,
}

impl RelayPhase {
    /// Whether the relay has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayPhase::Detached | RelayPhase::Failed)
    }

    /// Move to `next` unless already terminal
    pub fn advance(&mut self, next: RelayPhase) {
        if !self.is_terminal() {
            *self = next;
        }
    }
}

/// Why a relay failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFailure {
    /// The cursor read failed (feed closed or cursor lagged)
    Feed(FeedError),
    /// Sending to the subscriber failed
    Send(String),
}

impl fmt::Display for RelayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayFailure::Feed(e) => write!(f, "cursor read failed: {}", e),
            RelayFailure::Send(e) => write!(f, "send failed: {}", e),
        }
    }
}

/// How a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Subscriber closed the connection
    Detached,
    /// Relay stopped on an error
    Failed(RelayFailure),
}

impl RelayOutcome {
    /// Terminal phase matching this outcome
    pub fn phase(&self) -> RelayPhase {
        match self {
            RelayOutcome::Detached => RelayPhase::Detached,
            RelayOutcome::Failed(_) => RelayPhase::Failed,
        }
    }
}
