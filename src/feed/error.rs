//! Feed error types

use thiserror::Error;

/// Error returned by cursor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The feed was closed, or the cursor was closed or cancelled
    #[error("feed closed")]
    Closed,
    /// The cursor fell behind the retained window
    #[error("cursor fell behind the feed by {missed} bytes")]
    Lagged { missed: u64 },
}
