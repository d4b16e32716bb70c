//! Subscriber relay
//!
//! Each attached subscriber runs its own [`Relay`]: it owns one cursor into the
//! feed and the sending half of one connection, and forwards every chunk it
//! reads as a single message. A slow subscriber only grows its own unread
//! range; it never holds up ingestion or other subscribers.
//!
//! ```text
//!   Attached ──► Draining ──► Forwarding ──┐
//!                   ▲                      │
//!                   └──────────────────────┘
//!                   │                      │
//!              (cancelled)           (read/send error)
//!                   ▼                      ▼
//!               Detached                 Failed
//! ```

pub mod context;
pub mod forward;
pub mod state;

pub use context::SubscriberContext;
pub use forward::{Relay, RelayReport, DEFAULT_CLOSE_TIMEOUT};
pub use state::{RelayFailure, RelayOutcome, RelayPhase};
