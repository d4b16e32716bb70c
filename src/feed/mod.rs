//! Broadcast buffer for the live feed
//!
//! The feed is an append-only byte log with one writer and any number of
//! independently positioned cursors. A cursor starts at the append position
//! current when it is opened, so subscribers only ever see data produced after
//! they attach.
//!
//! # Architecture
//!
//! ```text
//!                           Arc<Shared>
//!                  ┌────────────────────────────┐
//!                  │ Mutex<State> {             │
//!                  │   log: SegmentLog,         │
//!                  │   positions: BTreeMap,     │
//!                  │ }                          │
//!                  │ head_tx: watch::Sender<u64>│
//!                  └─────────────┬──────────────┘
//!                                │
//!         ┌──────────────────────┼──────────────────────┐
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!    [FeedWriter]            [Cursor]               [Cursor]
//!    append()                read().await           read().await
//!         │                      │                      │
//!         └──► push segment ──► head_tx ──► wake ──► slice / coalesce
//! ```
//!
//! # Zero-Copy Reads
//!
//! Segments are `bytes::Bytes`, so a read that falls inside one segment hands
//! out a reference-counted slice shared by every cursor. Only reads that span
//! segments copy, and only up to the maximum chunk size.
//!
//! # Retention
//!
//! Segments are released once every attached cursor has read past them. With
//! [`Retention::Bounded`] the oldest segments are also dropped when the cap is
//! exceeded, and cursors left behind fail with [`FeedError::Lagged`].

pub mod config;
pub mod cursor;
pub mod error;
mod segments;
pub mod store;

pub use config::{FeedConfig, Retention, DEFAULT_MAX_CHUNK_SIZE};
pub use cursor::Cursor;
pub use error::FeedError;
pub use store::{channel, Feed, FeedStats, FeedWriter};
