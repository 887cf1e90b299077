//! DCI third-party CI event source.
//!
//! Holds a long-lived subscription to Gerrit's `stream-events` feed and
//! pushes every decoded event onto the [`pipeline::EventSender`] queue. The
//! consumer never sees the transport: a lost session is closed, followed by
//! a cool-down and a fresh connect, until shutdown is requested.
//!
//! | Item | Role |
//! |------|------|
//! | [`EventFeed`] / [`EventSession`] | Transport seam; tests substitute in-memory feeds |
//! | [`SshEventFeed`] | `ssh <gerrit> gerrit stream-events -s comment-added` |
//! | [`run`] | Reconnecting reader loop, returns a [`StreamReport`] |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The [`pipeline`] crate sees only [`pipeline::RawEvent`]
//! values arriving on its queue.

pub mod feed;
pub mod reader;
pub mod ssh_feed;

pub use feed::{EventFeed, EventSession, FeedError};
pub use reader::{run, ConnectionState, StreamOptions, StreamReport};
pub use ssh_feed::{SshEventFeed, SshEventSession, DEFAULT_SUBSCRIPTION};
