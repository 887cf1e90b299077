//! Transport abstraction for the event feed.

use async_trait::async_trait;
use pipeline::FaultKind;
use thiserror::Error;

/// Failures of the feed transport. Every variant ends the current session.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The session could not be opened.
    #[error("failed to connect to event feed: {0}")]
    Connect(String),

    /// Reading from an open session failed.
    #[error("event feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side ended the stream.
    #[error("event feed closed by remote (exit code {exit_code:?})")]
    Closed {
        /// Exit code of the session process, when known.
        exit_code: Option<i32>,
    },
}

impl FeedError {
    pub fn kind(&self) -> FaultKind {
        FaultKind::Transport
    }
}

/// An open subscription yielding one raw line per event.
///
/// Lines are handed over as bytes; decoding them is the reader's job, so a
/// line that is not valid UTF-8 is a malformed event rather than a transport
/// fault.
#[async_trait]
pub trait EventSession: Send {
    /// Waits for the next line, without its `\n` terminator. `Ok(None)` means
    /// the stream ended.
    ///
    /// Must be cancel-safe: the reader drops this future when its poll
    /// interval elapses, and no data may be lost when it does.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, FeedError>;

    /// Tears the session down. Called exactly once per session.
    async fn close(&mut self);
}

/// Opens subscriptions to the event feed.
#[async_trait]
pub trait EventFeed: Send + Sync {
    type Session: EventSession;

    /// Connects and issues the subscription command.
    async fn connect(&self) -> Result<Self::Session, FeedError>;
}
