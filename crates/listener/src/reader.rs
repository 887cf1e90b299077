//! The reconnecting stream reader.
//!
//! Two nested loops: the outer one connects, streams, closes, and cools down
//! before the next attempt; the inner one waits for a line, decodes it, and
//! pushes it onto the event queue. Shutdown is checked at both levels, so the
//! reader stops within one poll interval even while cooling down.

use std::time::Duration;

use pipeline::{EventSender, RawEvent, Shutdown};
use tracing::{debug, info, trace, warn};

use crate::feed::{EventFeed, EventSession, FeedError};

/// Tuning for [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Longest wait for a line before the reader logs an idle tick and waits
    /// again.
    pub poll_interval: Duration,
    /// Cool-down between a lost session and the next connect attempt.
    pub reconnect_delay: Duration,
    /// When set, events for other projects are dropped instead of enqueued.
    pub project_filter: Option<String>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(2),
            project_filter: None,
        }
    }
}

/// Lifecycle of the reader's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// The only state in which events are enqueued.
    Streaming,
    Terminated,
}

/// Counters returned when the reader terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub connect_attempts: u64,
    pub sessions_established: u64,
    pub events_enqueued: u64,
    pub events_filtered: u64,
    pub lines_dropped: u64,
}

enum SessionEnd {
    Stopped,
    ConsumerGone,
    Fault(FeedError),
}

/// Consumes `feed` until `shutdown` is triggered, pushing every decoded event
/// onto `queue`.
///
/// Never fails: transport faults lead to a reconnect after
/// `options.reconnect_delay`, and malformed lines are dropped.
pub async fn run<F: EventFeed>(
    feed: F,
    queue: EventSender,
    options: StreamOptions,
    mut shutdown: Shutdown,
) -> StreamReport {
    let mut report = StreamReport::default();
    let mut state = ConnectionState::Disconnected;

    loop {
        if shutdown.is_triggered() {
            break;
        }

        state = transition(state, ConnectionState::Connecting);
        report.connect_attempts += 1;
        let connected = tokio::select! {
            biased;
            _ = shutdown.triggered() => None,
            result = feed.connect() => Some(result),
        };
        let Some(connected) = connected else {
            state = transition(state, ConnectionState::Disconnected);
            break;
        };

        match connected {
            Ok(mut session) => {
                state = transition(state, ConnectionState::Streaming);
                report.sessions_established += 1;
                let end = stream(&mut session, &queue, &options, &mut shutdown, &mut report).await;
                session.close().await;
                state = transition(state, ConnectionState::Disconnected);
                match end {
                    SessionEnd::Stopped => break,
                    SessionEnd::ConsumerGone => {
                        warn!("Event queue consumer is gone, stopping reader");
                        break;
                    }
                    SessionEnd::Fault(e) => {
                        warn!(error = %e, kind = ?e.kind(), "Event feed session lost");
                    }
                }
            }
            Err(e) => {
                state = transition(state, ConnectionState::Disconnected);
                warn!(
                    error = %e,
                    kind = ?e.kind(),
                    attempt = report.connect_attempts,
                    "Could not connect to event feed"
                );
            }
        }

        debug!(
            delay_ms = options.reconnect_delay.as_millis() as u64,
            "Waiting before reconnecting"
        );
        if shutdown.sleep(options.reconnect_delay).await {
            break;
        }
    }

    transition(state, ConnectionState::Terminated);
    info!(
        attempts = report.connect_attempts,
        sessions = report.sessions_established,
        enqueued = report.events_enqueued,
        dropped = report.lines_dropped,
        "Event stream reader terminated"
    );
    report
}

async fn stream<S: EventSession>(
    session: &mut S,
    queue: &EventSender,
    options: &StreamOptions,
    shutdown: &mut Shutdown,
    report: &mut StreamReport,
) -> SessionEnd {
    loop {
        let polled = tokio::select! {
            biased;
            _ = shutdown.triggered() => return SessionEnd::Stopped,
            polled = tokio::time::timeout(options.poll_interval, session.next_line()) => polled,
        };
        let line = match polled {
            Err(_idle) => {
                trace!("No incoming data");
                continue;
            }
            Ok(Err(e)) => return SessionEnd::Fault(e),
            Ok(Ok(None)) => return SessionEnd::Fault(FeedError::Closed { exit_code: None }),
            Ok(Ok(Some(line))) => line,
        };
        if line.trim_ascii().is_empty() {
            continue;
        }

        let event = match RawEvent::from_bytes(&line) {
            Ok(event) => event,
            Err(e) => {
                report.lines_dropped += 1;
                warn!(error = %e, kind = ?e.kind(), "Dropping malformed event line");
                continue;
            }
        };
        if let Some(project) = &options.project_filter {
            if event.project() != Some(project.as_str()) {
                report.events_filtered += 1;
                trace!(event_type = event.event_type(), "Event for another project");
                continue;
            }
        }

        debug!(event_type = event.event_type(), "Event received");
        if queue.push(event).is_err() {
            return SessionEnd::ConsumerGone;
        }
        report.events_enqueued += 1;
    }
}

fn transition(from: ConnectionState, to: ConnectionState) -> ConnectionState {
    debug!(from = ?from, to = ?to, "Event feed connection state");
    to
}
