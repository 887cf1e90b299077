//! The event queue between the stream reader and the dispatch loop.
//!
//! A thin wrapper over an unbounded tokio channel: pushing never blocks the
//! reader, and popping never blocks the dispatcher, which polls it alongside
//! the shutdown signal.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::RawEvent;

/// Creates a connected producer/consumer pair.
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx, closed: false })
}

/// The consumer side has gone away; nothing pushed will ever be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event queue consumer has been dropped")]
pub struct QueueClosed;

/// Producer half, owned by the stream reader.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl EventSender {
    /// Appends an event to the back of the queue.
    pub fn push(&self, event: RawEvent) -> Result<(), QueueClosed> {
        self.tx.send(event).map_err(|_| QueueClosed)
    }
}

/// Consumer half, owned by the dispatch loop.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<RawEvent>,
    closed: bool,
}

impl EventReceiver {
    /// Takes the event at the front of the queue, or `None` if it is empty.
    pub fn try_pop(&mut self) -> Option<RawEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// True once a pop has found the queue drained with every producer gone.
    /// Nothing will ever arrive after that.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
