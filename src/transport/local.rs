//! In-memory transport.
//!
//! Everything the session does to the transport surfaces as a
//! [`TransportEvent`] on an unbounded channel, so a test can play the
//! remote endpoint: watch for the client's elements and feed responses
//! back through the session's inbound entry points.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use super::{StreamTransport, TransportFuture};
use crate::error::{Result, StreamError};
use crate::proto::Element;

/// One observable transport action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The session opened the link.
    Opened,
    /// The session sent an element.
    Sent(Element),
    /// The session asked for a stream restart.
    Restarted,
    /// The session closed the link.
    Closed,
}

/// In-memory [`StreamTransport`] for tests and demos.
pub struct LocalTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    open: Mutex<bool>,
}

impl LocalTransport {
    /// Create a transport and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                events: tx,
                open: Mutex::new(false),
            },
            rx,
        )
    }

    fn emit(&self, event: TransportEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| StreamError::Transport("remote endpoint went away".into()))
    }

    fn is_open(&self) -> bool {
        *self.open.lock().expect("open flag lock poisoned")
    }
}

impl StreamTransport for LocalTransport {
    fn open(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            *self.open.lock().expect("open flag lock poisoned") = true;
            debug!(transport = self.name(), "link opened");
            self.emit(TransportEvent::Opened)
        })
    }

    fn send(&self, element: Element) -> TransportFuture<'_> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(StreamError::Transport("link is not open".into()));
            }
            debug!(transport = self.name(), %element, "sending");
            self.emit(TransportEvent::Sent(element))
        })
    }

    fn restart_stream(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(StreamError::Transport("link is not open".into()));
            }
            debug!(transport = self.name(), "stream restart");
            self.emit(TransportEvent::Restarted)
        })
    }

    fn close(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            *self.open.lock().expect("open flag lock poisoned") = false;
            // Closing an already-gone remote is not an error.
            let _ = self.events.send(TransportEvent::Closed);
            debug!(transport = self.name(), "link closed");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
