//! Transport layer abstraction.
//!
//! The physical connection (socket, WebSocket, proxy tunnel) lives outside
//! this crate. The core consumes it through [`StreamTransport`]: send an
//! element, restart the stream framing, open and close the link. Inbound
//! elements flow the other way — the transport driver feeds them to
//! [`Session::handle_element`](crate::session::Session::handle_element)
//! and [`Session::handle_features`](crate::session::Session::handle_features).
//!
//! [`LocalTransport`] is an in-memory implementation used by tests and
//! demos to script the remote endpoint.

mod local;

pub use local::{LocalTransport, TransportEvent};

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::proto::Element;

/// Boxed future returned by transport methods.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// The stream's physical carrier.
///
/// Implementations handle the wire; the core stays transport-agnostic. The
/// session owns its transport exclusively, and only the single logical
/// thread executing the current lifecycle transition or negotiation step
/// touches it.
pub trait StreamTransport: Send + Sync {
    /// Open the link and start the initial stream.
    fn open(&self) -> TransportFuture<'_>;

    /// Send one element to the remote endpoint.
    fn send(&self, element: Element) -> TransportFuture<'_>;

    /// Re-establish the stream framing on the existing link. Called after
    /// features that upgrade the stream (encryption, compression); any
    /// socket-level upgrade happens inside the implementation.
    fn restart_stream(&self) -> TransportFuture<'_>;

    /// Close the link.
    fn close(&self) -> TransportFuture<'_>;

    /// Transport name for logging.
    fn name(&self) -> &'static str {
        "stream"
    }
}
