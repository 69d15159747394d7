//! Stream error types.
//!
//! Errors fall into four classes, with different blast radii:
//!
//! - **State-guard violations** (`InvalidState`, `AlreadyInProgress`):
//!   returned only to the caller whose operation was refused; the session
//!   is untouched.
//! - **Negotiation failures** (`Protocol`, `NegotiationFailed`): the shared
//!   stream is no longer trustworthy and the session moves toward closure.
//! - **Authentication rejection** (`AuthenticationFailed`): recoverable;
//!   the session reverts to connected and a new login may be attempted.
//! - **Transport failures** (`Transport`, `Io`): treated like negotiation
//!   failures.

use thiserror::Error;

use crate::session::SessionStatus;

/// Errors produced by the stream core.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Protocol-level error: malformed or unexpected element.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature negotiation failed.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The server rejected the presented credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Operation requested from a status that forbids it.
    #[error("Cannot {operation} while {status:?}")]
    InvalidState {
        /// Status the session was in when the operation was refused.
        status: SessionStatus,
        /// The refused operation.
        operation: &'static str,
    },

    /// Another caller is already executing this operation.
    #[error("{0} already in progress")]
    AlreadyInProgress(&'static str),

    /// The session was closed while the operation was pending.
    #[error("Session closed")]
    SessionClosed,

    /// Transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// Whether the error leaves the session usable for another attempt.
    ///
    /// Only an authentication rejection is recoverable; everything else
    /// that escapes a single caller poisons the shared stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StreamError::AuthenticationFailed(_))
    }
}

impl From<toml::de::Error> for StreamError {
    fn from(err: toml::de::Error) -> Self {
        StreamError::Config(err.to_string())
    }
}
