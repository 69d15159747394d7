//! # xstream-core - Federated XML-streaming IM client core
//!
//! Connection lifecycle and stream feature negotiation for a federated,
//! XML-streaming instant-messaging protocol. Two endpoints exchange a
//! continuous stream of structured elements over a long-lived connection;
//! before application data may flow, the stream passes through a sequence
//! of negotiation steps, each advertised by the remote endpoint as a
//! *feature* and each driven by its own mini sub-protocol.
//!
//! ## Features
//!
//! - **Race-free lifecycle**: `connect()` / `login()` / `close()` are safe
//!   to call from any number of tasks; each transition executes exactly
//!   once and fires exactly one notification.
//! - **Ordered feature negotiation**: encryption upgrade, authentication,
//!   compression, resource binding, session establishment — in protocol
//!   order, with mid-negotiation stream restarts.
//! - **No stranded waiters**: every completion signal is cancellable;
//!   `close()` unblocks everything.
//! - **Pluggable seams**: transports ([`StreamTransport`]), authentication
//!   mechanisms ([`SaslMechanism`]), negotiators ([`FeatureNegotiator`]).
//!
//! ## Negotiation Flow
//!
//! ```text
//! Client                               Server
//!    |                                    |
//!    |<------ features [starttls] -------|  advertisement
//!    |------- starttls ----------------->|
//!    |<------ proceed -------------------|  stream restart
//!    |<------ features [auth, ...] ------|  fresh advertisement
//!    |------- auth (login) ------------->|
//!    |<------ challenge ----------------/|  zero or more rounds
//!    |------- response -----------------\|
//!    |<------ success -------------------|
//!    |------- bind iq ------------------>|
//!    |<------ result (address) ----------|
//!    |                                    |
//!    |======= application stanzas =======|
//! ```
//!
//! ## State Machine
//!
//! | Status           | Description                        | Valid Transitions           |
//! |------------------|------------------------------------|-----------------------------|
//! | `Initial`        | Freshly constructed                | → Connecting, Closing       |
//! | `Connecting`     | Connect attempt in flight          | → Connected, Closing        |
//! | `Connected`      | Negotiated up to authentication    | → Authenticating, Closing   |
//! | `Authenticating` | Login attempt in flight            | → Authenticated, Connected, Closing |
//! | `Authenticated`  | Fully negotiated                   | → Closing                   |
//! | `Closing`        | Teardown in flight                 | → Closed                    |
//! | `Closed`         | Terminal                           | (construct a new session)   |
//!
//! Every transition is a guarded compare-and-set: among racing callers,
//! exactly one wins and runs the work; the rest no-op, wait on the
//! winner's outcome, or fail fast, depending on the operation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xstream::{Config, Credentials, Session};
//!
//! let config = Config::from_file("xstream.toml")?;
//! let session = Arc::new(Session::new(&config, transport));
//!
//! session.add_status_listener(|status| println!("status: {status}"));
//!
//! session.connect().await?;
//! session.login(Credentials::new("alice", "secret")).await?;
//! println!("bound as {:?}", session.bound_address());
//!
//! session.close().await;
//! ```
//!
//! The transport driver feeds inbound traffic through
//! [`Session::handle_features`] and [`Session::handle_element`]; elements
//! no negotiator owns come back out of `handle_element` for stanza
//! routing.
//!
//! ## Modules
//!
//! - [`session`]: lifecycle state machine and status notifications
//! - [`engine`]: feature negotiation engine and completion signals
//! - [`feature`]: stream features and the negotiator implementations
//! - [`proto`]: the protocol element model
//! - [`transport`]: the transport seam and an in-memory implementation
//! - [`config`]: configuration management
//! - [`error`]: error types and result alias

pub mod config;
pub mod engine;
pub mod error;
pub mod feature;
pub mod proto;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use engine::{CompletionWaiter, Dispatch, NegotiationEngine, SignalOutcome};
pub use error::{Result, StreamError};
pub use feature::{
    Credentials, FeatureKind, FeatureNegotiator, NegotiationOutcome, SaslMechanism, StreamFeature,
};
pub use proto::Element;
pub use session::{Session, SessionStatus};
pub use transport::{LocalTransport, StreamTransport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
