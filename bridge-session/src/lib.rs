//! Sessions with capability providers.
//!
//! A [`Session`] owns one [`Transport`] to one provider and walks it through
//! the handshake, capability listing, and invocation. Stdio providers are
//! spawned child processes speaking newline-delimited JSON-RPC; network
//! providers are reached over HTTP with JSON or event-stream responses.

#![warn(missing_docs, clippy::pedantic)]

mod connector;
mod endpoint;
mod error;
mod lifecycle;
pub mod protocol;
mod session;
pub mod transport;

pub use connector::{Connector, DefaultConnector};
pub use endpoint::{HttpEndpoint, ProviderEndpoint, StdioEndpoint, SubProtocol};
pub use error::{SessionError, SessionResult};
pub use lifecycle::{LifecycleError, SessionEvent, SessionLifecycle, SessionState};
pub use session::{
    DEFAULT_REQUEST_TIMEOUT, InvocationResult, Session, SessionConfig, with_session,
};
pub use transport::{Transport, TransportKind};
