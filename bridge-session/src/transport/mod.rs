//! Message channels to capability providers.
//!
//! A [`Transport`] moves JSON-RPC envelopes to one provider and back. The
//! session layer owns exactly one transport and never issues a second request
//! before the first has been answered, so implementations only ever see one
//! exchange at a time.

use async_trait::async_trait;

use crate::error::SessionResult;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub(crate) mod http;
pub(crate) mod http_client;
pub(crate) mod sse;
pub(crate) mod stdio;

pub use http::HttpTransport;
pub use http_client::{HttpClientOptions, HttpsClient, https_client};
pub use sse::{SseDecoder, SseEvent};
pub use stdio::StdioTransport;

/// Kind of channel behind a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Child process stdin/stdout.
    Stdio,
    /// HTTP with JSON or SSE response bodies.
    StreamableHttp,
    /// HTTP with plain JSON response bodies.
    Http,
    /// Provider running inside the current process.
    InProcess,
}

/// Bidirectional, message-framed channel to a single provider.
#[async_trait]
pub trait Transport: Send {
    /// Kind of channel.
    fn kind(&self) -> TransportKind;

    /// Identifier of the provider endpoint, used in logs and errors.
    fn endpoint(&self) -> &str;

    /// Sends one request and waits for the matching response.
    ///
    /// Provider-initiated traffic received while waiting (notifications,
    /// pings) is handled internally and never returned.
    async fn round_trip(&mut self, request: JsonRpcRequest) -> SessionResult<JsonRpcResponse>;

    /// Sends a notification; no response is awaited.
    async fn notify(&mut self, notification: JsonRpcNotification) -> SessionResult<()>;

    /// Releases the channel. Called at most once by the owning session.
    async fn close(&mut self) -> SessionResult<()>;
}
