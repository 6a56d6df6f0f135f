//! Request/response sessions with a single capability provider.

use std::time::Duration;

use bridge_primitives::{Capability, ProviderManifest, SessionId};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connector::{Connector, DefaultConnector};
use crate::endpoint::ProviderEndpoint;
use crate::error::{SessionError, SessionResult};
use crate::lifecycle::{SessionEvent, SessionLifecycle, SessionState};
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, ContentBlock, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, LATEST_PROTOCOL_VERSION, ListToolsParams,
    ListToolsResult, SUPPORTED_PROTOCOL_VERSIONS, methods,
};
use crate::transport::Transport;

/// Default budget for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    request_timeout: Duration,
    protocol_version: String,
    client_name: String,
    client_version: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            protocol_version: LATEST_PROTOCOL_VERSION.to_owned(),
            client_name: "toolbridge".to_owned(),
            client_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl SessionConfig {
    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the protocol revision requested during the handshake.
    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Sets the client identity reported to providers.
    #[must_use]
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Requested protocol revision.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }
}

/// Output of one capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    content: Vec<ContentBlock>,
    structured: Option<Value>,
    is_error: bool,
}

impl InvocationResult {
    /// Returns `true` when the capability reported a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    /// Raw content blocks.
    #[must_use]
    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    /// Structured payload, when the provider supplied one.
    #[must_use]
    pub fn structured(&self) -> Option<&Value> {
        self.structured.as_ref()
    }

    /// Text blocks joined by newlines.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<CallToolResult> for InvocationResult {
    fn from(result: CallToolResult) -> Self {
        Self {
            content: result.content,
            structured: result.structured_content,
            is_error: result.is_error,
        }
    }
}

/// Exclusive conversation with one provider.
///
/// Every operation takes `&mut self`, so a session can never have two
/// requests in flight. Fatal failures (timeouts, framing violations, broken
/// channels) close the session; later calls report
/// [`SessionError::NotReady`].
pub struct Session {
    id: SessionId,
    endpoint: String,
    transport: Option<Box<dyn Transport>>,
    lifecycle: SessionLifecycle,
    config: SessionConfig,
    next_request_id: u64,
    handshake: Option<InitializeResult>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Opens a session to `endpoint` with the default connector.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportUnavailable`] when the provider cannot
    /// be started or reached.
    pub async fn open(endpoint: &ProviderEndpoint, config: SessionConfig) -> SessionResult<Self> {
        Self::open_with(&DefaultConnector, endpoint, config).await
    }

    /// Opens a session through a caller supplied connector.
    ///
    /// # Errors
    ///
    /// Propagates the connector's failure.
    pub async fn open_with(
        connector: &dyn Connector,
        endpoint: &ProviderEndpoint,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let transport = connector.connect(endpoint).await?;
        Ok(Self::new(transport, config))
    }

    /// Wraps an already opened transport.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        let id = SessionId::random();
        let endpoint = transport.endpoint().to_owned();
        debug!(session_id = %id, endpoint = %endpoint, kind = ?transport.kind(), "session created");

        Self {
            id,
            endpoint,
            transport: Some(transport),
            lifecycle: SessionLifecycle::new(id),
            config,
            next_request_id: 1,
            handshake: None,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Identifier of the provider endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Provider identity, available after [`Session::initialize`].
    #[must_use]
    pub fn provider(&self) -> Option<&ProviderManifest> {
        self.handshake.as_ref().map(|handshake| &handshake.server_info)
    }

    /// Protocol revision agreed during the handshake.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<&str> {
        self.handshake
            .as_ref()
            .map(|handshake| handshake.protocol_version.as_str())
    }

    /// Performs the protocol handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] unless the session is freshly
    /// created, [`SessionError::Protocol`] when the provider answers with an
    /// unsupported revision, or any transport failure.
    pub async fn initialize(&mut self) -> SessionResult<()> {
        if self.state() != SessionState::Created {
            return Err(SessionError::NotReady {
                state: self.state(),
                operation: "initialize",
            });
        }

        let params = InitializeParams {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: Map::new(),
            client_info: ClientInfo {
                name: self.config.client_name.clone(),
                version: self.config.client_version.clone(),
            },
        };

        let result: InitializeResult = self
            .call(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            let reason = format!(
                "provider selected unsupported protocol version {}",
                result.protocol_version
            );
            self.discard(&reason).await;
            return Err(SessionError::protocol(reason));
        }

        self.notify(methods::INITIALIZED).await?;
        self.advance(SessionEvent::Handshake)?;

        info!(
            session_id = %self.id,
            endpoint = %self.endpoint,
            provider = %result.server_info.name(),
            version = %result.server_info.version(),
            protocol = %result.protocol_version,
            "session initialized"
        );
        self.handshake = Some(result);
        Ok(())
    }

    /// Lists every capability the provider advertises, following pagination.
    ///
    /// The result is never cached; each call re-queries the provider.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] before the handshake, or any
    /// transport or protocol failure.
    pub async fn list_capabilities(&mut self) -> SessionResult<Vec<Capability>> {
        self.ensure_ready("list_capabilities")?;

        let mut capabilities = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = Vec::new();

        loop {
            let params = ListToolsParams {
                cursor: cursor.take(),
            };
            let page: ListToolsResult = self
                .call(methods::TOOLS_LIST, Some(serde_json::to_value(params)?))
                .await?;
            capabilities.extend(page.tools);

            match page.next_cursor {
                Some(next) if seen_cursors.contains(&next) => {
                    let reason = format!("provider repeated pagination cursor `{next}`");
                    self.discard(&reason).await;
                    return Err(SessionError::protocol(reason));
                }
                Some(next) => {
                    seen_cursors.push(next.clone());
                    cursor = Some(next);
                }
                None => break,
            }
        }

        debug!(session_id = %self.id, count = capabilities.len(), "listed capabilities");
        Ok(capabilities)
    }

    /// Invokes one capability and waits for its result.
    ///
    /// A capability-side failure is reported as a successful call whose
    /// [`InvocationResult::is_error`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] before the handshake (nothing is
    /// written to the transport), [`SessionError::Timeout`] when the provider
    /// does not answer in time, or any transport or protocol failure.
    pub async fn invoke(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> SessionResult<InvocationResult> {
        self.ensure_ready("invoke")?;
        self.advance(SessionEvent::Activate)?;

        let params = CallToolParams {
            name: name.to_owned(),
            arguments,
        };
        let result: CallToolResult = self
            .call(methods::TOOLS_CALL, Some(serde_json::to_value(params)?))
            .await?;

        debug!(
            session_id = %self.id,
            capability = name,
            is_error = result.is_error,
            "capability returned"
        );
        Ok(result.into())
    }

    /// Sends a liveness check.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] on a closed session, or any
    /// transport failure.
    pub async fn ping(&mut self) -> SessionResult<()> {
        let _: Value = self.call(methods::PING, None).await?;
        Ok(())
    }

    /// Releases the transport. Further calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the transport's shutdown failure. The session is closed either
    /// way.
    pub async fn close(&mut self) -> SessionResult<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        let _ = self.lifecycle.transition(SessionEvent::Close);
        debug!(session_id = %self.id, endpoint = %self.endpoint, "closing session");
        transport.close().await
    }

    /// Runs `body` against this session and closes it on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the error from `body`, or the close failure when `body`
    /// succeeded.
    pub async fn scoped<T, F>(mut self, body: F) -> SessionResult<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, SessionResult<T>>,
    {
        let outcome = body(&mut self).await;
        let closed = self.close().await;
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), _) => Err(err),
        }
    }

    fn ensure_ready(&self, operation: &'static str) -> SessionResult<()> {
        if self.state().is_ready() && self.transport.is_some() {
            return Ok(());
        }
        Err(SessionError::NotReady {
            state: self.state(),
            operation,
        })
    }

    fn advance(&mut self, event: SessionEvent) -> SessionResult<()> {
        self.lifecycle
            .transition(event)
            .map(|_| ())
            .map_err(|_| SessionError::NotReady {
                state: self.lifecycle.state(),
                operation: "transition",
            })
    }

    async fn call<R: DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: Option<Value>,
    ) -> SessionResult<R> {
        let value = self.request(method, params).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(decoded),
            Err(err) => {
                let reason = format!("malformed `{method}` result: {err}");
                self.discard(&reason).await;
                Err(SessionError::protocol(reason))
            }
        }
    }

    async fn request(&mut self, method: &'static str, params: Option<Value>) -> SessionResult<Value> {
        let budget = self.config.request_timeout;
        let Some(transport) = self.transport.as_mut() else {
            return Err(SessionError::NotReady {
                state: self.lifecycle.state(),
                operation: method,
            });
        };

        let id = self.next_request_id;
        self.next_request_id += 1;
        let request = JsonRpcRequest::new(id, method, params);

        let outcome = timeout(budget, transport.round_trip(request)).await;
        match outcome {
            Err(_) => {
                self.discard("request timed out").await;
                Err(SessionError::Timeout {
                    method: method.to_owned(),
                    after: budget,
                })
            }
            Ok(Err(err)) if err.is_fatal() => {
                self.discard(&err.to_string()).await;
                Err(err)
            }
            Ok(Err(err)) => Err(err),
            Ok(Ok(response)) => response.into_result(),
        }
    }

    async fn notify(&mut self, method: &'static str) -> SessionResult<()> {
        let budget = self.config.request_timeout;
        let Some(transport) = self.transport.as_mut() else {
            return Err(SessionError::NotReady {
                state: self.lifecycle.state(),
                operation: method,
            });
        };

        let outcome = timeout(budget, transport.notify(JsonRpcNotification::new(method, None))).await;
        match outcome {
            Err(_) => {
                self.discard("notification timed out").await;
                Err(SessionError::Timeout {
                    method: method.to_owned(),
                    after: budget,
                })
            }
            Ok(Err(err)) if err.is_fatal() => {
                self.discard(&err.to_string()).await;
                Err(err)
            }
            Ok(result) => result,
        }
    }

    async fn discard(&mut self, reason: &str) {
        warn!(session_id = %self.id, endpoint = %self.endpoint, reason, "discarding session");
        if let Err(err) = self.close().await {
            debug!(session_id = %self.id, %err, "close after failure also failed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transport.is_some() {
            debug!(
                session_id = %self.id,
                endpoint = %self.endpoint,
                "session dropped without close; transport released on drop"
            );
        }
    }
}

/// Opens and initializes a session, runs `body`, and closes the session on
/// every exit path.
///
/// # Errors
///
/// Returns the first failure among open, initialize, and `body`, or the close
/// failure when everything else succeeded.
pub async fn with_session<T, F>(
    endpoint: &ProviderEndpoint,
    config: SessionConfig,
    body: F,
) -> SessionResult<T>
where
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, SessionResult<T>>,
{
    let mut session = Session::open(endpoint, config).await?;
    if let Err(err) = session.initialize().await {
        let _ = session.close().await;
        return Err(err);
    }
    session.scoped(body).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::protocol::JsonRpcResponse;
    use crate::transport::TransportKind;

    #[derive(Default)]
    struct Tally {
        writes: AtomicUsize,
        closes: AtomicUsize,
        methods: Mutex<Vec<String>>,
    }

    impl Tally {
        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum CallBehaviour {
        Answer,
        Hang,
        Garbage,
    }

    struct ScriptedTransport {
        tally: Arc<Tally>,
        call: CallBehaviour,
        protocol_version: &'static str,
    }

    impl ScriptedTransport {
        fn boxed(tally: &Arc<Tally>, call: CallBehaviour) -> Box<dyn Transport> {
            Box::new(Self {
                tally: Arc::clone(tally),
                call,
                protocol_version: LATEST_PROTOCOL_VERSION,
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::InProcess
        }

        fn endpoint(&self) -> &str {
            "scripted"
        }

        async fn round_trip(&mut self, request: JsonRpcRequest) -> SessionResult<JsonRpcResponse> {
            self.tally.writes.fetch_add(1, Ordering::SeqCst);
            self.tally.methods.lock().unwrap().push(request.method.clone());

            let result = match request.method.as_str() {
                methods::INITIALIZE => json!({
                    "protocolVersion": self.protocol_version,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "Scripted", "version": "1.0.0"}
                }),
                methods::TOOLS_LIST => {
                    let cursor = request
                        .params
                        .as_ref()
                        .and_then(|params| params.get("cursor"))
                        .and_then(Value::as_str);
                    match cursor {
                        None => json!({
                            "tools": [{"name": "add", "description": "Add two numbers"}],
                            "nextCursor": "page-2"
                        }),
                        Some(_) => json!({
                            "tools": [{"name": "multiply", "description": "Multiply two numbers"}]
                        }),
                    }
                }
                methods::TOOLS_CALL => match self.call {
                    CallBehaviour::Answer => json!({
                        "content": [{"type": "text", "text": "18"}],
                        "isError": false
                    }),
                    CallBehaviour::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        json!({})
                    }
                    CallBehaviour::Garbage => {
                        return Err(SessionError::protocol("invalid JSON from provider"));
                    }
                },
                _ => json!({}),
            };

            Ok(JsonRpcResponse::success(json!(request.id), result))
        }

        async fn notify(&mut self, notification: JsonRpcNotification) -> SessionResult<()> {
            self.tally.writes.fetch_add(1, Ordering::SeqCst);
            self.tally.methods.lock().unwrap().push(notification.method);
            Ok(())
        }

        async fn close(&mut self) -> SessionResult<()> {
            self.tally.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn add_args() -> Map<String, Value> {
        json!({"a": 10, "b": 8}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn invoke_before_initialize_writes_nothing() {
        let tally = Arc::new(Tally::default());
        let mut session = Session::new(
            ScriptedTransport::boxed(&tally, CallBehaviour::Answer),
            SessionConfig::default(),
        );

        let err = session.invoke("add", add_args()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotReady {
                state: SessionState::Created,
                operation: "invoke"
            }
        ));
        assert!(session.list_capabilities().await.is_err());
        assert_eq!(tally.writes(), 0);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn handshake_list_and_invoke() {
        let tally = Arc::new(Tally::default());
        let mut session = Session::new(
            ScriptedTransport::boxed(&tally, CallBehaviour::Answer),
            SessionConfig::default(),
        );

        session.initialize().await.unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
        assert_eq!(session.provider().unwrap().name(), "Scripted");
        assert_eq!(session.negotiated_version(), Some(LATEST_PROTOCOL_VERSION));

        let names: Vec<_> = session
            .list_capabilities()
            .await
            .unwrap()
            .into_iter()
            .map(|capability| capability.name().to_string())
            .collect();
        assert_eq!(names, ["add", "multiply"]);

        let result = session.invoke("add", add_args()).await.unwrap();
        assert!(!result.is_error());
        assert_eq!(result.text(), "18");
        assert_eq!(session.state(), SessionState::Active);

        let methods = tally.methods.lock().unwrap().clone();
        assert_eq!(
            methods,
            [
                "initialize",
                "notifications/initialized",
                "tools/list",
                "tools/list",
                "tools/call"
            ]
        );
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let tally = Arc::new(Tally::default());
        let mut session = Session::new(
            ScriptedTransport::boxed(&tally, CallBehaviour::Answer),
            SessionConfig::default(),
        );
        session.initialize().await.unwrap();
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::NotReady { operation: "initialize", .. }));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn timeout_discards_session() {
        let tally = Arc::new(Tally::default());
        let mut session = Session::new(
            ScriptedTransport::boxed(&tally, CallBehaviour::Hang),
            SessionConfig::default().with_request_timeout(Duration::from_millis(50)),
        );
        session.initialize().await.unwrap();

        let err = session.invoke("add", add_args()).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(tally.closes(), 1);

        let again = session.invoke("add", add_args()).await.unwrap_err();
        assert!(matches!(
            again,
            SessionError::NotReady {
                state: SessionState::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_releases_once_after_failed_invoke() {
        let tally = Arc::new(Tally::default());
        let mut session = Session::new(
            ScriptedTransport::boxed(&tally, CallBehaviour::Garbage),
            SessionConfig::default(),
        );
        session.initialize().await.unwrap();

        let err = session.invoke("add", add_args()).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol { .. }));

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(tally.closes(), 1);
    }

    #[tokio::test]
    async fn scoped_closes_on_error_path() {
        let tally = Arc::new(Tally::default());
        let session = Session::new(
            ScriptedTransport::boxed(&tally, CallBehaviour::Answer),
            SessionConfig::default(),
        );

        let outcome = session
            .scoped(|session| Box::pin(async move { session.invoke("add", add_args()).await }))
            .await;

        assert!(matches!(outcome, Err(SessionError::NotReady { .. })));
        assert_eq!(tally.closes(), 1);
    }

    #[tokio::test]
    async fn unsupported_protocol_version_is_fatal() {
        let tally = Arc::new(Tally::default());
        let transport = Box::new(ScriptedTransport {
            tally: Arc::clone(&tally),
            call: CallBehaviour::Answer,
            protocol_version: "1999-01-01",
        });
        let mut session = Session::new(transport, SessionConfig::default());

        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol { .. }));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(tally.closes(), 1);
    }
}
