//! HTTP server exposing a provider at a single endpoint path.

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bridge_session::protocol::{JsonRpcResponse, RpcError, codes, methods};
use hyper::body::to_bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::CapabilityProvider;

/// Header carrying the session identifier assigned at `initialize`.
const SESSION_HEADER: &str = "mcp-session-id";

/// Options for [`spawn_http`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerOptions {
    path: String,
    event_stream: bool,
}

impl Default for HttpServerOptions {
    fn default() -> Self {
        Self {
            path: "/mcp".to_owned(),
            event_stream: false,
        }
    }
}

impl HttpServerOptions {
    /// Serves on `path` instead of `/mcp`.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Answers requests with `text/event-stream` bodies when the client
    /// accepts them.
    #[must_use]
    pub fn with_event_stream(mut self, enabled: bool) -> Self {
        self.event_stream = enabled;
        self
    }

    /// Endpoint path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

struct HttpState {
    provider: Arc<CapabilityProvider>,
    options: HttpServerOptions,
    sessions: Mutex<HashSet<String>>,
}

impl HttpState {
    fn has_session(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains(id))
            .unwrap_or(false)
    }

    fn open_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id.clone());
        }
        id
    }

    fn end_session(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .map(|mut sessions| sessions.remove(id))
            .unwrap_or(false)
    }

    fn session_count(&self) -> usize {
        self.sessions.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }
}

/// Running HTTP provider.
pub struct HttpProviderHandle {
    local_addr: SocketAddr,
    state: Arc<HttpState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), hyper::Error>>,
}

impl std::fmt::Debug for HttpProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProviderHandle")
            .field("local_addr", &self.local_addr)
            .field("path", &self.state.options.path)
            .finish_non_exhaustive()
    }
}

impl HttpProviderHandle {
    /// Address the server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Full endpoint URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.state.options.path)
    }

    /// Number of client sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.state.session_count()
    }

    /// Stops accepting connections and waits for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Server`] when the server task failed.
    pub async fn shutdown(mut self) -> ProviderResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match (&mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ProviderError::Server {
                reason: err.to_string(),
            }),
            Err(err) => Err(ProviderError::Server {
                reason: format!("server task failed: {err}"),
            }),
        }
    }
}

/// Binds `addr` and serves `provider` in a background task.
///
/// # Errors
///
/// Returns [`ProviderError::Server`] when the address cannot be bound.
pub fn spawn_http(
    provider: Arc<CapabilityProvider>,
    addr: SocketAddr,
    options: HttpServerOptions,
) -> ProviderResult<HttpProviderHandle> {
    let builder = Server::try_bind(&addr).map_err(|err| ProviderError::Server {
        reason: format!("failed to bind {addr}: {err}"),
    })?;

    let state = Arc::new(HttpState {
        provider,
        options,
        sessions: Mutex::new(HashSet::new()),
    });

    let service_state = Arc::clone(&state);
    let make_service = make_service_fn(move |_conn| {
        let state = Arc::clone(&service_state);
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                handle_request(Arc::clone(&state), request)
            }))
        }
    });

    let server = builder.serve(make_service);
    let local_addr = server.local_addr();
    let (shutdown, signal) = oneshot::channel::<()>();
    let task = tokio::spawn(server.with_graceful_shutdown(async {
        let _ = signal.await;
    }));

    info!(
        %local_addr,
        path = %state.options.path,
        provider = %state.provider.manifest().name(),
        "serving over HTTP"
    );

    Ok(HttpProviderHandle {
        local_addr,
        state,
        shutdown: Some(shutdown),
        task,
    })
}

/// Serves `provider` over HTTP until Ctrl-C.
///
/// # Errors
///
/// Returns [`ProviderError::Server`] when binding or serving fails.
pub async fn serve_http(
    provider: Arc<CapabilityProvider>,
    addr: SocketAddr,
    options: HttpServerOptions,
) -> ProviderResult<()> {
    let handle = spawn_http(provider, addr, options)?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down HTTP provider");
    handle.shutdown().await
}

async fn handle_request(
    state: Arc<HttpState>,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if request.uri().path() != state.options.path {
        return Ok(respond(StatusCode::NOT_FOUND, None, Body::empty(), None));
    }

    let session = request
        .headers()
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);

    let response = match *request.method() {
        Method::POST => handle_post(&state, request, session).await,
        Method::DELETE => match session {
            Some(id) if state.end_session(&id) => {
                debug!(session = %id, "client ended session");
                respond(StatusCode::OK, None, Body::empty(), None)
            }
            _ => respond(StatusCode::NOT_FOUND, None, Body::empty(), None),
        },
        _ => respond(StatusCode::METHOD_NOT_ALLOWED, None, Body::empty(), None),
    };
    Ok(response)
}

async fn handle_post(
    state: &HttpState,
    request: Request<Body>,
    session: Option<String>,
) -> Response<Body> {
    let wants_events = state.options.event_stream
        && request
            .headers()
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|accept| accept.contains("text/event-stream"));

    let bytes = match to_bytes(request.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "failed to read request body");
            return respond(StatusCode::BAD_REQUEST, None, Body::empty(), None);
        }
    };

    let Ok(message) = serde_json::from_slice::<Value>(&bytes) else {
        let failure = JsonRpcResponse::failure(
            Value::Null,
            RpcError::new(codes::PARSE_ERROR, "Parse error"),
        );
        return json_response(StatusCode::BAD_REQUEST, &failure, None);
    };

    let is_initialize = message.get("method").and_then(Value::as_str) == Some(methods::INITIALIZE);
    if let Some(id) = session.as_deref() {
        if !is_initialize && !state.has_session(id) {
            return respond(StatusCode::NOT_FOUND, None, Body::empty(), None);
        }
    }

    let Some(answer) = state.provider.handle(message).await else {
        return respond(StatusCode::ACCEPTED, None, Body::empty(), None);
    };

    let assigned = (is_initialize && answer.get("result").is_some()).then(|| state.open_session());

    if wants_events {
        let frame = format!("event: message\ndata: {answer}\n\n");
        return respond(
            StatusCode::OK,
            Some("text/event-stream"),
            Body::from(frame),
            assigned.as_deref(),
        );
    }
    json_response(StatusCode::OK, &answer, assigned.as_deref())
}

fn json_response(
    status: StatusCode,
    body: &impl serde::Serialize,
    session: Option<&str>,
) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => respond(status, Some("application/json"), Body::from(bytes), session),
        Err(_) => respond(StatusCode::INTERNAL_SERVER_ERROR, None, Body::empty(), None),
    }
}

fn respond(
    status: StatusCode,
    content_type: Option<&str>,
    body: Body,
    session: Option<&str>,
) -> Response<Body> {
    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder.body(body).unwrap_or_else(|_| {
        let mut fallback = Response::new(Body::empty());
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
