//! Provider reachable over HTTP, one POST per outbound message.

use std::fmt;

use async_trait::async_trait;
use hyper::body::{HttpBody as _, to_bytes};
use hyper::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode, Uri};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::http_client::{HttpClientOptions, HttpsClient, https_client};
use super::sse::{SseDecoder, SseEvent};
use super::{Transport, TransportKind};
use crate::endpoint::{HttpEndpoint, SubProtocol};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcError, codes, methods,
};

/// Header carrying the provider-assigned session identifier.
pub const SESSION_HEADER: &str = "mcp-session-id";

const STREAMABLE_ACCEPT: &str = "application/json, text/event-stream";
const JSON_ACCEPT: &str = "application/json";

/// HTTP channel to a network provider.
pub struct HttpTransport {
    endpoint: String,
    uri: Uri,
    protocol: SubProtocol,
    headers: Vec<(HeaderName, HeaderValue)>,
    client: HttpsClient,
    session_id: Option<String>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("protocol", &self.protocol)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Validates the endpoint and prepares a client for it.
    ///
    /// No connection is made here; an unreachable host surfaces as
    /// [`SessionError::TransportUnavailable`] on the first request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportUnavailable`] for URLs without an
    /// `http`/`https` scheme or for headers that are not valid HTTP.
    pub fn connect(config: &HttpEndpoint, identifier: impl Into<String>) -> SessionResult<Self> {
        let endpoint = identifier.into();

        let uri = config
            .url()
            .parse::<Uri>()
            .map_err(|err| SessionError::unavailable(&endpoint, format!("invalid URL: {err}")))?;
        if !matches!(uri.scheme_str(), Some("http" | "https")) {
            return Err(SessionError::unavailable(
                &endpoint,
                "URL must start with http:// or https://",
            ));
        }

        let headers = config
            .headers()
            .iter()
            .map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                    SessionError::unavailable(&endpoint, format!("invalid header name: {err}"))
                })?;
                let value = HeaderValue::from_str(value).map_err(|err| {
                    SessionError::unavailable(&endpoint, format!("invalid header value: {err}"))
                })?;
                Ok((name, value))
            })
            .collect::<SessionResult<Vec<_>>>()?;

        info!(endpoint = %endpoint, protocol = config.protocol().as_str(), "prepared HTTP provider client");

        Ok(Self {
            endpoint,
            uri,
            protocol: config.protocol(),
            headers,
            client: https_client(HttpClientOptions::new().with_max_idle_per_host(1)),
            session_id: None,
        })
    }

    /// Session identifier assigned by the provider, once known.
    #[must_use]
    pub fn provider_session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn build_request(&self, method: Method, body: Body) -> SessionResult<Request<Body>> {
        let accept = match self.protocol {
            SubProtocol::StreamableHttp => STREAMABLE_ACCEPT,
            SubProtocol::Http => JSON_ACCEPT,
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept);

        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if let Some(session_id) = &self.session_id {
            builder = builder.header(SESSION_HEADER, session_id.as_str());
        }

        builder
            .body(body)
            .map_err(|err| SessionError::transport(format!("failed to build request: {err}")))
    }

    async fn post(&mut self, payload: Vec<u8>) -> SessionResult<Response<Body>> {
        let request = self.build_request(Method::POST, Body::from(payload))?;

        let response = self.client.request(request).await.map_err(|err| {
            if err.is_connect() {
                SessionError::unavailable(&self.endpoint, err.to_string())
            } else {
                SessionError::transport(format!("request to provider failed: {err}"))
            }
        })?;

        if self.protocol == SubProtocol::StreamableHttp {
            if let Some(id) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
            {
                if self.session_id.as_deref() != Some(id) {
                    debug!(endpoint = %self.endpoint, session = id, "provider assigned session");
                    self.session_id = Some(id.to_owned());
                }
            }
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let bytes = to_bytes(response.into_body()).await.unwrap_or_default();
        let detail = String::from_utf8_lossy(&bytes);
        if status == StatusCode::NOT_FOUND && self.session_id.is_some() {
            return Err(SessionError::transport("provider session expired"));
        }
        Err(SessionError::transport(format!(
            "provider returned {status}: {detail}"
        )))
    }

    async fn read_event_stream(
        &mut self,
        mut body: Body,
        expected: &Value,
    ) -> SessionResult<JsonRpcResponse> {
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.data().await {
            let chunk = chunk
                .map_err(|err| SessionError::transport(format!("event stream failed: {err}")))?;
            for event in decoder.push(&chunk)? {
                if let Some(response) = self.handle_event(event, expected).await? {
                    return Ok(response);
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if let Some(response) = self.handle_event(event, expected).await? {
                return Ok(response);
            }
        }

        Err(SessionError::transport(
            "event stream ended before the response arrived",
        ))
    }

    async fn handle_event(
        &mut self,
        event: SseEvent,
        expected: &Value,
    ) -> SessionResult<Option<JsonRpcResponse>> {
        if !event.is_message() {
            debug!(endpoint = %self.endpoint, event = %event.event, "ignoring event");
            return Ok(None);
        }

        match JsonRpcMessage::parse(&event.data)? {
            JsonRpcMessage::Response(response) if &response.id == expected => Ok(Some(response)),
            JsonRpcMessage::Response(response) => Err(SessionError::protocol(format!(
                "response id {} does not match request id {expected}",
                response.id
            ))),
            JsonRpcMessage::Request(peer) => {
                self.answer_peer_request(peer).await?;
                Ok(None)
            }
            JsonRpcMessage::Notification(note) => {
                debug!(endpoint = %self.endpoint, method = %note.method, "provider notification");
                Ok(None)
            }
        }
    }

    async fn answer_peer_request(&mut self, request: JsonRpcRequest) -> SessionResult<()> {
        let id = Value::from(request.id);
        let response = if request.method == methods::PING {
            JsonRpcResponse::success(id, json!({}))
        } else {
            warn!(endpoint = %self.endpoint, method = %request.method, "provider sent an unsupported request");
            JsonRpcResponse::failure(
                id,
                RpcError::new(codes::METHOD_NOT_FOUND, "Method not found"),
            )
        };
        let reply = self.post(serde_json::to_vec(&response)?).await?;
        let _ = to_bytes(reply.into_body()).await;
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        match self.protocol {
            SubProtocol::StreamableHttp => TransportKind::StreamableHttp,
            SubProtocol::Http => TransportKind::Http,
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn round_trip(&mut self, request: JsonRpcRequest) -> SessionResult<JsonRpcResponse> {
        let expected = Value::from(request.id.clone());
        let response = self.post(serde_json::to_vec(&request)?).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim_start().starts_with("text/event-stream"));

        if is_event_stream {
            return self.read_event_stream(response.into_body(), &expected).await;
        }

        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| SessionError::transport(format!("failed to read response: {err}")))?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|err| SessionError::protocol(format!("response is not UTF-8: {err}")))?;

        match JsonRpcMessage::parse(text)? {
            JsonRpcMessage::Response(response) if response.id == expected => Ok(response),
            other => Err(SessionError::protocol(format!(
                "expected response to request {expected}, got {other:?}"
            ))),
        }
    }

    async fn notify(&mut self, notification: JsonRpcNotification) -> SessionResult<()> {
        let response = self.post(serde_json::to_vec(&notification)?).await?;
        let _ = to_bytes(response.into_body()).await;
        Ok(())
    }

    async fn close(&mut self) -> SessionResult<()> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };

        let mut request = self.build_request(Method::DELETE, Body::empty())?;
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            request.headers_mut().insert(SESSION_HEADER, value);
        }

        match self.client.request(request).await {
            Ok(response) => {
                debug!(endpoint = %self.endpoint, status = %response.status(), "released provider session");
            }
            Err(err) => {
                debug!(endpoint = %self.endpoint, %err, "provider session release failed");
            }
        }
        Ok(())
    }
}
