//! Adapter for OpenAI-compatible chat completion endpoints.
//!
//! Works against `OpenAI` itself and against compatible hosts such as Groq by
//! changing the base URL. Credentials are always passed in explicitly.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bridge_session::transport::{HttpClientOptions, HttpsClient, https_client};
use futures::stream;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Body, Request, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceRequest,
    ModelAdapter, PromptMessage,
};

/// Base URL of the `OpenAI` API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/";

/// Base URL of Groq's OpenAI-compatible API.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for [`OpenAiAdapter`].
#[derive(Clone)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiConfig {
    /// Creates a configuration for `model` against the `OpenAI` API.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: OPENAI_BASE_URL.to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
            default_max_tokens: None,
        }
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the token budget used when requests omit it.
    #[must_use]
    pub fn with_default_max_tokens(mut self, tokens: u32) -> Self {
        self.default_max_tokens = Some(tokens);
        self
    }

    /// Sets the overall request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Configured model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Configured base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Adapter that calls a chat completion endpoint over HTTP(S).
pub struct OpenAiAdapter {
    client: HttpsClient,
    endpoint: Uri,
    metadata: AdapterMetadata,
    api_key: String,
    timeout: Duration,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or
    /// blank, or the endpoint URL is invalid.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AdapterError::configuration("chat completion adapter requires an API key"))?;

        let metadata = AdapterMetadata::new("openai", config.model);
        let endpoint = format!("{}v1/chat/completions", config.base_url)
            .parse::<Uri>()
            .map_err(|err| AdapterError::configuration(format!("invalid endpoint: {err}")))?;

        Ok(Self {
            client: https_client(HttpClientOptions::new().with_connect_timeout(config.timeout)),
            endpoint,
            metadata,
            api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
            default_max_tokens: config.default_max_tokens,
        })
    }

    /// Chat completion URL.
    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatCompletionRequest {
        let system = request.system_prompt().map(|prompt| ChatMessage {
            role: "system".to_owned(),
            content: prompt.to_owned(),
        });
        let messages = system
            .into_iter()
            .chain(request.messages().iter().map(map_prompt_message))
            .collect();

        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens().or(self.default_max_tokens),
            stream: false,
        }
    }

    async fn send(&self, body: Vec<u8>) -> AdapterResult<(StatusCode, Option<Duration>, Vec<u8>)> {
        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .body(Body::from(body))
            .map_err(|err| AdapterError::transport(format!("failed to build request: {err}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| AdapterError::transport(format!("chat completion request failed: {err}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| AdapterError::transport(format!("failed to read response: {err}")))?;
        Ok((status, retry_after, bytes.to_vec()))
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        let payload = self.build_request(&request);
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode chat request: {err}"))
        })?;

        debug!(model = %payload.model, endpoint = %self.endpoint, "querying model");
        let (status, retry_after, bytes) = timeout(self.timeout, self.send(body))
            .await
            .map_err(|_| AdapterError::Timeout {
                after: self.timeout,
            })??;

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(?retry_after, "model endpoint rate limited the request");
            return Err(AdapterError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes);
            return Err(AdapterError::response(format!(
                "endpoint returned {status}: {reason}"
            )));
        }

        let response: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|err| AdapterError::response(format!("failed to decode response: {err}")))?;

        let content = response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|message| message.content))
            .ok_or_else(|| AdapterError::response("response carried no message content"))?;

        let stream = stream::once(async move { Ok(InferenceChunk::new(content, true)) });
        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn map_prompt_message(message: &PromptMessage) -> ChatMessage {
    ChatMessage {
        role: message.role().to_string(),
        content: message.content().to_owned(),
    }
}

fn sanitize_base_url(input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(
            "base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid base URL: {err}")))?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Response, Server};
    use serde_json::{Value, json};

    use super::*;
    use crate::traits::{CompletionSettings, MessageRole, complete};

    #[derive(Default)]
    struct Captured {
        authorization: Option<String>,
        path: String,
        body: Value,
    }

    fn serve(status: StatusCode, reply: &'static str) -> (SocketAddr, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&captured);
        let make_service = make_service_fn(move |_| {
            let sink = Arc::clone(&sink);
            async move {
                Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                    let sink = Arc::clone(&sink);
                    async move {
                        let authorization = request
                            .headers()
                            .get(AUTHORIZATION)
                            .map(|value| value.to_str().unwrap().to_owned());
                        let path = request.uri().path().to_owned();
                        let bytes = to_bytes(request.into_body()).await.unwrap();
                        *sink.lock().unwrap() = Captured {
                            authorization,
                            path,
                            body: serde_json::from_slice(&bytes).unwrap(),
                        };
                        let mut response = Response::new(Body::from(reply));
                        *response.status_mut() = status;
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            response
                                .headers_mut()
                                .insert(RETRY_AFTER, "7".parse().unwrap());
                        }
                        Ok::<_, Infallible>(response)
                    }
                }))
            }
        });
        let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_service);
        let addr = server.local_addr();
        tokio::spawn(server);
        (addr, captured)
    }

    fn adapter(addr: SocketAddr) -> OpenAiAdapter {
        let config = OpenAiConfig::new(DEFAULT_MODEL)
            .with_api_key("test-key")
            .with_base_url(format!("http://{addr}"))
            .unwrap();
        OpenAiAdapter::new(config).unwrap()
    }

    #[test]
    fn base_url_requires_scheme() {
        let err = OpenAiConfig::new("gpt-4")
            .with_base_url("api.openai.com")
            .unwrap_err();
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn groq_base_url_targets_compatible_path() {
        let config = OpenAiConfig::new("llama-3.1-8b-instant")
            .with_api_key("key")
            .with_base_url(GROQ_BASE_URL)
            .unwrap();
        let adapter = OpenAiAdapter::new(config).unwrap();
        assert_eq!(
            adapter.endpoint().to_string(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn missing_or_blank_key_is_rejected() {
        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4")).unwrap_err();
        assert!(matches!(err, AdapterError::Configuration { .. }));

        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4").with_api_key("  ")).unwrap_err();
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = OpenAiConfig::new("gpt-4").with_api_key("sk-secret");
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn system_prompt_leads_the_message_list() {
        let adapter = OpenAiAdapter::new(
            OpenAiConfig::new("gpt-4")
                .with_api_key("key")
                .with_default_temperature(0.2),
        )
        .unwrap();
        let request = InferenceRequest::new(vec![PromptMessage::new(MessageRole::User, "hello")])
            .unwrap()
            .with_system_prompt("be brief");

        let chat = adapter.build_request(&request);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[0].content, "be brief");
        assert_eq!(chat.messages[1].role, "user");
        assert_eq!(chat.temperature, Some(0.2));
        assert_eq!(chat.max_tokens, None);
    }

    #[tokio::test]
    async fn completes_against_a_compatible_endpoint() {
        let (addr, captured) = serve(
            StatusCode::OK,
            r#"{"choices":[{"message":{"role":"assistant","content":" No capability needed \n"}}]}"#,
        );
        let adapter = adapter(addr);

        let reply = complete(&adapter, "hello", &CompletionSettings::default())
            .await
            .unwrap();
        assert_eq!(reply, "No capability needed");

        let captured = captured.lock().unwrap();
        assert_eq!(captured.authorization.as_deref(), Some("Bearer test-key"));
        assert_eq!(captured.path, "/v1/chat/completions");
        assert_eq!(captured.body["model"], DEFAULT_MODEL);
        assert_eq!(captured.body["max_tokens"], 250);
        assert_eq!(captured.body["stream"], false);
        assert_eq!(
            captured.body["messages"],
            json!([
                {"role": "system", "content": crate::DEFAULT_SYSTEM_PROMPT},
                {"role": "user", "content": "hello"}
            ])
        );
    }

    #[tokio::test]
    async fn rate_limits_surface_retry_hint() {
        let (addr, _) = serve(StatusCode::TOO_MANY_REQUESTS, "{}");
        let err = complete(&adapter(addr), "hello", &CompletionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::RateLimited { retry_after: Some(after) } if after == Duration::from_secs(7)
        ));
    }

    #[tokio::test]
    async fn error_status_is_a_response_failure() {
        let (addr, _) = serve(StatusCode::UNAUTHORIZED, r#"{"error":"bad key"}"#);
        let err = complete(&adapter(addr), "hello", &CompletionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Response { ref reason } if reason.contains("401")));
    }

    #[tokio::test]
    async fn empty_choices_are_rejected() {
        let (addr, _) = serve(StatusCode::OK, r#"{"choices":[]}"#);
        let err = complete(&adapter(addr), "hello", &CompletionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Response { .. }));
    }
}
