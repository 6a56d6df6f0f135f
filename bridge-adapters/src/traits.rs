//! Adapter trait, request types, and the one-shot completion helper.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Result alias used by model adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Streaming response emitted by [`ModelAdapter::infer`].
pub type AdapterStream = Pin<Box<dyn Stream<Item = AdapterResult<InferenceChunk>> + Send>>;

/// System prompt sent with every completion unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an intelligent assistant. You will execute tasks as prompted.";

/// Sampling temperature used unless overridden.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Output token budget used unless overridden.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 250;

/// Error type shared by adapter implementations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter is misconfigured or missing credentials.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The supplied request was invalid for the target model.
    #[error("invalid inference request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// Network or HTTP failure.
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The model did not answer in time.
    #[error("model request timed out after {after:?}")]
    Timeout {
        /// Configured limit.
        after: Duration,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("adapter rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The provider returned an error status or a malformed body.
    #[error("adapter response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },
}

impl AdapterError {
    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for response failures.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }
}

/// Provider and model identifying an adapter instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    model: String,
}

impl AdapterMetadata {
    /// Creates metadata for the supplied provider and model identifier.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Returns the provider identifier (e.g., "openai").
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Roles supported in chat-style prompts.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System messages steer the assistant behaviour.
    System,
    /// User-authored content.
    User,
    /// Assistant (model) responses.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

/// A single chat message.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    role: MessageRole,
    content: String,
}

impl PromptMessage {
    /// Creates a new prompt message.
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Returns the message role.
    #[must_use]
    pub const fn role(&self) -> MessageRole {
        self.role
    }

    /// Returns the message content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Request submitted to a model adapter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct InferenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    messages: Vec<PromptMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl InferenceRequest {
    /// Creates a request with the supplied messages.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] if the message list is empty.
    pub fn new(messages: Vec<PromptMessage>) -> AdapterResult<Self> {
        if messages.is_empty() {
            return Err(AdapterError::invalid_request(
                "inference request requires at least one message",
            ));
        }

        Ok(Self {
            system_prompt: None,
            messages,
            max_output_tokens: None,
            temperature: None,
        })
    }

    /// Sets the system prompt. Adapters place it ahead of the messages.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the maximum output token budget.
    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Returns the system prompt if configured.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Returns the prompt messages.
    #[must_use]
    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// Returns the configured maximum output tokens.
    #[must_use]
    pub const fn max_output_tokens(&self) -> Option<u32> {
        self.max_output_tokens
    }

    /// Returns the configured sampling temperature.
    #[must_use]
    pub const fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}

/// Streaming chunk returned by the adapter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct InferenceChunk {
    /// Partial text emitted by the provider.
    pub delta: String,
    /// Whether the generation is complete.
    pub done: bool,
}

impl InferenceChunk {
    /// Creates a new chunk.
    #[must_use]
    pub fn new(delta: impl Into<String>, done: bool) -> Self {
        Self {
            delta: delta.into(),
            done,
        }
    }
}

/// Trait implemented by all model adapters.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Returns basic metadata describing the adapter instance.
    fn metadata(&self) -> &AdapterMetadata;

    /// Executes the inference request, returning a streaming response.
    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream>;
}

/// Settings applied by [`complete`] to every prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// System prompt placed ahead of the user prompt.
    pub system_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token budget.
    pub max_output_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

/// Sends one user prompt and returns the whole reply, trimmed.
///
/// # Errors
///
/// Returns whatever the adapter or its stream reports.
pub async fn complete(
    adapter: &dyn ModelAdapter,
    prompt: &str,
    settings: &CompletionSettings,
) -> AdapterResult<String> {
    let request = InferenceRequest::new(vec![PromptMessage::new(MessageRole::User, prompt)])?
        .with_system_prompt(settings.system_prompt.clone())
        .with_temperature(settings.temperature)
        .with_max_output_tokens(settings.max_output_tokens);

    let mut stream = adapter.infer(request).await?;
    let mut reply = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        reply.push_str(&chunk.delta);
        if chunk.done {
            break;
        }
    }

    let metadata = adapter.metadata();
    debug!(
        provider = metadata.provider(),
        model = metadata.model(),
        reply_bytes = reply.len(),
        "model replied"
    );
    Ok(reply.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::stream;

    use super::*;

    struct Recording {
        metadata: AdapterMetadata,
        seen: Mutex<Vec<InferenceRequest>>,
        chunks: Vec<&'static str>,
    }

    #[async_trait]
    impl ModelAdapter for Recording {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
            self.seen.lock().unwrap().push(request);
            let last = self.chunks.len().saturating_sub(1);
            let chunks: Vec<_> = self
                .chunks
                .iter()
                .enumerate()
                .map(|(index, delta)| Ok(InferenceChunk::new(*delta, index == last)))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    #[test]
    fn validates_request_messages() {
        let err = InferenceRequest::new(Vec::new()).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn complete_applies_settings_and_joins_chunks() {
        let adapter = Recording {
            metadata: AdapterMetadata::new("recording", "test"),
            seen: Mutex::new(Vec::new()),
            chunks: vec!["  {\"tool\": ", "\"add\"}\n"],
        };

        let reply = complete(&adapter, "What is 10 plus 8?", &CompletionSettings::default())
            .await
            .unwrap();
        assert_eq!(reply, "{\"tool\": \"add\"}");

        let seen = adapter.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.system_prompt(), Some(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(request.temperature(), Some(0.2));
        assert_eq!(request.max_output_tokens(), Some(250));
        assert_eq!(request.messages()[0].content(), "What is 10 plus 8?");
        assert_eq!(request.messages()[0].role(), MessageRole::User);
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: CompletionSettings =
            serde_json::from_str(r#"{"temperature": 0.0}"#).unwrap();
        assert_eq!(settings.max_output_tokens, DEFAULT_MAX_OUTPUT_TOKENS);
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}
