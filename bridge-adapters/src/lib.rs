//! Language model adapters.
//!
//! The mediator consumes a model through [`ModelAdapter`]; [`complete`] turns
//! one compiled prompt into one trimmed reply. [`openai::OpenAiAdapter`]
//! speaks the chat completion API shared by `OpenAI` and Groq.

#![warn(missing_docs, clippy::pedantic)]

pub mod openai;
mod traits;

pub use traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, CompletionSettings,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE, InferenceChunk,
    InferenceRequest, MessageRole, ModelAdapter, PromptMessage, complete,
};
