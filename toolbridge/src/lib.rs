//! Tool-invocation mediation for language models.
//!
//! Depend on this crate to get the whole stack behind feature flags:
//! sessions to capability providers, a merged capability registry, prompt
//! compilation, model adapters, and the mediator that turns a model reply
//! into exactly one checked capability invocation.

#![warn(missing_docs, clippy::pedantic)]

/// Capability and input-shape types shared by every layer.
pub use bridge_primitives as primitives;

/// Provider sessions over stdio and HTTP.
pub use bridge_session as session;

/// Capability discovery and the merged registry (enabled by `registry` feature).
#[cfg(feature = "registry")]
pub use bridge_registry as registry;

/// Prompt templates and the registry-driven compiler (enabled by `prompts` feature).
#[cfg(feature = "prompts")]
pub use bridge_prompts as prompts;

/// Language model adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use bridge_adapters as adapters;

/// Decision parsing, dispatch, and the mediator (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use bridge_kernel as kernel;

/// Capability provider servers and catalogs (enabled by `provider` feature).
#[cfg(feature = "provider")]
pub use bridge_provider as provider;

/// Configuration files (enabled by `config` feature).
#[cfg(feature = "config")]
pub use bridge_config as config;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use bridge_telemetry as telemetry;
