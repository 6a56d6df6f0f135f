//! Errors raised while assembling or serving a provider.

use thiserror::Error;

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors produced by capability registration and the server loops.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A capability name was registered twice on the same provider.
    #[error("capability `{name}` is already registered")]
    DuplicateCapability {
        /// Name of the offending capability.
        name: String,
    },

    /// The requested catalog does not exist.
    #[error("unknown catalog `{name}` (expected one of: math, bmi, weather)")]
    UnknownCatalog {
        /// Requested catalog name.
        name: String,
    },

    /// A capability descriptor or manifest failed validation.
    #[error(transparent)]
    Descriptor(#[from] bridge_primitives::Error),

    /// Reading from or writing to the framed channel failed.
    #[error("provider I/O failed: {source}")]
    Io {
        /// Underlying I/O failure.
        #[from]
        source: std::io::Error,
    },

    /// The HTTP server could not be started or crashed.
    #[error("HTTP server failed: {reason}")]
    Server {
        /// Human-readable failure.
        reason: String,
    },

    /// An outbound message could not be encoded.
    #[error("failed to encode message: {source}")]
    Encode {
        /// Source serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Domain failure reported by a capability handler.
///
/// The provider never lets this cross the wire as a JSON-RPC error; it becomes
/// a `tools/call` result with `isError` set and the message as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Message shown to the caller.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
