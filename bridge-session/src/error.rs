//! Error types for provider sessions.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::SessionState;

/// Result alias used by session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised while talking to a capability provider.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The provider process could not be started or the endpoint could not be
    /// reached.
    #[error("provider `{endpoint}` unavailable: {reason}")]
    TransportUnavailable {
        /// Identifier of the endpoint that failed.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The session is not in a state that allows the requested operation.
    #[error("session not ready for {operation} (state: {state:?})")]
    NotReady {
        /// Current session state.
        state: SessionState,
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// No response arrived within the configured request timeout.
    #[error("`{method}` timed out after {after:?}")]
    Timeout {
        /// JSON-RPC method that was in flight.
        method: String,
        /// Elapsed budget.
        after: Duration,
    },

    /// The provider violated the message framing or the protocol contract.
    #[error("protocol violation: {reason}")]
    Protocol {
        /// Description of the violation.
        reason: String,
    },

    /// The established channel failed mid-conversation.
    #[error("transport failure: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
    },

    /// The provider answered with a JSON-RPC error object.
    #[error("provider returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Provider supplied message.
        message: String,
    },

    /// A message could not be encoded for the wire.
    #[error("failed to encode message: {source}")]
    Encode {
        /// Source serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Convenience constructor for unreachable endpoints.
    #[must_use]
    pub fn unavailable(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for protocol violations.
    #[must_use]
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
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

    /// Returns `true` when the error leaves the channel in an undefined state,
    /// after which the session must be discarded.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Protocol { .. } | Self::Transport { .. }
        )
    }
}
