//! Errors produced while discovering and resolving capabilities.

use bridge_session::SessionError;
use thiserror::Error;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced by discovery and lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two providers advertise the same capability name.
    #[error("capability `{name}` is advertised by both `{first}` and `{second}`")]
    DuplicateCapability {
        /// Colliding capability name.
        name: String,
        /// Provider that registered the name first.
        first: String,
        /// Provider that tried to register it again.
        second: String,
    },

    /// No capability with this name was discovered.
    #[error("capability `{name}` is not registered")]
    NotFound {
        /// Requested name.
        name: String,
    },

    /// Opening, initializing or listing a provider failed.
    #[error("discovery from provider `{provider}` failed: {source}")]
    Discovery {
        /// Provider that failed.
        provider: String,
        /// Underlying session failure.
        #[source]
        source: SessionError,
    },

    /// A session needed for the operation is not in the pool.
    #[error("no open session for provider `{provider}`")]
    MissingSession {
        /// Provider without a session.
        provider: String,
    },

    /// Closing a pooled session failed.
    #[error("closing session for `{provider}` failed: {source}")]
    Shutdown {
        /// Provider whose session failed to close.
        provider: String,
        /// Underlying session failure.
        #[source]
        source: SessionError,
    },
}

impl RegistryError {
    pub(crate) fn discovery(provider: &str, source: SessionError) -> Self {
        Self::Discovery {
            provider: provider.to_owned(),
            source,
        }
    }
}
