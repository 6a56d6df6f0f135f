//! Routes decisions to the provider session that owns the capability.

use std::time::Duration;

use bridge_primitives::ShapeViolation;
use bridge_registry::{CapabilityRegistry, SessionPool};
use bridge_session::{InvocationResult, SessionError};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::decision::Decision;

/// Result alias for dispatch.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failures while routing or executing a decision.
///
/// Everything past name resolution carries the capability name and the
/// arguments that were sent.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The model named a capability nobody advertised.
    #[error("unknown capability `{name}`")]
    UnknownCapability {
        /// Name as written by the model.
        name: String,
    },

    /// Arguments do not match the advertised input shape.
    #[error("invalid arguments for `{capability}`: {}", join(violations))]
    InvalidArguments {
        /// Target capability.
        capability: String,
        /// Arguments as written by the model.
        arguments: Map<String, Value>,
        /// Every mismatch found.
        violations: Vec<ShapeViolation>,
    },

    /// The owning provider has no open session.
    #[error("no open session to provider `{provider}` for `{capability}`")]
    NoSession {
        /// Target capability.
        capability: String,
        /// Provider that owns it.
        provider: String,
    },

    /// The capability ran and reported a failure.
    #[error("capability `{capability}` failed: {message}")]
    CapabilityExecution {
        /// Target capability.
        capability: String,
        /// Arguments that were sent.
        arguments: Map<String, Value>,
        /// Failure text returned by the provider.
        message: String,
    },

    /// The provider did not answer in time; its session was discarded.
    #[error("capability `{capability}` timed out after {after:?}")]
    Timeout {
        /// Target capability.
        capability: String,
        /// Arguments that were sent.
        arguments: Map<String, Value>,
        /// Configured limit.
        after: Duration,
    },

    /// The session failed before a result came back.
    #[error("invoking `{capability}` failed: {source}")]
    Session {
        /// Target capability.
        capability: String,
        /// Arguments that were sent.
        arguments: Map<String, Value>,
        /// Underlying session failure.
        #[source]
        source: SessionError,
    },
}

impl DispatchError {
    /// Capability involved, when the name resolved.
    #[must_use]
    pub fn capability(&self) -> &str {
        match self {
            Self::UnknownCapability { name } => name,
            Self::InvalidArguments { capability, .. }
            | Self::NoSession { capability, .. }
            | Self::CapabilityExecution { capability, .. }
            | Self::Timeout { capability, .. }
            | Self::Session { capability, .. } => capability,
        }
    }
}

fn join(violations: &[ShapeViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The model needed no capability; no session was touched.
    NoAction,
    /// A capability ran to completion.
    Completed(Invocation),
}

impl Dispatch {
    /// The invocation, when one happened.
    #[must_use]
    pub fn invocation(&self) -> Option<&Invocation> {
        match self {
            Self::NoAction => None,
            Self::Completed(invocation) => Some(invocation),
        }
    }
}

/// A completed capability call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    capability: String,
    provider: String,
    arguments: Map<String, Value>,
    result: InvocationResult,
}

impl Invocation {
    /// Capability that ran.
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Provider that served it.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Arguments that were sent.
    #[must_use]
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Full provider result.
    #[must_use]
    pub fn result(&self) -> &InvocationResult {
        &self.result
    }

    /// Text content of the result.
    #[must_use]
    pub fn text(&self) -> String {
        self.result.text()
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    validate_arguments: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            validate_arguments: true,
        }
    }
}

impl Dispatcher {
    /// Dispatcher that validates arguments against input shapes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables argument validation before invocation.
    #[must_use]
    pub const fn with_argument_validation(mut self, enabled: bool) -> Self {
        self.validate_arguments = enabled;
        self
    }

    /// Executes `decision`.
    ///
    /// # Errors
    ///
    /// See [`DispatchError`]. Unknown names and invalid arguments fail before
    /// any session is touched.
    pub async fn dispatch(
        &self,
        decision: Decision,
        registry: &CapabilityRegistry,
        sessions: &mut SessionPool,
    ) -> DispatchResult<Dispatch> {
        let (capability, arguments) = match decision {
            Decision::NoActionNeeded => return Ok(Dispatch::NoAction),
            Decision::Invoke {
                capability,
                arguments,
            } => (capability, arguments),
        };

        let Some(entry) = registry.get(&capability) else {
            warn!(capability = %capability, "model named an unknown capability");
            return Err(DispatchError::UnknownCapability { name: capability });
        };

        if self.validate_arguments {
            if let Err(violations) = entry.capability().input_shape().validate(&arguments) {
                return Err(DispatchError::InvalidArguments {
                    capability,
                    arguments,
                    violations,
                });
            }
        }

        let provider = entry.provider().to_owned();
        let Ok(session) = sessions.session_mut(&provider) else {
            return Err(DispatchError::NoSession {
                capability,
                provider,
            });
        };

        debug!(capability = %capability, provider = %provider, "dispatching capability");
        let outcome = session.invoke(&capability, arguments.clone()).await;

        match outcome {
            Ok(result) if result.is_error() => Err(DispatchError::CapabilityExecution {
                message: result.text(),
                capability,
                arguments,
            }),
            Ok(result) => {
                info!(capability = %capability, provider = %provider, "capability completed");
                Ok(Dispatch::Completed(Invocation {
                    capability,
                    provider,
                    arguments,
                    result,
                }))
            }
            Err(source) => {
                if source.is_fatal() {
                    warn!(provider = %provider, %source, "discarding failed provider session");
                    sessions.remove(&provider);
                }
                Err(match source {
                    SessionError::Timeout { after, .. } => DispatchError::Timeout {
                        capability,
                        arguments,
                        after,
                    },
                    source => DispatchError::Session {
                        capability,
                        arguments,
                        source,
                    },
                })
            }
        }
    }
}

/// Dispatches with argument validation enabled.
///
/// # Errors
///
/// See [`Dispatcher::dispatch`].
pub async fn dispatch(
    decision: Decision,
    registry: &CapabilityRegistry,
    sessions: &mut SessionPool,
) -> DispatchResult<Dispatch> {
    Dispatcher::default()
        .dispatch(decision, registry, sessions)
        .await
}
