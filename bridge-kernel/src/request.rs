//! Per-request state machine.

use std::fmt;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Identifier attached to every mediated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted, nothing done yet.
    Received,
    /// Prompt compiled from the registry.
    Compiled,
    /// Model reply received.
    ModelQueried,
    /// Reply parsed into a decision.
    Parsed,
    /// The model needed no capability.
    NoAction,
    /// A capability call is in flight.
    Dispatching,
    /// The capability returned a result.
    Completed,
    /// Some stage failed.
    Failed,
}

impl RequestState {
    /// Returns `true` for `Completed`, `Failed` and `NoAction`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NoAction)
    }
}

/// Events that move a request forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// Prompt compiled.
    Compile,
    /// Model answered.
    QueryModel,
    /// Reply parsed.
    Parse,
    /// Decision needs no capability.
    Skip,
    /// Decision sent to a provider.
    Dispatch,
    /// Provider returned a result.
    Complete,
    /// A stage failed.
    Fail,
}

/// Errors emitted by [`RequestLifecycle`].
#[derive(Debug, Error)]
pub enum RequestLifecycleError {
    /// Transition not permitted from the current state.
    #[error("invalid request transition from {from:?} via {event:?} for request {request_id}")]
    InvalidTransition {
        /// Request whose transition failed.
        request_id: RequestId,
        /// State prior to the attempt.
        from: RequestState,
        /// Offending event.
        event: RequestEvent,
    },
}

/// Checked request state holder. States only move forward.
#[derive(Debug, Clone, Copy)]
pub struct RequestLifecycle {
    request_id: RequestId,
    state: RequestState,
}

impl RequestLifecycle {
    /// Lifecycle in [`RequestState::Received`].
    #[must_use]
    pub const fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            state: RequestState::Received,
        }
    }

    /// Owning request.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RequestState {
        self.state
    }

    /// Applies `event`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestLifecycleError::InvalidTransition`] for any move not
    /// in the pipeline order, including every event after a terminal state.
    pub fn transition(&mut self, event: RequestEvent) -> Result<RequestState, RequestLifecycleError> {
        use RequestEvent as E;
        use RequestState as S;

        let next = match (self.state, event) {
            (S::Received, E::Compile) => Some(S::Compiled),
            (S::Compiled, E::QueryModel) => Some(S::ModelQueried),
            (S::ModelQueried, E::Parse) => Some(S::Parsed),
            (S::Parsed, E::Skip) => Some(S::NoAction),
            (S::Parsed, E::Dispatch) => Some(S::Dispatching),
            (S::Dispatching, E::Complete) => Some(S::Completed),
            (state, E::Fail) if !state.is_terminal() => Some(S::Failed),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(RequestLifecycleError::InvalidTransition {
                request_id: self.request_id,
                from: self.state,
                event,
            });
        };

        debug!(
            request_id = %self.request_id,
            ?self.state,
            ?next_state,
            ?event,
            "request transition"
        );
        self.state = next_state;
        Ok(next_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> RequestLifecycle {
        RequestLifecycle::new(RequestId::random())
    }

    #[test]
    fn walks_the_dispatch_path() {
        let mut request = lifecycle();
        for (event, expected) in [
            (RequestEvent::Compile, RequestState::Compiled),
            (RequestEvent::QueryModel, RequestState::ModelQueried),
            (RequestEvent::Parse, RequestState::Parsed),
            (RequestEvent::Dispatch, RequestState::Dispatching),
            (RequestEvent::Complete, RequestState::Completed),
        ] {
            assert_eq!(request.transition(event).unwrap(), expected);
        }
        assert!(request.state().is_terminal());
    }

    #[test]
    fn skip_ends_in_no_action() {
        let mut request = lifecycle();
        request.transition(RequestEvent::Compile).unwrap();
        request.transition(RequestEvent::QueryModel).unwrap();
        request.transition(RequestEvent::Parse).unwrap();
        assert_eq!(
            request.transition(RequestEvent::Skip).unwrap(),
            RequestState::NoAction
        );
        assert!(request.transition(RequestEvent::Fail).is_err());
    }

    #[test]
    fn stages_cannot_be_skipped_or_repeated() {
        let mut request = lifecycle();
        assert!(request.transition(RequestEvent::Parse).is_err());
        request.transition(RequestEvent::Compile).unwrap();
        assert!(request.transition(RequestEvent::Compile).is_err());
        assert_eq!(request.state(), RequestState::Compiled);
    }

    #[test]
    fn failure_is_final() {
        let mut request = lifecycle();
        request.transition(RequestEvent::Compile).unwrap();
        assert_eq!(
            request.transition(RequestEvent::Fail).unwrap(),
            RequestState::Failed
        );
        let err = request.transition(RequestEvent::QueryModel).unwrap_err();
        assert!(matches!(
            err,
            RequestLifecycleError::InvalidTransition {
                from: RequestState::Failed,
                ..
            }
        ));
        assert!(request.transition(RequestEvent::Fail).is_err());
    }
}
