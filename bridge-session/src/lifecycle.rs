//! Lifecycle state machine for provider sessions.

use bridge_primitives::SessionId;
use thiserror::Error;
use tracing::debug;

/// States a session can occupy during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport exists but no handshake has happened yet.
    Created,
    /// Handshake complete; capabilities may be listed.
    Initialized,
    /// At least one invocation has been issued.
    Active,
    /// Transport released; no further operations are valid.
    Closed,
}

impl SessionState {
    /// Returns `true` when list and invoke operations are permitted.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Initialized | Self::Active)
    }

    /// Returns `true` once the session has been closed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Events that trigger session transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Protocol handshake completed.
    Handshake,
    /// An invocation is about to be issued.
    Activate,
    /// Transport released.
    Close,
}

/// Session state manager.
#[derive(Debug, Clone, Copy)]
pub struct SessionLifecycle {
    session_id: SessionId,
    state: SessionState,
}

impl SessionLifecycle {
    /// Constructs a lifecycle controller for the given session.
    #[must_use]
    pub const fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: SessionState::Created,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: SessionEvent) -> Result<SessionState, LifecycleError> {
        let next = match (self.state, event) {
            (SessionState::Created, SessionEvent::Handshake) => Some(SessionState::Initialized),
            (SessionState::Initialized | SessionState::Active, SessionEvent::Activate) => {
                Some(SessionState::Active)
            }
            (_, SessionEvent::Close) => Some(SessionState::Closed),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                session_id: self.session_id,
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(
                session_id = %self.session_id,
                ?self.state,
                ?next_state,
                ?event,
                "session lifecycle transition"
            );
            self.state = next_state;
        }

        Ok(self.state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid session transition from {from:?} via {event:?} for session {session_id}")]
    InvalidTransition {
        /// Session whose transition failed.
        session_id: SessionId,
        /// State prior to the attempted transition.
        from: SessionState,
        /// Event that triggered the failure.
        event: SessionEvent,
    },
}
