//! Session lifecycle state machine with thread-safe transitions.
//!
//! - Idle -> Connecting (start requested)
//! - Connecting -> Running (room joined)
//! - Connecting -> Closed (room join failed)
//! - Running -> Closed (room disconnected or job stopped)
//!
//! Closed is terminal: a job's session is never restarted or rebound.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::SessionError;

/// Lifecycle state of the one session a job may host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Running,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionState {
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Connecting)
                | (SessionState::Connecting, SessionState::Running)
                | (SessionState::Connecting, SessionState::Closed)
                | (SessionState::Running, SessionState::Closed)
        )
    }
}

/// Shared state machine. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: Arc<Mutex<SessionState>>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempt to transition to `target`, rejecting invalid moves.
    pub fn transition(&self, target: SessionState) -> Result<(), SessionError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(SessionError::Room(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }
}
