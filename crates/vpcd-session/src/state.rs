use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

/// Lifecycle of a session.
///
/// Transitions only move forward, except that a listening session moves
/// between `Listening` and `Connected` once per attached client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Listening,
    Connected,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::Listening | SessionState::Connected => 2,
            SessionState::Closing => 3,
            SessionState::Closed => 4,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        next.rank() > self.rank()
            || matches!(
                (self, next),
                (SessionState::Listening, SessionState::Connected)
                    | (SessionState::Connected, SessionState::Listening)
            )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of a session's state, readable from other threads.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl StateHandle {
    /// Current state.
    pub fn get(&self) -> SessionState {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`. Illegal transitions are ignored and reported as `false`.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == next {
            return true;
        }
        if !state.can_transition_to(next) {
            debug!(from = %*state, to = %next, "ignored illegal session state transition");
            return false;
        }
        debug!(from = %*state, to = %next, "session state");
        *state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_legal() {
        assert!(SessionState::Idle.can_transition_to(SessionState::Connecting));
        assert!(SessionState::Connecting.can_transition_to(SessionState::Connected));
        assert!(SessionState::Connecting.can_transition_to(SessionState::Listening));
        assert!(SessionState::Connected.can_transition_to(SessionState::Closing));
        assert!(SessionState::Closing.can_transition_to(SessionState::Closed));
        assert!(SessionState::Idle.can_transition_to(SessionState::Closing));
    }

    #[test]
    fn listening_and_connected_cycle() {
        assert!(SessionState::Listening.can_transition_to(SessionState::Connected));
        assert!(SessionState::Connected.can_transition_to(SessionState::Listening));
    }

    #[test]
    fn backward_transitions_are_illegal() {
        assert!(!SessionState::Closed.can_transition_to(SessionState::Idle));
        assert!(!SessionState::Connected.can_transition_to(SessionState::Connecting));
        assert!(!SessionState::Closing.can_transition_to(SessionState::Connected));
    }

    #[test]
    fn handle_rejects_illegal_moves() {
        let handle = StateHandle::default();
        assert_eq!(handle.get(), SessionState::Idle);

        assert!(handle.advance(SessionState::Connecting));
        assert!(handle.advance(SessionState::Closed));
        assert!(!handle.advance(SessionState::Connected));
        assert_eq!(handle.get(), SessionState::Closed);
    }
}
