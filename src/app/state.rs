// ABOUTME: Lifecycle states of an interactive assistant session
// Encodes which transitions are legal so the session driver cannot skip a step

use crate::utils::error::{ExamError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Assistant and thread exist remotely
    Created,
    AwaitingInput,
    /// User message appended and run started
    Dispatched,
    Polling,
    Displaying,
    Terminated,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Created, AwaitingInput)
                | (AwaitingInput, Dispatched)
                | (AwaitingInput, Terminated)
                | (Dispatched, Polling)
                | (Polling, Displaying)
                | (Displaying, AwaitingInput)
                | (Displaying, Terminated)
                // A failed turn returns control to the prompt
                | (Dispatched, AwaitingInput)
                | (Polling, AwaitingInput)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(ExamError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self, to = %next, "session transition");
        *self = next;
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::AwaitingInput => "awaiting-input",
            SessionState::Dispatched => "dispatched",
            SessionState::Polling => "polling",
            SessionState::Displaying => "displaying",
            SessionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns true for the words that end an interactive session
pub fn is_exit_command(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_cycle() {
        let mut state = SessionState::Created;
        for next in [
            SessionState::AwaitingInput,
            SessionState::Dispatched,
            SessionState::Polling,
            SessionState::Displaying,
            SessionState::AwaitingInput,
            SessionState::Terminated,
        ] {
            state.advance(next).unwrap();
        }
        assert_eq!(state, SessionState::Terminated);
    }

    #[test]
    fn test_cannot_skip_polling() {
        let mut state = SessionState::Dispatched;
        let err = state.advance(SessionState::Displaying).unwrap_err();
        assert!(matches!(err, ExamError::InvalidTransition { .. }));
        assert_eq!(state, SessionState::Dispatched);
    }

    #[test]
    fn test_terminated_is_final() {
        let mut state = SessionState::Terminated;
        assert!(state.advance(SessionState::AwaitingInput).is_err());
        assert!(state.advance(SessionState::Dispatched).is_err());
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command("  Quit \n"));
        assert!(!is_exit_command("quit now"));
        assert!(!is_exit_command(""));
    }
}
