//! Task execution state machine.
//!
//! A task entry progresses through a small state machine:
//!
//! ```text
//! Initial -> Running
//! Running -> Completed | Failed
//! Completed -> Running   (a later run re-attaches under the same name)
//! Failed -> Running
//! ```
//!
//! `Completed` and `Failed` are terminal for one execution; the entry itself
//! survives detach so that late observers can still read the outcome, and a
//! subsequent attach restarts the machine at `Running`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskError;

/// Lifecycle state of a task entry.
///
/// # Examples
///
/// ```
/// use taskbridge::TaskState;
///
/// let state = TaskState::Running;
/// assert!(!state.is_terminal());
/// assert!(state.can_transition_to(TaskState::Completed));
/// assert!(!state.can_transition_to(TaskState::Running)); // self-transition rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Reserved but never executed.
    Initial,
    /// A handle is attached and the body is executing.
    Running,
    /// The last execution finished successfully (terminal).
    Completed,
    /// The last execution faulted (terminal).
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskState {
    /// Returns `true` if the last execution has finished (`Completed` or
    /// `Failed`).
    ///
    /// # Examples
    ///
    /// ```
    /// use taskbridge::TaskState;
    ///
    /// assert!(!TaskState::Initial.is_terminal());
    /// assert!(!TaskState::Running.is_terminal());
    /// assert!(TaskState::Completed.is_terminal());
    /// assert!(TaskState::Failed.is_terminal());
    /// ```
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if transitioning to `next` is valid.
    ///
    /// Terminal states accept only `Running` (re-attach of a new run under
    /// the same name). Self-transitions are rejected.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return false;
        }
        match self {
            Self::Initial => matches!(next, Self::Running),
            Self::Running => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => matches!(next, Self::Running),
        }
    }

    /// Validates a transition to `next`, with the task name for context.
    pub fn validate_transition(self, name: &str, next: Self) -> Result<(), TaskError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                name: name.to_string(),
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        assert_eq!(TaskState::Initial.to_string(), "initial");
        assert_eq!(TaskState::Running.to_string(), "running");
        assert_eq!(TaskState::Completed.to_string(), "completed");
        assert_eq!(TaskState::Failed.to_string(), "failed");

        for state in [
            TaskState::Initial,
            TaskState::Running,
            TaskState::Completed,
            TaskState::Failed,
        ] {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, state.to_string());
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Initial.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn initial_only_starts() {
        assert!(TaskState::Initial.can_transition_to(TaskState::Running));
        assert!(!TaskState::Initial.can_transition_to(TaskState::Completed));
        assert!(!TaskState::Initial.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Initial.can_transition_to(TaskState::Initial));
    }

    #[test]
    fn running_reaches_both_terminals() {
        assert!(TaskState::Running.can_transition_to(TaskState::Completed));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Running.can_transition_to(TaskState::Initial));
        assert!(!TaskState::Running.can_transition_to(TaskState::Running));
    }

    #[test]
    fn terminal_states_allow_only_reattach() {
        for terminal in [TaskState::Completed, TaskState::Failed] {
            assert!(terminal.can_transition_to(TaskState::Running));
            assert!(!terminal.can_transition_to(TaskState::Initial));
            assert!(!terminal.can_transition_to(terminal));
        }
        assert!(!TaskState::Completed.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Completed));
    }

    #[test]
    fn validate_transition_carries_context() {
        let err = TaskState::Completed
            .validate_transition("upload", TaskState::Failed)
            .unwrap_err();
        assert!(err.to_string().contains("upload"));
        assert!(err.to_string().contains("completed"));
    }
}
