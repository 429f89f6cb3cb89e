//! Property tests for the task state machine.

use proptest::prelude::*;
use taskbridge::TaskState;

fn any_state() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Initial),
        Just(TaskState::Running),
        Just(TaskState::Completed),
        Just(TaskState::Failed),
    ]
}

proptest! {
    /// Self-transitions are always rejected.
    #[test]
    fn self_transitions_rejected(state in any_state()) {
        prop_assert!(!state.can_transition_to(state));
    }

    /// A terminal state can only be left by re-attaching a new run.
    #[test]
    fn terminal_states_only_restart(state in any_state(), next in any_state()) {
        if state.is_terminal() && state.can_transition_to(next) {
            prop_assert_eq!(next, TaskState::Running);
        }
    }

    /// `validate_transition` agrees with `can_transition_to` and carries
    /// the task name on rejection.
    #[test]
    fn validate_agrees_with_can(state in any_state(), next in any_state()) {
        let validated = state.validate_transition("prop-task", next);
        prop_assert_eq!(state.can_transition_to(next), validated.is_ok());
        if let Err(err) = validated {
            prop_assert!(err.to_string().contains("prop-task"));
        }
    }

    /// Serde round trip is lossless.
    #[test]
    fn serde_round_trip(state in any_state()) {
        let json = serde_json::to_value(state).unwrap();
        let back: TaskState = serde_json::from_value(json).unwrap();
        prop_assert_eq!(state, back);
    }

    /// Every state reaches a terminal state within two hops, so no entry
    /// can get stuck mid-machine.
    #[test]
    fn terminal_always_reachable(state in any_state()) {
        let one_hop = state.is_terminal()
            || state.can_transition_to(TaskState::Completed)
            || state.can_transition_to(TaskState::Failed);
        let two_hops = state.can_transition_to(TaskState::Running)
            && TaskState::Running.can_transition_to(TaskState::Failed);
        prop_assert!(one_hop || two_hops);
    }
}
