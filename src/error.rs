//! Error types for task orchestration.
//!
//! [`TaskError`] distinguishes usage faults (programming errors in the
//! embedding application, never recovered from silently) from runtime
//! conditions such as a task body failing or an entry being disposed while
//! a modal wait was parked.

use thiserror::Error;

use crate::state::TaskState;

/// Errors produced by the task registry, owner stack, and modal bridge.
#[derive(Debug, Error)]
pub enum TaskError {
    /// `attach` was called for a name that was never reserved.
    #[error("task not reserved: {name}")]
    NotReserved {
        /// The task name that was missing from the registry.
        name: String,
    },

    /// A handle is already attached under this name (duplicate concurrent
    /// execution).
    #[error("task already running: {name}")]
    AlreadyRunning {
        /// The task name with a live handle.
        name: String,
    },

    /// A present-and-wait call came from a handle that is not the one
    /// attached under its name (stale or superseded handle).
    #[error("task is not attached: {name}")]
    NotAttached {
        /// The name the stale handle claimed.
        name: String,
    },

    /// A second modal wait was requested while one is already parked.
    #[error("a modal wait is already parked for task {name}")]
    AlreadyParked {
        /// The task whose parking slot was occupied.
        name: String,
    },

    /// `resume` found no parked continuation (double resume, or a resume
    /// racing a dispose).
    #[error("no parked continuation to resume for task {name}")]
    StaleResume {
        /// The task that had nothing parked.
        name: String,
    },

    /// A handle's single-shot body was already consumed by an earlier fire.
    #[error("task body already consumed: {name}")]
    AlreadyFired {
        /// The task whose handle was fired twice.
        name: String,
    },

    /// Rejected state machine transition.
    #[error("invalid transition from {from} to {to} for task {name}")]
    InvalidTransition {
        /// The task being transitioned.
        name: String,
        /// The current state.
        from: TaskState,
        /// The rejected target state.
        to: TaskState,
    },

    /// The task body returned an error or panicked. The underlying cause is
    /// logged at the fire boundary; callers only observe the failure.
    #[error("task failed: {name}")]
    TaskFailed {
        /// The failed task.
        name: String,
    },

    /// The task's entry was disposed while a modal wait was parked; the
    /// pending wait resolves to this instead of staying stranded.
    #[error("task disposed while waiting: {name}")]
    Disposed {
        /// The disposed task.
        name: String,
    },

    /// A view-state value exceeded the configured per-value size limit.
    #[error("state value for key {key:?} is {actual} bytes, exceeding the {limit} byte limit")]
    StateValueTooLarge {
        /// The offending store key.
        key: String,
        /// The configured limit in bytes.
        limit: usize,
        /// The serialized size of the rejected value.
        actual: usize,
    },
}

impl TaskError {
    /// Returns `true` for faults that indicate a programming error in the
    /// embedding application rather than a runtime condition.
    ///
    /// # Examples
    ///
    /// ```
    /// use taskbridge::TaskError;
    ///
    /// let err = TaskError::AlreadyRunning { name: "sync".into() };
    /// assert!(err.is_usage_fault());
    ///
    /// let err = TaskError::TaskFailed { name: "sync".into() };
    /// assert!(!err.is_usage_fault());
    /// ```
    pub fn is_usage_fault(&self) -> bool {
        matches!(
            self,
            Self::NotReserved { .. }
                | Self::AlreadyRunning { .. }
                | Self::NotAttached { .. }
                | Self::AlreadyParked { .. }
                | Self::StaleResume { .. }
                | Self::AlreadyFired { .. }
                | Self::InvalidTransition { .. }
        )
    }
}
