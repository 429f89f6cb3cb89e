//! Modal presentation contract and outcome types.
//!
//! The core never renders anything. It hands a live owner and a tag to a
//! [`ModalPresenter`] supplied by the embedding UI layer, which launches the
//! actual prompt. The presenter (or the prompt it created) must report a
//! terminal outcome exactly once by calling
//! [`TaskManager::resume_task`](crate::TaskManager::resume_task) with the
//! task name it was given.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::owner::OwnerRef;

/// Terminal status of a modal interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalStatus {
    /// The affirmative action (OK, confirm, done).
    Positive,
    /// The dismissive action (no, reject).
    Negative,
    /// A third, neither-affirming-nor-dismissing action.
    Neutral,
    /// The interaction was abandoned (back, tap-outside, close).
    Cancelled,
}

impl ModalStatus {
    /// Returns `true` for [`ModalStatus::Positive`].
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Positive)
    }
}

/// The single terminal outcome a modal produces.
///
/// # Examples
///
/// ```
/// use taskbridge::{ModalOutcome, ModalStatus};
/// use serde_json::json;
///
/// let outcome = ModalOutcome::positive(Some(json!({"choice": "overwrite"})));
/// assert!(outcome.is_positive());
/// assert_eq!(outcome.payload.unwrap()["choice"], "overwrite");
///
/// let outcome = ModalOutcome::cancelled();
/// assert_eq!(outcome.status, ModalStatus::Cancelled);
/// assert!(outcome.payload.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalOutcome {
    /// How the modal was closed.
    pub status: ModalStatus,
    /// Optional result payload (selected item, entered text, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ModalOutcome {
    /// An affirmative outcome with an optional payload.
    pub fn positive(payload: Option<Value>) -> Self {
        Self {
            status: ModalStatus::Positive,
            payload,
        }
    }

    /// A dismissive outcome.
    pub fn negative() -> Self {
        Self {
            status: ModalStatus::Negative,
            payload: None,
        }
    }

    /// A cancelled outcome.
    pub fn cancelled() -> Self {
        Self {
            status: ModalStatus::Cancelled,
            payload: None,
        }
    }

    /// Returns `true` if the modal closed on its affirmative action.
    pub fn is_positive(&self) -> bool {
        self.status.is_positive()
    }
}

/// Launches a modal on a live owner.
///
/// Implementations construct their prompt bound to `owner` and `task`, show
/// it under `tag`, and return immediately. The prompt must later report its
/// terminal outcome exactly once via
/// [`TaskManager::resume_task`](crate::TaskManager::resume_task) using the
/// same `task` name -- that call is what un-parks the waiting task body.
///
/// The presenter must tolerate its host being destroyed and recreated
/// between `present` and the outcome report; the task name, not the owner,
/// identifies where the outcome goes.
pub trait ModalPresenter: Send + Sync {
    /// Present a modal on `owner` under `tag`, bound to the task `task`.
    fn present(&self, owner: &OwnerRef, tag: &str, task: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ModalStatus::Positive).unwrap(),
            "positive"
        );
        assert_eq!(
            serde_json::to_value(ModalStatus::Cancelled).unwrap(),
            "cancelled"
        );
    }

    #[test]
    fn outcome_round_trip() {
        let outcome = ModalOutcome::positive(Some(json!({"value": 7})));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "positive");
        assert_eq!(json["payload"]["value"], 7);

        let back: ModalOutcome = serde_json::from_value(json).unwrap();
        assert!(back.is_positive());
        assert_eq!(back.payload.unwrap()["value"], 7);
    }

    #[test]
    fn payload_omitted_when_absent() {
        let json = serde_json::to_value(ModalOutcome::negative()).unwrap();
        assert!(json.get("payload").is_none());
        assert_eq!(json["status"], "negative");
    }
}
