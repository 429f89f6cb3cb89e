//! Task orchestration that outlives UI host churn.
//!
//! Long-running workflows ("tasks") must survive the short, unpredictable
//! lifetime of the UI containers that display their prompts: a screen can
//! be destroyed and recreated at any moment, and a task waiting on a
//! confirmation prompt must be neither aborted nor duplicated when that
//! happens. This crate provides the coordination core that makes that
//! work:
//!
//! - a process-wide **task registry** with an observable state machine
//!   (`Initial -> Running -> Completed | Failed`) whose entries -- and their
//!   results -- outlive the executions that produced them,
//! - an **owner stack** tracking the frontmost UI container, with a
//!   ticketed mutual-exclusion gate so one interaction sequence keeps a
//!   consistent owner across container recreations,
//! - a **suspend/resume bridge** that lets task code present a modal and
//!   await its outcome as an ordinary async call, parked on a one-shot
//!   continuation that the UI resumes by task name.
//!
//! Rendering, layout, and persistence are deliberately out of scope; the
//! crate only defines the concurrency and ownership contract they plug
//! into.
//!
//! # Example
//!
//! ```
//! use std::any::Any;
//! use std::sync::Arc;
//! use serde_json::json;
//! use taskbridge::{
//!     ModalOutcome, ModalPresenter, OwnerRef, Task, TaskManager, UiOwner,
//! };
//!
//! // The embedder's UI container.
//! struct Screen;
//! impl UiOwner for Screen {
//!     fn is_alive(&self) -> bool {
//!         true
//!     }
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! // A presenter that "answers" immediately; a real one launches UI and
//! // reports the outcome later.
//! struct AutoConfirm(Arc<TaskManager>);
//! impl ModalPresenter for AutoConfirm {
//!     fn present(&self, _owner: &OwnerRef, _tag: &str, task: &str) {
//!         let manager = self.0.clone();
//!         let task = task.to_string();
//!         tokio::spawn(async move {
//!             manager
//!                 .resume_task(&task, ModalOutcome::positive(None))
//!                 .unwrap();
//!         });
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = Arc::new(TaskManager::new());
//! let screen: Arc<dyn UiOwner> = Arc::new(Screen);
//! manager.register_owner(&screen);
//!
//! let presenter = AutoConfirm(manager.clone());
//! let result = Task::await_result(&manager, "confirm-overwrite", move |task| async move {
//!     let outcome = task.show_modal("confirm", &presenter).await?;
//!     Ok(json!(outcome.is_positive()))
//! })
//! .await
//! .unwrap();
//!
//! assert_eq!(result, json!(true));
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`manager`] - The shared service object wiring everything together
//! - [`registry`] - Task table snapshots ([`TaskInfo`])
//! - [`state`] - The task state machine
//! - [`task`] - Task handles, builders, and the present-and-wait bridge
//! - [`stack`] - Owner stack and ticketed exclusion
//! - [`owner`] - The owner contract and weak bindings
//! - [`modal`] - The modal presenter contract and outcomes
//! - [`context`] - Per-task scope and view-state store
//! - [`error`] - Error taxonomy

pub mod context;
pub mod error;
pub mod manager;
pub mod modal;
pub mod owner;
pub mod registry;
pub mod stack;
pub mod state;
pub mod task;

pub use context::{StateStore, TaskContext};
pub use error::TaskError;
pub use manager::TaskManager;
pub use modal::{ModalOutcome, ModalPresenter, ModalStatus};
pub use owner::{OwnerId, OwnerRef, UiOwner};
pub use registry::TaskInfo;
pub use stack::{OwnerStack, Ticket};
pub use state::TaskState;
pub use task::{Task, TaskBuilder, TaskHandle};
