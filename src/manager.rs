//! The task manager: the one shared service object embedders hold.
//!
//! Wires together the registry (name -> entry table), the owner stack, and
//! the supervisor scope task bodies run on. Created explicitly and passed
//! around by `Arc` -- never reached through ambient global state -- and torn
//! down with [`close`](TaskManager::close).
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use taskbridge::{Task, TaskManager, TaskState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = Arc::new(TaskManager::new());
//!
//! let result = Task::await_result(&manager, "greet", |_task| async move {
//!     Ok(json!("hello"))
//! })
//! .await
//! .unwrap();
//!
//! assert_eq!(result, json!("hello"));
//! assert_eq!(manager.task_of("greet").unwrap().state, TaskState::Completed);
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::context::StateStore;
use crate::error::TaskError;
use crate::modal::ModalOutcome;
use crate::owner::{OwnerId, UiOwner};
use crate::registry::{TaskInfo, TaskRegistry};
use crate::stack::OwnerStack;
use crate::state::TaskState;
use crate::task::TaskHandle;

/// Shared orchestration service: task registry, owner stack, and the
/// supervisor scope all task bodies run on.
pub struct TaskManager {
    registry: TaskRegistry,
    owners: OwnerStack,
    tracker: TaskTracker,
    cancel: CancellationToken,
    state_value_limit: Option<usize>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    /// Creates a manager with default configuration.
    pub fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            owners: OwnerStack::new(),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            state_value_limit: None,
        }
    }

    /// Caps each view-state value at `limit` serialized bytes.
    pub fn with_state_value_limit(mut self, limit: usize) -> Self {
        self.state_value_limit = Some(limit);
        self
    }

    // --- Registry surface ---

    /// Ensures an entry exists for `name`. Idempotent; never fails.
    pub fn reserve(&self, name: &str) -> TaskInfo {
        self.registry.reserve(name)
    }

    /// Attaches a running handle under its name.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotReserved`] if `reserve` was skipped,
    /// [`TaskError::AlreadyRunning`] on duplicate concurrent execution.
    pub fn attach(&self, handle: &Arc<TaskHandle>) -> Result<(), TaskError> {
        self.registry.attach(handle)
    }

    /// Records the handle's result and terminal state and clears the
    /// running handle. The entry stays queryable until [`dispose`].
    ///
    /// [`dispose`]: Self::dispose
    pub fn detach(&self, handle: &Arc<TaskHandle>, succeeded: bool) {
        self.registry.detach(handle, succeeded);
    }

    /// Removes the entry for `name` -- the only true deletion path.
    ///
    /// Observers registered by `observer_owner` are dropped, and a handle
    /// still attached is closed: its private scope is cancelled and a
    /// parked modal wait resolves to [`TaskError::Disposed`].
    pub fn dispose(&self, name: &str, observer_owner: Option<OwnerId>) {
        if let Some(handle) = self.registry.dispose(name, observer_owner) {
            handle.close();
        }
    }

    /// Read-only snapshot; `None` if never reserved or already disposed.
    pub fn task_of(&self, name: &str) -> Option<TaskInfo> {
        self.registry.task_of(name)
    }

    /// Whether a handle is currently attached under `name`.
    pub fn is_running(&self, name: &str) -> bool {
        self.registry.is_running(name)
    }

    /// Async observation of the entry's state changes; `None` if the entry
    /// does not exist.
    pub fn watch_state(&self, name: &str) -> Option<watch::Receiver<TaskState>> {
        self.registry.watch_state(name)
    }

    /// Registers a synchronous state observer keyed by the registering UI
    /// container; it fires immediately with the current state and is
    /// dropped automatically when that container is unregistered.
    pub fn observe(
        &self,
        name: &str,
        owner: OwnerId,
        notify: impl Fn(TaskState) + Send + Sync + 'static,
    ) {
        self.registry.observe(name, owner, notify);
    }

    /// The running task's view-state store, while one is attached.
    pub fn state_store_of(&self, name: &str) -> Option<StateStore> {
        self.registry
            .handle_of(name)
            .map(|handle| handle.context().store())
    }

    // --- Owner surface ---

    /// Registers a UI container as the new frontmost owner.
    ///
    /// Call on every foreground transition; re-registering a known
    /// container just moves it to the top.
    pub fn register_owner(&self, owner: &Arc<dyn UiOwner>) -> OwnerId {
        self.owners.push(owner)
    }

    /// Signals the end of a container's lifecycle: its binding is disposed
    /// and every observer it registered is dropped.
    pub fn unregister_owner(&self, id: OwnerId) {
        self.owners.remove(id);
        self.registry.remove_observers_for(id);
    }

    /// The owner stack, for direct ticketed access.
    pub fn owners(&self) -> &OwnerStack {
        &self.owners
    }

    // --- Modal bridge ---

    /// Delivers a modal's terminal outcome to the task parked under `name`.
    ///
    /// This is the callback the UI layer invokes when a prompt finishes;
    /// it survives owner recreation because only the task name routes it.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotAttached`] if no execution is in flight under
    /// `name`; [`TaskError::StaleResume`] if nothing is parked (double
    /// resume, or a resume racing a dispose).
    pub fn resume_task(&self, name: &str, outcome: ModalOutcome) -> Result<(), TaskError> {
        let handle = self
            .registry
            .handle_of(name)
            .ok_or_else(|| TaskError::NotAttached {
                name: name.to_string(),
            })?;
        handle.resume(outcome)
    }

    // --- Execution plumbing ---

    /// Reserve + attach for a firing handle, waiting out a previous run of
    /// the same name when the handle allows sequential execution.
    pub(crate) async fn begin(&self, handle: &Arc<TaskHandle>) -> Result<(), TaskError> {
        let name = handle.name();
        self.registry.reserve(name);
        loop {
            match self.registry.attach(handle) {
                Ok(()) => return Ok(()),
                Err(TaskError::AlreadyRunning { .. }) if handle.allow_sequential() => {
                    debug!(task = name, "waiting for previous run to finish");
                    if let Some(mut rx) = self.registry.watch_state(name) {
                        // An Err means the entry was disposed mid-wait; fall
                        // through and re-reserve.
                        let _ = rx
                            .wait_for(|state| *state != TaskState::Running)
                            .await;
                    }
                    self.registry.reserve(name);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn spawn_supervised<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(fut)
    }

    pub(crate) fn handle_of(&self, name: &str) -> Option<Arc<TaskHandle>> {
        self.registry.handle_of(name)
    }

    pub(crate) fn root_cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn state_value_limit(&self) -> Option<usize> {
        self.state_value_limit
    }

    // --- Lifecycle ---

    /// Disposes every entry, closes still-attached handles, and cancels the
    /// supervisor scope. Normally only needed in tests and at shutdown.
    pub fn close(&self) {
        info!("task manager closing");
        for handle in self.registry.close() {
            handle.close();
        }
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Awaits completion of everything spawned on the supervisor scope.
    /// Only resolves after [`close`](Self::close).
    pub async fn wait_idle(&self) {
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBuilder;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reserve_is_idempotent() {
        let manager = TaskManager::new();
        let first = manager.reserve("t");
        let second = manager.reserve("t");
        assert_eq!(first.state, TaskState::Initial);
        assert_eq!(second.state, TaskState::Initial);
        assert!(!second.running);
    }

    #[test]
    fn task_of_unknown_is_none() {
        let manager = TaskManager::new();
        assert!(manager.task_of("nope").is_none());
        assert!(!manager.is_running("nope"));
    }

    #[tokio::test]
    async fn attach_requires_reserve() {
        let manager = Arc::new(TaskManager::new());
        let handle = TaskBuilder::new()
            .name("skip")
            .build(&manager, |_| async { Ok(json!(null)) });
        let err = manager.attach(&handle).unwrap_err();
        assert!(matches!(err, TaskError::NotReserved { .. }));
    }

    #[tokio::test]
    async fn observer_fires_with_current_state_and_dies_with_owner() {
        let manager = Arc::new(TaskManager::new());
        manager.reserve("t");

        let seen = Arc::new(AtomicUsize::new(0));
        let owner = OwnerId(99);
        {
            let seen = seen.clone();
            manager.observe("t", owner, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }
        // Fired once immediately with the current state.
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        manager.unregister_owner(owner);

        let handle = TaskBuilder::new()
            .name("t")
            .build(&manager, |_| async { Ok(json!(null)) });
        handle.fire_async().await.unwrap();
        // No further notifications after the owner was unregistered.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resume_without_running_task_is_not_attached() {
        let manager = TaskManager::new();
        manager.reserve("t");
        let err = manager
            .resume_task("t", ModalOutcome::cancelled())
            .unwrap_err();
        assert!(matches!(err, TaskError::NotAttached { .. }));
    }

    #[tokio::test]
    async fn close_drains_supervisor_scope() {
        let manager = Arc::new(TaskManager::new());
        let handle = TaskBuilder::new()
            .name("t")
            .build(&manager, |_| async { Ok(json!(null)) });
        handle.fire_async().await.unwrap();
        manager.close();
        manager.wait_idle().await;
        assert!(manager.task_of("t").is_none());
    }
}
