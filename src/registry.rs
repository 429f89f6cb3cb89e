//! Process-wide task table.
//!
//! Maps task name to its entry: observable state, the currently attached
//! handle (if an execution is in flight), and the last produced result.
//! Entries are created by `reserve` and removed only by explicit `dispose`;
//! detach deliberately leaves the state and result behind so a UI container
//! recreated after completion can still learn the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::owner::OwnerId;
use crate::state::TaskState;
use crate::task::TaskHandle;

/// Read-only snapshot of a task entry.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// The task's registry key.
    pub name: String,
    /// State at the time of the snapshot.
    pub state: TaskState,
    /// Last produced result, retained across detach until dispose.
    pub result: Option<Value>,
    /// Whether a handle is currently attached.
    pub running: bool,
}

type ObserverFn = Arc<dyn Fn(TaskState) + Send + Sync>;

struct StateObserver {
    owner: OwnerId,
    notify: ObserverFn,
}

struct TaskEntry {
    state: TaskState,
    state_tx: watch::Sender<TaskState>,
    task: Option<Arc<TaskHandle>>,
    result: Option<Value>,
    observers: Vec<StateObserver>,
}

impl TaskEntry {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(TaskState::Initial);
        Self {
            state: TaskState::Initial,
            state_tx,
            task: None,
            result: None,
            observers: Vec::new(),
        }
    }

    fn info(&self, name: &str) -> TaskInfo {
        TaskInfo {
            name: name.to_string(),
            state: self.state,
            result: self.result.clone(),
            running: self.task.is_some(),
        }
    }

    fn observer_snapshot(&self) -> Vec<ObserverFn> {
        self.observers.iter().map(|o| o.notify.clone()).collect()
    }
}

/// The name -> entry table. All mutation happens under one short critical
/// section; observer callbacks run after the lock is released.
pub(crate) struct TaskRegistry {
    table: Mutex<HashMap<String, TaskEntry>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Ensures an entry exists for `name`, creating one in `Initial` if
    /// absent. Idempotent.
    pub(crate) fn reserve(&self, name: &str) -> TaskInfo {
        let mut table = self.table.lock();
        table
            .entry(name.to_string())
            .or_insert_with(TaskEntry::new)
            .info(name)
    }

    /// Records `handle` as the running execution for its name and flips the
    /// entry to `Running`.
    pub(crate) fn attach(&self, handle: &Arc<TaskHandle>) -> Result<(), TaskError> {
        let name = handle.name();
        let (state_tx, observers) = {
            let mut table = self.table.lock();
            let entry = table.get_mut(name).ok_or_else(|| TaskError::NotReserved {
                name: name.to_string(),
            })?;
            if entry.task.is_some() {
                return Err(TaskError::AlreadyRunning {
                    name: name.to_string(),
                });
            }
            entry.state.validate_transition(name, TaskState::Running)?;
            entry.state = TaskState::Running;
            entry.task = Some(handle.clone());
            (entry.state_tx.clone(), entry.observer_snapshot())
        };
        debug!(task = name, "attached");
        for notify in observers {
            notify(TaskState::Running);
        }
        state_tx.send_replace(TaskState::Running);
        Ok(())
    }

    /// Records the handle's result, flips the entry to its terminal state,
    /// and clears the running handle. The entry stays queryable.
    ///
    /// A no-op if the entry was disposed in the meantime.
    pub(crate) fn detach(&self, handle: &Arc<TaskHandle>, succeeded: bool) {
        let name = handle.name();
        let next = if succeeded {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        let Some((state_tx, observers)) = ({
            let mut table = self.table.lock();
            table.get_mut(name).map(|entry| {
                entry.result = handle.result();
                entry.state = next;
                entry.task = None;
                (entry.state_tx.clone(), entry.observer_snapshot())
            })
        }) else {
            debug!(task = name, "detach on disposed entry ignored");
            return;
        };
        debug!(task = name, state = %next, "detached");
        for notify in observers {
            notify(next);
        }
        state_tx.send_replace(next);
    }

    /// Removes the entry. Returns the handle that was still attached, if
    /// any, for the caller to close outside the table lock.
    pub(crate) fn dispose(
        &self,
        name: &str,
        observer_owner: Option<OwnerId>,
    ) -> Option<Arc<TaskHandle>> {
        let mut table = self.table.lock();
        let mut entry = table.remove(name)?;
        if let Some(owner) = observer_owner {
            entry.observers.retain(|o| o.owner != owner);
        }
        debug!(task = name, "disposed");
        entry.task.take()
    }

    /// Read-only snapshot; `None` if never reserved or already disposed.
    pub(crate) fn task_of(&self, name: &str) -> Option<TaskInfo> {
        self.table.lock().get(name).map(|entry| entry.info(name))
    }

    /// The attached handle, if an execution is in flight.
    pub(crate) fn handle_of(&self, name: &str) -> Option<Arc<TaskHandle>> {
        self.table.lock().get(name).and_then(|e| e.task.clone())
    }

    pub(crate) fn is_running(&self, name: &str) -> bool {
        self.table
            .lock()
            .get(name)
            .is_some_and(|e| e.task.is_some())
    }

    /// Async observation of the entry's state changes.
    pub(crate) fn watch_state(&self, name: &str) -> Option<watch::Receiver<TaskState>> {
        self.table
            .lock()
            .get(name)
            .map(|e| e.state_tx.subscribe())
    }

    /// Registers a synchronous state observer keyed by the registering UI
    /// container. The observer fires immediately with the current state, so
    /// a container recreated after completion still sees the terminal
    /// state. Reserves the entry if absent.
    pub(crate) fn observe(
        &self,
        name: &str,
        owner: OwnerId,
        notify: impl Fn(TaskState) + Send + Sync + 'static,
    ) {
        let notify: ObserverFn = Arc::new(notify);
        let current = {
            let mut table = self.table.lock();
            let entry = table.entry(name.to_string()).or_insert_with(TaskEntry::new);
            entry.observers.push(StateObserver {
                owner,
                notify: notify.clone(),
            });
            entry.state
        };
        notify(current);
    }

    /// Drops every observer registered by `owner`, across all entries.
    /// Called when that UI container's binding is disposed.
    pub(crate) fn remove_observers_for(&self, owner: OwnerId) {
        let mut table = self.table.lock();
        for entry in table.values_mut() {
            entry.observers.retain(|o| o.owner != owner);
        }
    }

    /// Drains the table, returning any still-attached handles for the
    /// caller to close.
    pub(crate) fn close(&self) -> Vec<Arc<TaskHandle>> {
        let mut table = self.table.lock();
        let attached: Vec<Arc<TaskHandle>> = table
            .drain()
            .filter_map(|(_, mut entry)| entry.task.take())
            .collect();
        if !attached.is_empty() {
            warn!(
                count = attached.len(),
                "registry closed with attached tasks"
            );
        }
        attached
    }
}
