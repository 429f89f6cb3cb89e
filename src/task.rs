//! The executing task: fire/fire_async, the parked continuation, and the
//! present-and-wait bridge.
//!
//! A [`TaskHandle`] wraps one single-shot execution body. Firing attaches
//! the handle under its name, runs the body on the manager's supervisor
//! scope, and detaches with the success flag -- body faults and panics are
//! caught at this boundary and become a `Failed` completion, never an
//! escaping error.
//!
//! Inside the body, [`show_modal`](TaskHandle::show_modal) presents a modal
//! and suspends until the UI reports its outcome, surviving any number of
//! owner recreations in between: the task name, not the owner, routes the
//! outcome back.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::manager::TaskManager;
use crate::modal::{ModalOutcome, ModalPresenter};
use crate::owner::OwnerRef;
use crate::stack::Ticket;

type TaskBody = Box<dyn FnOnce(Arc<TaskHandle>) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// One named, single-shot task execution.
///
/// Built via [`TaskBuilder`], fired once with [`fire`](Self::fire) or
/// [`fire_async`](Self::fire_async). The registry holds the handle only
/// while the body runs; the entry (state + result) outlives it.
pub struct TaskHandle {
    name: String,
    allow_sequential: bool,
    manager: Arc<TaskManager>,
    body: Mutex<Option<TaskBody>>,
    continuation: Mutex<Option<oneshot::Sender<ModalOutcome>>>,
    ticket: Mutex<Option<Ticket>>,
    result: Mutex<Option<Value>>,
    context: TaskContext,
}

impl TaskHandle {
    /// The task's registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a duplicate fire waits for the previous run instead of
    /// faulting.
    pub fn allow_sequential(&self) -> bool {
        self.allow_sequential
    }

    /// The manager this handle is bound to.
    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// The task's private execution context.
    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// The body's produced value, once the run finished successfully.
    pub fn result(&self) -> Option<Value> {
        self.result.lock().clone()
    }

    /// Spawns [`fire_async`](Self::fire_async) on the manager's supervisor
    /// scope. Usage faults are logged; body faults were already converted
    /// to a `Failed` completion, so nothing escapes to the caller.
    pub fn fire(self: Arc<Self>) -> JoinHandle<()> {
        let manager = self.manager.clone();
        manager.spawn_supervised(async move {
            let name = self.name.clone();
            match self.fire_async().await {
                Ok(_) => {}
                Err(err) if err.is_usage_fault() => {
                    error!(task = %name, %err, "task fire rejected");
                }
                Err(err) => {
                    debug!(task = %name, %err, "task finished unsuccessfully");
                }
            }
        })
    }

    /// Runs the task to completion: reserve + attach, execute the body,
    /// detach with the success flag, release the private context.
    ///
    /// # Errors
    ///
    /// Usage faults (`AlreadyRunning`, `AlreadyFired`, ...) are returned
    /// as-is. A body fault or panic is logged and reported as
    /// [`TaskError::TaskFailed`]; a body unwound by a dispose surfaces as
    /// [`TaskError::Disposed`]. The body's own error never escapes.
    pub async fn fire_async(self: Arc<Self>) -> Result<Value, TaskError> {
        let name = self.name.clone();
        debug!(task = %name, "fire");
        let body = self
            .body
            .lock()
            .take()
            .ok_or_else(|| TaskError::AlreadyFired { name: name.clone() })?;

        self.manager.begin(&self).await?;

        let outcome = AssertUnwindSafe(body(self.clone())).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => {
                *self.result.lock() = Some(value.clone());
                self.manager.detach(&self, true);
                self.close();
                Ok(value)
            }
            Ok(Err(err)) => {
                let mapped = match err.downcast::<TaskError>() {
                    Ok(TaskError::Disposed { name }) => TaskError::Disposed { name },
                    Ok(other) => {
                        warn!(task = %name, err = %other, "task body failed");
                        TaskError::TaskFailed { name: name.clone() }
                    }
                    Err(other) => {
                        warn!(task = %name, err = %other, "task body failed");
                        TaskError::TaskFailed { name: name.clone() }
                    }
                };
                self.manager.detach(&self, false);
                self.close();
                Err(mapped)
            }
            Err(_panic) => {
                error!(task = %name, "task body panicked");
                self.manager.detach(&self, false);
                self.close();
                Err(TaskError::TaskFailed { name })
            }
        }
    }

    /// Presents a modal on the current owner and suspends until the UI
    /// reports its terminal outcome.
    ///
    /// The call verifies this handle is the one attached under its name,
    /// acquires the current owner through the ticketed gate (reusing the
    /// ticket of an enclosing acquisition, so nested steps of one
    /// interaction share one owner slot), parks a one-shot continuation,
    /// and hands the owner, tag, and task name to `presenter`. The gate is
    /// held until the outcome arrives.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotAttached`] when called from a stale handle.
    /// - [`TaskError::AlreadyParked`] when a wait is already parked.
    /// - [`TaskError::Disposed`] when the entry is disposed mid-wait.
    pub async fn show_modal(
        &self,
        tag: &str,
        presenter: &dyn ModalPresenter,
    ) -> Result<ModalOutcome, TaskError> {
        self.ensure_attached()?;
        let prev = *self.ticket.lock();
        let result = self
            .manager
            .owners()
            .with_owner(prev, |ticket, owner| async move {
                *self.ticket.lock() = Some(ticket);
                let waiter = self.park()?;
                debug!(task = %self.name, tag, "modal opening");
                presenter.present(&owner, tag, &self.name);
                waiter.await.map_err(|_| TaskError::Disposed {
                    name: self.name.clone(),
                })
            })
            .await;
        *self.ticket.lock() = prev;
        debug!(task = %self.name, tag, "modal closed");
        result
    }

    /// [`show_modal`](Self::show_modal), but waits for an owner satisfying
    /// `matches` to become frontmost before presenting.
    pub async fn show_modal_where(
        &self,
        tag: &str,
        matches: impl Fn(&OwnerRef) -> bool + Sync,
        presenter: &dyn ModalPresenter,
    ) -> Result<ModalOutcome, TaskError> {
        self.ensure_attached()?;
        let prev = *self.ticket.lock();
        let result = self
            .manager
            .owners()
            .with_owner_where(prev, matches, |ticket, owner| async move {
                *self.ticket.lock() = Some(ticket);
                let waiter = self.park()?;
                debug!(task = %self.name, tag, "modal opening");
                presenter.present(&owner, tag, &self.name);
                waiter.await.map_err(|_| TaskError::Disposed {
                    name: self.name.clone(),
                })
            })
            .await;
        *self.ticket.lock() = prev;
        result
    }

    /// Runs `f` with the current owner under this task's acquisition
    /// ticket, so modal calls inside `f` share the same owner slot instead
    /// of queuing behind their own gate acquisition.
    pub async fn with_owner<T, F, Fut>(&self, f: F) -> T
    where
        F: FnOnce(OwnerRef) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let prev = *self.ticket.lock();
        let result = self
            .manager
            .owners()
            .with_owner(prev, |ticket, owner| {
                *self.ticket.lock() = Some(ticket);
                f(owner)
            })
            .await;
        *self.ticket.lock() = prev;
        result
    }

    /// Completes the parked continuation with the modal's outcome.
    ///
    /// # Errors
    ///
    /// [`TaskError::StaleResume`] when nothing is parked -- a double resume,
    /// or a resume racing a dispose. Never delivers an outcome twice.
    pub fn resume(&self, outcome: ModalOutcome) -> Result<(), TaskError> {
        let Some(sender) = self.continuation.lock().take() else {
            warn!(task = %self.name, "resume with no parked continuation");
            return Err(TaskError::StaleResume {
                name: self.name.clone(),
            });
        };
        if sender.send(outcome).is_err() {
            warn!(task = %self.name, "parked waiter already gone");
            return Err(TaskError::StaleResume {
                name: self.name.clone(),
            });
        }
        debug!(task = %self.name, "resumed");
        Ok(())
    }

    fn ensure_attached(&self) -> Result<(), TaskError> {
        let attached = self.manager.handle_of(&self.name);
        match attached {
            Some(current) if std::ptr::eq(Arc::as_ptr(&current), std::ptr::from_ref(self)) => {
                Ok(())
            }
            _ => Err(TaskError::NotAttached {
                name: self.name.clone(),
            }),
        }
    }

    fn park(&self) -> Result<oneshot::Receiver<ModalOutcome>, TaskError> {
        let mut slot = self.continuation.lock();
        if slot.is_some() {
            return Err(TaskError::AlreadyParked {
                name: self.name.clone(),
            });
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Ok(rx)
    }

    /// Tears down task-scoped resources: the private context and any parked
    /// continuation (whose waiter then observes `Disposed`). Idempotent.
    pub(crate) fn close(&self) {
        self.context.close();
        self.continuation.lock().take();
        *self.ticket.lock() = None;
    }
}

/// Builder for a [`TaskHandle`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use taskbridge::{TaskBuilder, TaskManager};
///
/// # async fn demo() {
/// let manager = Arc::new(TaskManager::new());
/// let handle = TaskBuilder::new()
///     .name("import")
///     .allow_sequential(true)
///     .build(&manager, |_task| async move { Ok(json!("done")) });
/// handle.fire();
/// # }
/// ```
#[derive(Default)]
pub struct TaskBuilder {
    name: Option<String>,
    allow_sequential: bool,
}

impl TaskBuilder {
    /// Starts a builder with an auto-generated name and defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the task's registry key. Without one, a unique
    /// `task:{uuid}` name is generated, so anonymous tasks never collide.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// When set, a fire that finds the name already running waits for that
    /// run to finish instead of faulting.
    pub fn allow_sequential(mut self, allow: bool) -> Self {
        self.allow_sequential = allow;
        self
    }

    /// Builds the handle around `body`.
    pub fn build<F, Fut>(self, manager: &Arc<TaskManager>, body: F) -> Arc<TaskHandle>
    where
        F: FnOnce(Arc<TaskHandle>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let name = self
            .name
            .unwrap_or_else(|| format!("task:{}", Uuid::new_v4()));
        let context = TaskContext::new(
            name.clone(),
            manager.root_cancel(),
            manager.state_value_limit(),
        );
        Arc::new(TaskHandle {
            name,
            allow_sequential: self.allow_sequential,
            manager: manager.clone(),
            body: Mutex::new(Some(Box::new(move |task| body(task).boxed()))),
            continuation: Mutex::new(None),
            ticket: Mutex::new(None),
            result: Mutex::new(None),
            context,
        })
    }
}

/// Closure-based entry points, for callers that do not want to keep a
/// handle around.
pub struct Task;

impl Task {
    /// Fire-and-forget under an explicit name.
    pub fn launch<F, Fut>(manager: &Arc<TaskManager>, name: &str, body: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<TaskHandle>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        TaskBuilder::new().name(name).build(manager, body).fire()
    }

    /// Fire-and-forget under a generated unique name.
    pub fn launch_anonymous<F, Fut>(manager: &Arc<TaskManager>, body: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<TaskHandle>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        TaskBuilder::new().build(manager, body).fire()
    }

    /// Runs the task and returns its produced value.
    ///
    /// # Errors
    ///
    /// [`TaskError::TaskFailed`] (or a usage fault) exactly as
    /// [`TaskHandle::fire_async`] reports them.
    pub async fn await_result<F, Fut>(
        manager: &Arc<TaskManager>,
        name: &str,
        body: F,
    ) -> Result<Value, TaskError>
    where
        F: FnOnce(Arc<TaskHandle>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        TaskBuilder::new()
            .name(name)
            .build(manager, body)
            .fire_async()
            .await
    }

    /// Like [`await_result`](Self::await_result), but substitutes
    /// `default` for any failure.
    pub async fn await_result_or<F, Fut>(
        manager: &Arc<TaskManager>,
        name: &str,
        default: Value,
        body: F,
    ) -> Value
    where
        F: FnOnce(Arc<TaskHandle>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::await_result(manager, name, body)
            .await
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_generates_unique_names() {
        let manager = Arc::new(TaskManager::new());
        let a = TaskBuilder::new().build(&manager, |_| async { Ok(json!(null)) });
        let b = TaskBuilder::new().build(&manager, |_| async { Ok(json!(null)) });
        assert_ne!(a.name(), b.name());
        assert!(a.name().starts_with("task:"));
    }

    #[test]
    fn resume_without_park_is_stale() {
        let manager = Arc::new(TaskManager::new());
        let handle = TaskBuilder::new()
            .name("idle")
            .build(&manager, |_| async { Ok(json!(null)) });
        let err = handle
            .resume(ModalOutcome::positive(None))
            .unwrap_err();
        assert!(matches!(err, TaskError::StaleResume { .. }));
    }

    #[tokio::test]
    async fn second_fire_of_same_handle_faults() {
        let manager = Arc::new(TaskManager::new());
        let handle = TaskBuilder::new()
            .name("once")
            .build(&manager, |_| async { Ok(json!(1)) });
        handle.clone().fire_async().await.unwrap();
        let err = handle.fire_async().await.unwrap_err();
        assert!(matches!(err, TaskError::AlreadyFired { .. }));
    }
}
