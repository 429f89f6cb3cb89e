//! Per-task execution context and view-state store.
//!
//! Every running task owns a [`TaskContext`]: a private cancellation scope
//! for sub-work it spawns, and a [`StateStore`] that prompt components can
//! use to keep state across their own destruction and recreation. Both are
//! torn down when the task detaches.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::error::TaskError;

/// Task-scoped key/value store for prompt view state.
///
/// Cloning is cheap and produces a handle to the same underlying map, so a
/// prompt component can hold its own copy across recreation while the task
/// keeps another.
///
/// Typed accessors return `None` when the key is absent *or* the stored
/// value cannot be converted to the requested type; type mismatches are not
/// errors in this model.
///
/// # Examples
///
/// ```
/// use taskbridge::StateStore;
/// use serde_json::json;
///
/// let store = StateStore::new(None);
/// store.set("page", json!(3)).unwrap();
/// assert_eq!(store.get_i64("page"), Some(3));
/// assert_eq!(store.get_string("page"), None); // wrong type, not an error
/// ```
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StateStoreInner>,
}

struct StateStoreInner {
    values: Mutex<HashMap<String, Value>>,
    value_limit: Option<usize>,
}

impl StateStore {
    /// Creates an empty store with an optional per-value byte limit
    /// (measured on the serialized JSON).
    pub fn new(value_limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(StateStoreInner {
                values: Mutex::new(HashMap::new()),
                value_limit,
            }),
        }
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// [`TaskError::StateValueTooLarge`] if the serialized value exceeds
    /// the configured limit.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), TaskError> {
        let key = key.into();
        if let Some(limit) = self.inner.value_limit {
            let actual = serde_json::to_vec(&value).map_or(0, |bytes| bytes.len());
            if actual > limit {
                return Err(TaskError::StateValueTooLarge { key, limit, actual });
            }
        }
        self.inner.values.lock().insert(key, value);
        Ok(())
    }

    /// Raw JSON value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.values.lock().get(key).cloned()
    }

    /// String value for `key`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)?.as_str().map(str::to_string)
    }

    /// Integer value for `key`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    /// Float value for `key`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    /// Boolean value for `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// Deserializes the value for `key` into `T`; `None` on absence or
    /// shape mismatch.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        serde_json::from_value(self.get(key)?).ok()
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.values.lock().remove(key)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.inner.values.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.values.lock().is_empty()
    }

    /// Drops all stored values.
    pub fn clear(&self) {
        self.inner.values.lock().clear();
    }
}

/// Private execution scope of one running task.
///
/// Sub-work spawned through [`spawn`](Self::spawn) is tracked and cancelled
/// when the task detaches; the view-state store is cleared at the same
/// point.
pub struct TaskContext {
    name: String,
    cancel: CancellationToken,
    tracker: TaskTracker,
    store: StateStore,
}

impl TaskContext {
    pub(crate) fn new(
        name: String,
        parent: &CancellationToken,
        state_value_limit: Option<usize>,
    ) -> Self {
        Self {
            name,
            cancel: parent.child_token(),
            tracker: TaskTracker::new(),
            store: StateStore::new(state_value_limit),
        }
    }

    /// The owning task's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns tracked sub-work that is aborted (resolving to `None`) when
    /// the task's scope is cancelled.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<Option<F::Output>>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker
            .spawn(async move { cancel.run_until_cancelled(fut).await })
    }

    /// Token for cooperative cancellation of sub-work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns `true` once the task's scope has been torn down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The task-scoped view-state store.
    pub fn store(&self) -> StateStore {
        self.store.clone()
    }

    /// Tears the scope down: cancels outstanding sub-work and clears the
    /// store. Idempotent.
    pub(crate) fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(task = %self.name, "task context closed");
        }
        self.cancel.cancel();
        self.tracker.close();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_round_trips_typed_values() {
        let store = StateStore::new(None);
        store.set("name", json!("import")).unwrap();
        store.set("page", json!(2)).unwrap();
        store.set("ratio", json!(0.5)).unwrap();
        store.set("done", json!(false)).unwrap();

        assert_eq!(store.get_string("name").as_deref(), Some("import"));
        assert_eq!(store.get_i64("page"), Some(2));
        assert_eq!(store.get_f64("ratio"), Some(0.5));
        assert_eq!(store.get_bool("done"), Some(false));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn store_mismatch_is_none_not_error() {
        let store = StateStore::new(None);
        store.set("page", json!("not a number")).unwrap();
        assert_eq!(store.get_i64("page"), None);
        assert!(store.get("page").is_some());
    }

    #[test]
    fn store_enforces_value_limit() {
        let store = StateStore::new(Some(8));
        store.set("ok", json!(1)).unwrap();
        let err = store
            .set("big", json!("a very long string value"))
            .unwrap_err();
        match err {
            TaskError::StateValueTooLarge { key, limit, actual } => {
                assert_eq!(key, "big");
                assert_eq!(limit, 8);
                assert!(actual > limit);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn store_get_typed() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Prefs {
            sort: String,
        }

        let store = StateStore::new(None);
        store.set("prefs", json!({"sort": "name"})).unwrap();
        assert_eq!(
            store.get_typed::<Prefs>("prefs"),
            Some(Prefs {
                sort: "name".to_string()
            })
        );
        assert_eq!(store.get_typed::<i64>("prefs"), None);
    }

    #[test]
    fn clones_share_state() {
        let store = StateStore::new(None);
        let other = store.clone();
        store.set("k", json!(1)).unwrap();
        assert_eq!(other.get_i64("k"), Some(1));
        other.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn context_cancels_sub_work_on_close() {
        let root = CancellationToken::new();
        let ctx = TaskContext::new("t".to_string(), &root, None);

        let pending = ctx.spawn(std::future::pending::<()>());
        ctx.close();

        assert_eq!(pending.await.unwrap(), None);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn context_sub_work_completes_normally() {
        let root = CancellationToken::new();
        let ctx = TaskContext::new("t".to_string(), &root, None);

        let done = ctx.spawn(async { 42 });
        assert_eq!(done.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn close_clears_store() {
        let root = CancellationToken::new();
        let ctx = TaskContext::new("t".to_string(), &root, None);
        ctx.store().set("k", json!(1)).unwrap();
        ctx.close();
        assert!(ctx.store().is_empty());
    }
}
