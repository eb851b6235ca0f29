use crate::types::{Task, TaskStatus, PRIORITY_RANGE};
use ensemble_core::{EnsembleError, EnsembleResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Shared, individually locked task.
pub type TaskHandle = Arc<Mutex<Task>>;

/// Every task the orchestrator has accepted, plus their completion waiters.
///
/// Tasks are retained after they finish. Waiters are registered while the
/// task's own lock is held, and released by [`TaskStore::notify_terminal`]
/// after the terminal status has been written, so a waiter can never miss
/// the signal.
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, TaskHandle>>,
    waiters: Mutex<HashMap<Uuid, Vec<oneshot::Sender<TaskStatus>>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Store a task. Rejects priorities outside 1–10 and duplicate ids.
    pub fn insert(&self, task: Task) -> EnsembleResult<Uuid> {
        if !PRIORITY_RANGE.contains(&task.priority) {
            return Err(EnsembleError::Validation(format!(
                "priority {} is outside {}..={}",
                task.priority,
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            )));
        }
        let id = task.id;
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&id) {
            return Err(EnsembleError::Validation(format!("task {id} already exists")));
        }
        tasks.insert(id, Arc::new(Mutex::new(task)));
        debug!(task_id = %id, "Stored task");
        Ok(id)
    }

    /// Drop a task and any waiters on it.
    pub fn remove(&self, id: Uuid) -> Option<Task> {
        let removed = self.tasks.write().remove(&id);
        self.waiters.lock().remove(&id);
        removed.map(|handle| handle.lock().clone())
    }

    pub fn handle(&self, id: Uuid) -> Option<TaskHandle> {
        self.tasks.read().get(&id).map(Arc::clone)
    }

    pub fn get(&self, id: Uuid) -> EnsembleResult<Task> {
        self.handle(id)
            .map(|h| h.lock().clone())
            .ok_or_else(|| EnsembleError::not_found("task", id))
    }

    /// Snapshot of every task, oldest first.
    pub fn list(&self) -> Vec<Task> {
        let handles: Vec<TaskHandle> = self.tasks.read().values().cloned().collect();
        let mut tasks: Vec<Task> = handles.iter().map(|h| h.lock().clone()).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Number of tasks in each status.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let handles: Vec<TaskHandle> = self.tasks.read().values().cloned().collect();
        let mut counts = HashMap::new();
        for handle in handles {
            let status = handle.lock().status;
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }

    /// Resolve once the task reaches a terminal status.
    ///
    /// Returns immediately for a task that has already finished.
    pub async fn wait_for_completion(&self, id: Uuid) -> EnsembleResult<TaskStatus> {
        let rx = {
            let handle = self
                .handle(id)
                .ok_or_else(|| EnsembleError::not_found("task", id))?;
            let task = handle.lock();
            if task.status.is_terminal() {
                return Ok(task.status);
            }
            let (tx, rx) = oneshot::channel();
            self.waiters.lock().entry(id).or_default().push(tx);
            rx
        };
        rx.await
            .map_err(|_| EnsembleError::NotFound(format!("task {id} was removed while awaited")))
    }

    /// Wake every waiter on `id`. Call after the terminal status is stored.
    pub fn notify_terminal(&self, id: Uuid, status: TaskStatus) {
        let waiters = self.waiters.lock().remove(&id).unwrap_or_default();
        for tx in waiters {
            // A waiter that gave up has dropped its receiver.
            let _ = tx.send(status);
        }
    }

    /// Move a task straight to `failed` with `reason`, waking its waiters.
    pub fn fail(&self, id: Uuid, reason: impl Into<String>) -> EnsembleResult<()> {
        let handle = self
            .handle(id)
            .ok_or_else(|| EnsembleError::not_found("task", id))?;
        {
            let mut task = handle.lock();
            task.transition(TaskStatus::Failed)?;
            task.error = Some(reason.into());
        }
        self.notify_terminal(id, TaskStatus::Failed);
        Ok(())
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
