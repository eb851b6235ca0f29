use crate::dispatch::Dispatcher;
use ensemble_core::{EnsembleError, EnsembleResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Bounded FIFO of task ids plus the single worker that drains it.
pub struct TaskScheduler {
    tx: mpsc::Sender<Uuid>,
    rx: Mutex<Option<mpsc::Receiver<Uuid>>>,
    submit_timeout: Duration,
}

impl TaskScheduler {
    /// Create a queue holding at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize, submit_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            submit_timeout,
        }
    }

    /// Enqueue a task id, waiting up to the submit timeout while the queue is full.
    pub async fn enqueue(&self, task_id: Uuid) -> EnsembleResult<()> {
        match self.tx.send_timeout(task_id, self.submit_timeout).await {
            Ok(()) => {
                debug!(task_id = %task_id, depth = self.depth(), "Task queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(EnsembleError::Capacity(format!(
                "task queue full ({} entries), gave up after {:?}",
                self.tx.max_capacity(),
                self.submit_timeout
            ))),
            Err(SendTimeoutError::Closed(_)) => Err(EnsembleError::Capacity(
                "task queue is closed".to_string(),
            )),
        }
    }

    /// Ids waiting in the queue.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Spawn the worker loop. It dequeues one id at a time and hands it to
    /// the dispatcher until `cancel` fires.
    ///
    /// The queue has a single consumer, so this succeeds only once.
    pub fn start(
        &self,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
    ) -> EnsembleResult<JoinHandle<()>> {
        let mut rx = self.rx.lock().take().ok_or_else(|| {
            EnsembleError::Validation("task scheduler already started".to_string())
        })?;

        Ok(tokio::spawn(async move {
            info!("Task scheduler started");
            loop {
                let task_id = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(id) => id,
                        None => break,
                    },
                };

                match dispatcher.schedule(task_id).await {
                    Ok(Some(agent_id)) => {
                        debug!(task_id = %task_id, agent_id = %agent_id, "Dequeued and assigned");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Scheduling failed");
                    }
                }
            }
            info!("Task scheduler stopped");
        }))
    }
}
