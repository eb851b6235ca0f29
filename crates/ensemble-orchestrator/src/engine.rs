use crate::collaboration::{CollaborationBoard, Coordinator};
use crate::config::OrchestratorConfig;
use crate::dispatch::Dispatcher;
use crate::monitor::{HealthMonitor, SweepReport};
use crate::registry::{AgentRegistry, Recommendation};
use crate::scheduler::TaskScheduler;
use crate::simulator::AgentSimulator;
use crate::strategies::StrategySettings;
use crate::task_store::TaskStore;
use crate::types::{
    Agent, AgentStatus, Collaboration, CollaborationStrategy, Task, TaskResult, TaskStatus,
};
use chrono::{DateTime, Utc};
use ensemble_core::{BusMessage, EnsembleResult, MessageBus, MessageHandler};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The ensemble orchestrator.
///
/// Owns the agent registry, the task store and queue, the health monitor and
/// every collaboration. `new` only builds; background workers run between
/// [`Orchestrator::start`] and [`Orchestrator::shutdown`].
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<AgentRegistry>,
    tasks: Arc<TaskStore>,
    dispatcher: Arc<Dispatcher>,
    scheduler: TaskScheduler,
    monitor: Arc<HealthMonitor>,
    coordinator: Coordinator,
    simulator: Option<AgentSimulator>,
    root: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build an orchestrator over `bus`. Fails on an invalid config.
    pub fn new(config: OrchestratorConfig, bus: Arc<dyn MessageBus>) -> EnsembleResult<Self> {
        config.validate()?;

        let registry = Arc::new(AgentRegistry::new(Arc::clone(&bus)));
        let tasks = Arc::new(TaskStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&tasks),
            bus,
            config.max_consecutive_errors,
        ));
        let scheduler = TaskScheduler::new(config.queue_capacity, config.submit_timeout());
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&tasks),
            config.health_interval(),
            config.inactivity_timeout(),
        ));
        let coordinator = Coordinator::new(
            Arc::clone(&dispatcher),
            Arc::new(CollaborationBoard::new()),
            StrategySettings::from_config(&config),
            config.recommendation_threshold,
            config.min_participants,
            config.max_participants,
        );
        let simulator = config
            .simulation
            .enabled
            .then(|| AgentSimulator::new(&dispatcher, config.simulation_latency()));

        Ok(Self {
            config,
            registry,
            tasks,
            dispatcher,
            scheduler,
            monitor,
            coordinator,
            simulator,
            root: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Spawn the scheduler worker and the health monitor. Returns immediately.
    pub fn start(&self) -> EnsembleResult<()> {
        let scheduler = self
            .scheduler
            .start(Arc::clone(&self.dispatcher), self.root.child_token())?;
        let monitor = Arc::clone(&self.monitor).start(self.root.child_token());
        self.workers.lock().extend([scheduler, monitor]);
        info!(
            queue_capacity = self.config.queue_capacity,
            simulation = self.simulator.is_some(),
            "Orchestrator started"
        );
        Ok(())
    }

    /// Cancel every background worker and collaboration, then wait for them.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        handles.extend(self.coordinator.board().take_runners());

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background worker ended abnormally");
            }
        }
        info!("Orchestrator stopped");
    }

    // ---- agents ----

    /// Register an agent and subscribe its task subject.
    pub async fn register_agent(&self, agent: Agent) -> EnsembleResult<Uuid> {
        let handler = match &self.simulator {
            Some(simulator) => simulator.handler(),
            None => delivery_logger(),
        };
        self.registry.register(agent, handler).await
    }

    pub fn get_agent(&self, id: Uuid) -> EnsembleResult<Agent> {
        self.registry.get(id)
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.registry.list()
    }

    /// Liveness report from an agent; see [`AgentRegistry::heartbeat`].
    pub fn heartbeat(&self, agent_id: Uuid) -> EnsembleResult<AgentStatus> {
        self.registry.heartbeat(agent_id)
    }

    /// Agents scoring above the recommendation threshold for `task`, best first.
    pub fn get_agent_recommendations(&self, task: &Task) -> Vec<Recommendation> {
        self.registry
            .recommendations(task, self.config.recommendation_threshold)
    }

    // ---- tasks ----

    /// Accept a task and queue it for scheduling.
    ///
    /// The task is reset to `pending` with fresh timestamps, and a nil id is
    /// replaced by a fresh one. If the queue
    /// stays full past the submit timeout the task is dropped again and a
    /// capacity error returned, so the caller may resubmit it.
    pub async fn submit_task(&self, mut task: Task) -> EnsembleResult<Uuid> {
        if task.id.is_nil() {
            task.id = Uuid::new_v4();
        }
        let now = Utc::now();
        task.created_at = now;
        task.updated_at = now;
        task.status = TaskStatus::Pending;
        task.assigned_to = None;
        task.result = None;
        task.error = None;

        let id = self.tasks.insert(task)?;
        if let Err(e) = self.scheduler.enqueue(id).await {
            self.tasks.remove(id);
            warn!(task_id = %id, error = %e, "Task rejected");
            return Err(e);
        }
        info!(task_id = %id, "Task submitted");
        Ok(id)
    }

    pub fn get_task(&self, id: Uuid) -> EnsembleResult<Task> {
        self.tasks.get(id)
    }

    /// Every task, oldest first, including collaboration sub-tasks.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.list()
    }

    /// Task ids waiting for the scheduler.
    pub fn queue_depth(&self) -> usize {
        self.scheduler.depth()
    }

    pub fn report_progress(&self, task_id: Uuid, status: TaskStatus) -> EnsembleResult<()> {
        self.dispatcher.report_progress(task_id, status)
    }

    pub fn complete_task(&self, task_id: Uuid, result: TaskResult) -> EnsembleResult<()> {
        self.dispatcher.complete_task(task_id, result)
    }

    pub fn fail_task(&self, task_id: Uuid, reason: impl Into<String>) -> EnsembleResult<()> {
        self.dispatcher.fail_task(task_id, reason)
    }

    /// Resolve with the task's terminal status.
    pub async fn wait_for_completion(&self, task_id: Uuid) -> EnsembleResult<TaskStatus> {
        self.tasks.wait_for_completion(task_id).await
    }

    // ---- collaborations ----

    /// Form a collaboration for `task` and start coordinating it in the background.
    pub fn create_collaboration(
        &self,
        task: Task,
        strategy: impl Into<CollaborationStrategy>,
    ) -> EnsembleResult<Collaboration> {
        self.coordinator.create(task, strategy.into(), &self.root)
    }

    pub fn get_collaboration(&self, id: Uuid) -> EnsembleResult<Collaboration> {
        self.coordinator.board().get(id)
    }

    pub fn list_collaborations(&self) -> Vec<Collaboration> {
        self.coordinator.board().list()
    }

    /// Stop a running collaboration; it ends `completed` and `interrupted`.
    pub fn cancel_collaboration(&self, id: Uuid) -> EnsembleResult<()> {
        self.coordinator.board().cancel(id)
    }

    // ---- health ----

    /// One health sweep as of `now`, outside the periodic schedule.
    pub fn health_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.monitor.sweep(now)
    }

    /// JSON dashboard of agents, tasks and aggregate performance.
    pub fn status_report(&self) -> serde_json::Value {
        let mut report = self.monitor.status_report();
        report["queue_depth"] = serde_json::json!(self.queue_depth());
        report["collaborations"] = serde_json::json!(self.coordinator.board().len());
        report
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Handler for agents that execute out of process: only records delivery.
fn delivery_logger() -> MessageHandler {
    Arc::new(|message: BusMessage| {
        debug!(subject = %message.subject, bytes = message.payload.len(), "Task delivered to agent");
    })
}
