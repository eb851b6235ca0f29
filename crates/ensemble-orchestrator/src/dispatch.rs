use crate::registry::AgentRegistry;
use crate::task_store::TaskStore;
use crate::types::{AgentStatus, TaskResult, TaskStatus};
use chrono::Utc;
use ensemble_core::{agent_task_subject, EnsembleError, EnsembleResult, MessageBus};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reason recorded on a task no idle agent can take.
pub const NO_SUITABLE_AGENT: &str = "no suitable agent";

/// How many times the scheduler re-ranks after losing its chosen agents to a race.
const MAX_RESELECT_ROUNDS: usize = 3;

/// Whether an assignment went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// The agent was required idle but was no longer idle under its lock.
    AgentUnavailable,
}

/// Binds tasks to agents, publishes them, and applies completion reports.
///
/// Every mutation locks the agent before the task.
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    tasks: Arc<TaskStore>,
    bus: Arc<dyn MessageBus>,
    max_consecutive_errors: u32,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tasks: Arc<TaskStore>,
        bus: Arc<dyn MessageBus>,
        max_consecutive_errors: u32,
    ) -> Self {
        Self {
            registry,
            tasks,
            bus,
            max_consecutive_errors,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    /// Assign `task_id` to `agent_id` and publish the task on the agent's subject.
    ///
    /// With `require_idle`, the agent's status is checked under its lock and
    /// nothing changes if it is not idle. If the publish fails the agent
    /// forgets the task and the task is marked failed.
    pub async fn assign_task_to_agent(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
        require_idle: bool,
    ) -> EnsembleResult<AssignOutcome> {
        let agent_handle = self
            .registry
            .handle(agent_id)
            .ok_or_else(|| EnsembleError::not_found("agent", agent_id))?;
        let task_handle = self
            .tasks
            .handle(task_id)
            .ok_or_else(|| EnsembleError::not_found("task", task_id))?;

        let payload = {
            let mut agent = agent_handle.lock();
            if require_idle && agent.state.status != AgentStatus::Idle {
                return Ok(AssignOutcome::AgentUnavailable);
            }
            let mut task = task_handle.lock();
            task.transition(TaskStatus::Assigned)?;
            task.assigned_to = Some(agent_id);

            let now = Utc::now();
            agent.state.status = AgentStatus::Busy;
            if !agent.owns_task(task_id) {
                agent.state.current_tasks.push(task_id);
            }
            agent.state.last_active_at = now;
            agent.updated_at = now;

            serde_json::to_vec(&*task)?
        };

        let subject = agent_task_subject(agent_id);
        if let Err(e) = self.bus.publish(&subject, payload).await {
            warn!(task_id = %task_id, agent_id = %agent_id, error = %e, "Publish failed, rolling back assignment");
            self.roll_back(task_id, agent_id, &e.to_string());
            return Err(EnsembleError::Transport(format!(
                "failed to publish task {task_id} on {subject}: {e}"
            )));
        }

        info!(task_id = %task_id, agent_id = %agent_id, "Task assigned");
        Ok(AssignOutcome::Assigned)
    }

    fn roll_back(&self, task_id: Uuid, agent_id: Uuid, reason: &str) {
        let failed = match (self.registry.handle(agent_id), self.tasks.handle(task_id)) {
            (Some(agent_handle), Some(task_handle)) => {
                let mut agent = agent_handle.lock();
                agent.release_task(task_id);
                let mut task = task_handle.lock();
                let failed = task.transition(TaskStatus::Failed).is_ok();
                if failed {
                    task.error = Some(format!("dispatch failed: {reason}"));
                }
                failed
            }
            _ => false,
        };
        if failed {
            self.tasks.notify_terminal(task_id, TaskStatus::Failed);
        }
    }

    /// Pick the best idle agent for a queued task and assign it.
    ///
    /// Returns the chosen agent, or `None` when the task was failed for lack
    /// of a suitable agent or is no longer pending.
    pub async fn schedule(&self, task_id: Uuid) -> EnsembleResult<Option<Uuid>> {
        for round in 0..MAX_RESELECT_ROUNDS {
            let task = self.tasks.get(task_id)?;
            if task.status != TaskStatus::Pending {
                debug!(task_id = %task_id, status = %task.status, "Skipping task that is no longer pending");
                return Ok(None);
            }

            let candidates = self.registry.idle_candidates(&task);
            if candidates.is_empty() {
                break;
            }

            for candidate in candidates {
                let agent_id = candidate.agent.id;
                match self.assign_task_to_agent(task_id, agent_id, true).await? {
                    AssignOutcome::Assigned => {
                        debug!(task_id = %task_id, agent_id = %agent_id, score = candidate.score, "Scheduled task");
                        return Ok(Some(agent_id));
                    }
                    AssignOutcome::AgentUnavailable => {
                        debug!(task_id = %task_id, agent_id = %agent_id, round, "Agent taken in the meantime, reselecting");
                    }
                }
            }
        }

        warn!(task_id = %task_id, "No suitable agent, failing task");
        self.tasks.fail(task_id, NO_SUITABLE_AGENT)?;
        Ok(None)
    }

    /// Move an assigned task to `in_progress` or `review`.
    pub fn report_progress(&self, task_id: Uuid, status: TaskStatus) -> EnsembleResult<()> {
        if !matches!(status, TaskStatus::InProgress | TaskStatus::Review) {
            return Err(EnsembleError::Validation(format!(
                "progress reports accept in_progress or review, got {status}"
            )));
        }
        let task_handle = self
            .tasks
            .handle(task_id)
            .ok_or_else(|| EnsembleError::not_found("task", task_id))?;
        let assignee = task_handle.lock().assigned_to;
        let agent_handle = assignee.and_then(|id| self.registry.handle(id));

        let mut agent = agent_handle.as_ref().map(|h| h.lock());
        let mut task = task_handle.lock();
        task.transition(status)?;
        if let Some(agent) = agent.as_mut() {
            agent.state.last_active_at = Utc::now();
        }
        debug!(task_id = %task_id, status = %status, "Task progress");
        Ok(())
    }

    /// Record a successful result and free the agent.
    pub fn complete_task(&self, task_id: Uuid, result: TaskResult) -> EnsembleResult<()> {
        let task_handle = self
            .tasks
            .handle(task_id)
            .ok_or_else(|| EnsembleError::not_found("task", task_id))?;
        let assignee = task_handle.lock().assigned_to;
        let agent_handle = assignee.and_then(|id| self.registry.handle(id));

        {
            let mut agent = agent_handle.as_ref().map(|h| h.lock());
            let mut task = task_handle.lock();
            task.transition(TaskStatus::Completed)?;

            if let Some(agent) = agent.as_mut() {
                let now = Utc::now();
                agent.release_task(task_id);
                agent.state.consecutive_errors = 0;
                agent.state.last_active_at = now;
                agent.updated_at = now;

                let perf = &mut agent.performance;
                perf.record_outcome(true);
                let n = perf.tasks_completed as f64;
                perf.average_latency_ms += (result.metrics.execution_time_ms - perf.average_latency_ms) / n;
                perf.tokens_used += result.metrics.tokens_used;
            }
            task.result = Some(result);
        }

        self.tasks.notify_terminal(task_id, TaskStatus::Completed);
        info!(task_id = %task_id, agent_id = ?assignee, "Task completed");
        Ok(())
    }

    /// Record a failure and charge it to the agent.
    ///
    /// An agent reaching the consecutive-error limit is parked in `error`
    /// until a heartbeat brings it back.
    pub fn fail_task(&self, task_id: Uuid, reason: impl Into<String>) -> EnsembleResult<()> {
        let reason = reason.into();
        let task_handle = self
            .tasks
            .handle(task_id)
            .ok_or_else(|| EnsembleError::not_found("task", task_id))?;
        let assignee = task_handle.lock().assigned_to;
        let agent_handle = assignee.and_then(|id| self.registry.handle(id));

        {
            let mut agent = agent_handle.as_ref().map(|h| h.lock());
            let mut task = task_handle.lock();
            task.transition(TaskStatus::Failed)?;
            task.error = Some(reason.clone());

            if let Some(agent) = agent.as_mut() {
                let now = Utc::now();
                agent.release_task(task_id);
                agent.state.error_count += 1;
                agent.state.consecutive_errors += 1;
                agent.state.last_active_at = now;
                agent.updated_at = now;
                agent.performance.record_outcome(false);

                if agent.state.consecutive_errors >= self.max_consecutive_errors {
                    agent.state.status = AgentStatus::Error;
                    warn!(
                        agent_id = %agent.id,
                        consecutive_errors = agent.state.consecutive_errors,
                        "Agent parked after repeated failures"
                    );
                }
            }
        }

        self.tasks.notify_terminal(task_id, TaskStatus::Failed);
        warn!(task_id = %task_id, agent_id = ?assignee, reason = %reason, "Task failed");
        Ok(())
    }
}
