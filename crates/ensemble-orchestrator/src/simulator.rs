use crate::dispatch::Dispatcher;
use crate::types::{Task, TaskMetrics, TaskResult, TaskStatus};
use ensemble_core::{BusMessage, MessageHandler};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// Output reported for every simulated task.
pub const SIMULATED_OUTPUT: &str = "Task completed successfully";

/// Stand-in agent: a bus handler that acknowledges each dispatched task and
/// completes it after a fixed latency.
///
/// Holds the dispatcher weakly so a registered handler does not keep the
/// orchestrator alive.
#[derive(Clone)]
pub struct AgentSimulator {
    dispatcher: Weak<Dispatcher>,
    latency: Duration,
}

impl AgentSimulator {
    pub fn new(dispatcher: &Arc<Dispatcher>, latency: Duration) -> Self {
        Self {
            dispatcher: Arc::downgrade(dispatcher),
            latency,
        }
    }

    /// Handler to subscribe on an agent's task subject.
    pub fn handler(&self) -> MessageHandler {
        let simulator = self.clone();
        Arc::new(move |message: BusMessage| simulator.on_message(message))
    }

    fn on_message(&self, message: BusMessage) {
        let task: Task = match serde_json::from_slice(&message.payload) {
            Ok(task) => task,
            Err(e) => {
                error!(subject = %message.subject, error = %e, "Failed to decode dispatched task");
                return;
            }
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(task_id = %task.id, "No runtime to simulate task on, dropping it");
            return;
        };
        debug!(task_id = %task.id, agent_id = ?task.assigned_to, "Simulated agent received task");

        let dispatcher = self.dispatcher.clone();
        let latency = self.latency;
        runtime.spawn(async move {
            if let Some(d) = dispatcher.upgrade() {
                if let Err(e) = d.report_progress(task.id, TaskStatus::InProgress) {
                    debug!(task_id = %task.id, error = %e, "Could not mark simulated task in progress");
                }
            }

            tokio::time::sleep(latency).await;

            let Some(d) = dispatcher.upgrade() else {
                return;
            };
            let result = TaskResult::new(SIMULATED_OUTPUT).with_metrics(TaskMetrics {
                execution_time_ms: latency.as_secs_f64() * 1000.0,
                tokens_used: 100,
                quality_score: 95.0,
                iterations: 1,
                ..TaskMetrics::default()
            });
            if let Err(e) = d.complete_task(task.id, result) {
                warn!(task_id = %task.id, error = %e, "Simulated completion rejected");
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::AgentRegistry;
    use crate::task_store::TaskStore;
    use crate::types::{Agent, AgentStatus, AgentType, Capability};
    use ensemble_core::InMemoryBus;

    #[tokio::test]
    async fn test_simulated_agent_completes_task() {
        let bus = Arc::new(InMemoryBus::new());
        let registry = Arc::new(AgentRegistry::new(bus.clone()));
        let tasks = Arc::new(TaskStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&tasks),
            bus,
            3,
        ));
        let simulator = AgentSimulator::new(&dispatcher, Duration::from_millis(20));

        let agent = Agent::new("Dev", AgentType::Developer)
            .with_capabilities([Capability::CodeGeneration]);
        let agent_id = registry.register(agent, simulator.handler()).await.unwrap();
        let task_id = tasks.insert(Task::new("code_generation", "x")).unwrap();

        dispatcher.schedule(task_id).await.unwrap();
        let status = tokio::time::timeout(Duration::from_secs(2), tasks.wait_for_completion(task_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status, TaskStatus::Completed);

        let task = tasks.get(task_id).unwrap();
        let result = task.result.unwrap();
        assert_eq!(result.output, serde_json::json!(SIMULATED_OUTPUT));
        assert!((result.metrics.quality_score - 95.0).abs() < f64::EPSILON);

        let agent = registry.get(agent_id).unwrap();
        assert_eq!(agent.state.status, AgentStatus::Idle);
        assert_eq!(agent.performance.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_ignored() {
        let bus = Arc::new(InMemoryBus::new());
        let registry = Arc::new(AgentRegistry::new(bus.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            Arc::new(TaskStore::new()),
            bus,
            3,
        ));
        let handler = AgentSimulator::new(&dispatcher, Duration::from_millis(1)).handler();
        handler(BusMessage::new("agents.x.tasks", b"not json".to_vec()));
    }

    #[tokio::test]
    async fn test_dropped_dispatcher_is_tolerated() {
        let bus = Arc::new(InMemoryBus::new());
        let registry = Arc::new(AgentRegistry::new(bus.clone()));
        let tasks = Arc::new(TaskStore::new());
        let dispatcher = Arc::new(Dispatcher::new(registry, Arc::clone(&tasks), bus, 3));
        let handler = AgentSimulator::new(&dispatcher, Duration::from_millis(1)).handler();
        drop(dispatcher);

        let task = Task::new("code_generation", "x");
        handler(BusMessage::new(
            "agents.x.tasks",
            serde_json::to_vec(&task).unwrap(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tasks.is_empty());
    }
}
