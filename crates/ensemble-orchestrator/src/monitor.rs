use crate::registry::AgentRegistry;
use crate::task_store::TaskStore;
use crate::types::AgentStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_offline: Vec<Uuid>,
    pub errors_reset: Vec<Uuid>,
}

/// Aggregate performance across all agents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatePerformance {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tokens_used: u64,
    pub average_success_rate: f64,
}

/// Wall-clock anchor advanced by tokio's monotonic clock.
#[derive(Debug, Clone, Copy)]
struct TickClock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl TickClock {
    fn new() -> Self {
        Self {
            wall: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or(chrono::Duration::MAX);
        self.wall
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Periodic liveness sweep over the agent registry.
pub struct HealthMonitor {
    registry: Arc<AgentRegistry>,
    tasks: Arc<TaskStore>,
    interval: Duration,
    inactivity_timeout: chrono::Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tasks: Arc<TaskStore>,
        interval: Duration,
        inactivity_timeout: chrono::Duration,
    ) -> Self {
        Self {
            registry,
            tasks,
            interval,
            inactivity_timeout,
        }
    }

    /// Run one sweep as of `now`.
    ///
    /// Agents silent for longer than the inactivity timeout go offline and
    /// keep whatever tasks they hold. Idle agents get their consecutive-error
    /// streak cleared.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for handle in self.registry.handles_in_order() {
            let mut agent = handle.lock();
            let silent_for = now - agent.state.last_active_at;

            if agent.state.status != AgentStatus::Offline && silent_for > self.inactivity_timeout {
                agent.state.status = AgentStatus::Offline;
                agent.updated_at = now;
                warn!(
                    agent_id = %agent.id,
                    silent_secs = silent_for.num_seconds(),
                    held_tasks = agent.state.current_tasks.len(),
                    "Agent marked offline"
                );
                report.marked_offline.push(agent.id);
                continue;
            }

            if agent.state.status == AgentStatus::Idle && agent.state.consecutive_errors > 0 {
                agent.state.consecutive_errors = 0;
                debug!(agent_id = %agent.id, "Cleared consecutive errors");
                report.errors_reset.push(agent.id);
            }
        }

        report
    }

    /// Spawn the periodic sweep. The first sweep runs one interval after start.
    ///
    /// Each sweep's `now` is the wall-clock time at start plus the elapsed
    /// tokio time, so the sweep follows the runtime's clock, paused or not.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let clock = TickClock::new();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            info!(interval_secs = self.interval.as_secs(), "Health monitor started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep(clock.now());
                        if !report.marked_offline.is_empty() || !report.errors_reset.is_empty() {
                            info!(
                                offline = report.marked_offline.len(),
                                reset = report.errors_reset.len(),
                                "Health sweep"
                            );
                        }
                    }
                }
            }
            info!("Health monitor stopped");
        })
    }

    /// Sum performance over every agent.
    pub fn aggregate_performance(&self) -> AggregatePerformance {
        let agents = self.registry.list();
        let mut total = AggregatePerformance::default();
        for agent in &agents {
            total.tasks_completed += agent.performance.tasks_completed;
            total.tasks_failed += agent.performance.tasks_failed;
            total.tokens_used += agent.performance.tokens_used;
            total.average_success_rate += agent.performance.success_rate;
        }
        if !agents.is_empty() {
            total.average_success_rate /= agents.len() as f64;
        }
        total
    }

    /// Dashboard summary: per-agent state, counts by status and aggregate performance.
    pub fn status_report(&self) -> serde_json::Value {
        let agents = self.registry.list();

        let mut agents_by_status: BTreeMap<String, usize> = BTreeMap::new();
        for agent in &agents {
            *agents_by_status
                .entry(agent.state.status.to_string())
                .or_insert(0) += 1;
        }

        let tasks_by_status: BTreeMap<String, usize> = self
            .tasks
            .status_counts()
            .into_iter()
            .map(|(status, count)| (status.to_string(), count))
            .collect();

        let summaries: Vec<serde_json::Value> = agents
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id,
                    "name": a.name,
                    "type": a.agent_type,
                    "status": a.state.status,
                    "current_tasks": a.state.current_tasks.len(),
                    "success_rate": a.performance.success_rate,
                    "last_active_at": a.state.last_active_at,
                })
            })
            .collect();

        serde_json::json!({
            "generated_at": Utc::now(),
            "agents": summaries,
            "agent_counts": agents_by_status,
            "task_counts": tasks_by_status,
            "total_tasks": self.tasks.len(),
            "aggregate": self.aggregate_performance(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{Agent, AgentType, Task};
    use ensemble_core::{BusMessage, InMemoryBus};

    fn setup() -> (Arc<AgentRegistry>, HealthMonitor) {
        let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryBus::new())));
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(TaskStore::new()),
            Duration::from_secs(30),
            chrono::Duration::minutes(5),
        );
        (registry, monitor)
    }

    #[tokio::test]
    async fn test_silent_agent_goes_offline() {
        let (registry, monitor) = setup();
        let id = registry
            .register(Agent::new("A", AgentType::Tester), Arc::new(|_: BusMessage| {}))
            .await
            .unwrap();

        assert!(monitor.sweep(Utc::now()).marked_offline.is_empty());

        let later = Utc::now() + chrono::Duration::minutes(6);
        let report = monitor.sweep(later);
        assert_eq!(report.marked_offline, vec![id]);
        assert_eq!(registry.get(id).unwrap().state.status, AgentStatus::Offline);

        // Already offline: not reported twice.
        assert!(monitor.sweep(later).marked_offline.is_empty());
    }

    #[tokio::test]
    async fn test_busy_agent_keeps_tasks_when_offline() {
        let (registry, monitor) = setup();
        let id = registry
            .register(Agent::new("A", AgentType::Developer), Arc::new(|_: BusMessage| {}))
            .await
            .unwrap();
        let task_id = Uuid::new_v4();
        {
            let handle = registry.handle(id).unwrap();
            let mut agent = handle.lock();
            agent.state.status = AgentStatus::Busy;
            agent.state.current_tasks.push(task_id);
        }

        monitor.sweep(Utc::now() + chrono::Duration::minutes(10));
        let agent = registry.get(id).unwrap();
        assert_eq!(agent.state.status, AgentStatus::Offline);
        assert_eq!(agent.state.current_tasks, vec![task_id]);
    }

    #[tokio::test]
    async fn test_idle_agent_error_streak_cleared() {
        let (registry, monitor) = setup();
        let id = registry
            .register(Agent::new("A", AgentType::Developer), Arc::new(|_: BusMessage| {}))
            .await
            .unwrap();
        registry.handle(id).unwrap().lock().state.consecutive_errors = 2;

        let report = monitor.sweep(Utc::now());
        assert_eq!(report.errors_reset, vec![id]);
        assert_eq!(registry.get(id).unwrap().state.consecutive_errors, 0);
    }

    #[tokio::test]
    async fn test_status_report_shape() {
        let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryBus::new())));
        let tasks = Arc::new(TaskStore::new());
        tasks.insert(Task::new("t", "d")).unwrap();
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            tasks,
            Duration::from_secs(30),
            chrono::Duration::minutes(5),
        );
        registry
            .register(
                Agent::new("A", AgentType::Developer).with_success_rate(0.8),
                Arc::new(|_: BusMessage| {}),
            )
            .await
            .unwrap();
        registry
            .register(
                Agent::new("B", AgentType::Tester).with_success_rate(0.6),
                Arc::new(|_: BusMessage| {}),
            )
            .await
            .unwrap();

        let json = monitor.status_report();
        assert!(json["agents"].is_array());
        assert_eq!(json["agent_counts"]["idle"], 2);
        assert_eq!(json["task_counts"]["pending"], 1);
        assert_eq!(json["total_tasks"], 1);
        let avg = json["aggregate"]["average_success_rate"].as_f64().unwrap();
        assert!((avg - 0.7).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_sweeps_and_stops() {
        let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryBus::new())));
        let id = registry
            .register(Agent::new("A", AgentType::Developer), Arc::new(|_: BusMessage| {}))
            .await
            .unwrap();
        registry.handle(id).unwrap().lock().state.consecutive_errors = 1;

        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(TaskStore::new()),
            Duration::from_secs(30),
            chrono::Duration::minutes(5),
        ));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&monitor).start(cancel.clone());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(registry.get(id).unwrap().state.consecutive_errors, 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_marks_silent_agent_offline() {
        let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryBus::new())));
        let id = registry
            .register(Agent::new("A", AgentType::Developer), Arc::new(|_: BusMessage| {}))
            .await
            .unwrap();

        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::new(TaskStore::new()),
            Duration::from_secs(30),
            chrono::Duration::minutes(5),
        ));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&monitor).start(cancel.clone());

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert_eq!(registry.get(id).unwrap().state.status, AgentStatus::Idle);

        tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
        assert_eq!(registry.get(id).unwrap().state.status, AgentStatus::Offline);

        cancel.cancel();
        handle.await.unwrap();
    }
}
