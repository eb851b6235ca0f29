//! End-to-end orchestration tests.
//!
//! Drive the public `Orchestrator` API over an in-memory bus: scheduling by
//! score, queue back-pressure, health sweeps, completion reports and all four
//! collaboration strategies.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use ensemble_core::{
    agent_task_subject, EnsembleError, EnsembleResult, InMemoryBus, MessageBus, MessageHandler,
};
use ensemble_orchestrator::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        sequential_step_timeout_ms: 200,
        consensus_round_interval_ms: 10,
        ..Default::default()
    }
}

fn simulated_config() -> OrchestratorConfig {
    let mut config = fast_config();
    config.simulation = SimulationConfig {
        enabled: true,
        latency_ms: 10,
    };
    config
}

fn build(config: OrchestratorConfig) -> (Arc<InMemoryBus>, Orchestrator) {
    let bus = Arc::new(InMemoryBus::new());
    let orch = Orchestrator::new(config, bus.clone()).unwrap();
    (bus, orch)
}

fn go_developer(name: &str) -> Agent {
    Agent::new(name, AgentType::Developer)
        .with_capabilities([Capability::CodeGeneration])
        .with_expertise(["go"])
        .unwrap()
        .with_success_rate(0.93)
}

fn tester(name: &str) -> Agent {
    Agent::new(name, AgentType::Tester).with_capabilities([Capability::TestGeneration])
}

fn go_task() -> Task {
    Task::new("code_generation", "Implement the login handler").with_input("language", "go")
}

async fn wait_for_collaboration(orch: &Orchestrator, id: Uuid) -> Collaboration {
    for _ in 0..500 {
        let c = orch.get_collaboration(id).unwrap();
        if c.is_completed() {
            return c;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("collaboration {id} never completed");
}

async fn wait_for_status(orch: &Orchestrator, id: Uuid) -> TaskStatus {
    tokio::time::timeout(Duration::from_secs(5), orch.wait_for_completion(id))
        .await
        .expect("task did not finish in time")
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. Scheduling picks the best-scoring idle agent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn best_scoring_agent_gets_the_task() {
    let (bus, orch) = build(fast_config());
    let dev = orch.register_agent(go_developer("D")).await.unwrap();
    let qa = orch.register_agent(tester("T")).await.unwrap();

    let task = go_task();
    let dev_score = score(&orch.get_agent(dev).unwrap(), &task);
    let qa_score = score(&orch.get_agent(qa).unwrap(), &task);
    assert!((dev_score - 0.986).abs() < 1e-9);
    assert!(qa_score.abs() < 1e-9);

    orch.start().unwrap();
    let task_id = orch.submit_task(task).await.unwrap();

    let mut assigned = None;
    for _ in 0..200 {
        assigned = orch.get_task(task_id).unwrap().assigned_to;
        if assigned.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(assigned, Some(dev));

    let agent = orch.get_agent(dev).unwrap();
    assert_eq!(agent.state.status, AgentStatus::Busy);
    assert_eq!(agent.state.current_tasks, vec![task_id]);
    assert_eq!(bus.published_on(&agent_task_subject(dev)).len(), 1);
    assert!(bus.published_on(&agent_task_subject(qa)).is_empty());

    orch.shutdown().await;
}

#[tokio::test]
async fn task_without_suitable_agent_fails() {
    let (_bus, orch) = build(fast_config());
    orch.register_agent(tester("T")).await.unwrap();
    orch.start().unwrap();

    let task_id = orch.submit_task(go_task()).await.unwrap();
    assert_eq!(wait_for_status(&orch, task_id).await, TaskStatus::Failed);
    assert_eq!(
        orch.get_task(task_id).unwrap().error.as_deref(),
        Some(NO_SUITABLE_AGENT)
    );

    orch.shutdown().await;
}

// ---------------------------------------------------------------------------
// 2. Queue back-pressure
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_after_submit_timeout() {
    let config = OrchestratorConfig {
        queue_capacity: 1,
        ..Default::default()
    };
    let (_bus, orch) = build(config);

    // Scheduler not started: nothing drains the queue.
    orch.submit_task(go_task()).await.unwrap();

    let started = tokio::time::Instant::now();
    let rejected = go_task();
    let rejected_id = rejected.id;
    let err = orch.submit_task(rejected.clone()).await.unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, EnsembleError::Capacity(_)));
    assert!(waited >= Duration::from_secs(5), "waited {waited:?}");
    assert!(waited < Duration::from_secs(6));
    assert!(matches!(
        orch.get_task(rejected_id),
        Err(EnsembleError::NotFound(_))
    ));
    assert_eq!(orch.list_tasks().len(), 1);
    assert_eq!(orch.queue_depth(), 1);
}

// ---------------------------------------------------------------------------
// 3. Health monitor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_agent_goes_offline_and_is_not_scheduled() {
    let (_bus, orch) = build(fast_config());
    let id = orch.register_agent(go_developer("D")).await.unwrap();

    let report = orch.health_sweep(chrono::Utc::now() + chrono::Duration::minutes(6));
    assert_eq!(report.marked_offline, vec![id]);
    assert_eq!(orch.get_agent(id).unwrap().state.status, AgentStatus::Offline);

    orch.start().unwrap();
    let task_id = orch.submit_task(go_task()).await.unwrap();
    assert_eq!(wait_for_status(&orch, task_id).await, TaskStatus::Failed);

    assert_eq!(orch.heartbeat(id).unwrap(), AgentStatus::Idle);
    let retry = orch.submit_task(go_task()).await.unwrap();
    for _ in 0..200 {
        if orch.get_task(retry).unwrap().assigned_to.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(orch.get_task(retry).unwrap().assigned_to, Some(id));

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn health_ticks_take_silent_agent_offline() {
    let (_bus, orch) = build(fast_config());
    let id = orch.register_agent(go_developer("D")).await.unwrap();
    orch.start().unwrap();

    tokio::time::sleep(Duration::from_secs(6 * 60 + 31)).await;
    assert_eq!(orch.get_agent(id).unwrap().state.status, AgentStatus::Offline);

    orch.shutdown().await;
}

#[tokio::test]
async fn status_report_counts_agents() {
    let (_bus, orch) = build(fast_config());
    for agent in default_agents().unwrap() {
        orch.register_agent(agent).await.unwrap();
    }
    let report = orch.status_report();
    assert_eq!(report["agent_counts"]["idle"], 8);
    assert_eq!(report["agents"].as_array().unwrap().len(), 8);
}

// ---------------------------------------------------------------------------
// 4. Completion handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simulated_agents_complete_submitted_tasks() {
    let (_bus, orch) = build(simulated_config());
    for agent in default_agents().unwrap() {
        orch.register_agent(agent).await.unwrap();
    }
    orch.start().unwrap();

    let task_id = orch
        .submit_task(Task::new("security_audit", "Audit the login flow"))
        .await
        .unwrap();
    assert_eq!(wait_for_status(&orch, task_id).await, TaskStatus::Completed);

    let task = orch.get_task(task_id).unwrap();
    let auditor = orch.get_agent(task.assigned_to.unwrap()).unwrap();
    assert_eq!(auditor.agent_type, AgentType::Security);
    assert_eq!(auditor.state.status, AgentStatus::Idle);
    assert_eq!(auditor.performance.tasks_completed, 1);

    orch.shutdown().await;
}

#[tokio::test]
async fn repeated_failures_park_agent_until_heartbeat() {
    let (_bus, orch) = build(fast_config());
    let id = orch.register_agent(go_developer("D")).await.unwrap();
    orch.start().unwrap();

    for attempt in 0..3 {
        let task_id = orch.submit_task(go_task()).await.unwrap();
        for _ in 0..200 {
            if orch.get_task(task_id).unwrap().status == TaskStatus::Assigned {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        orch.report_progress(task_id, TaskStatus::InProgress).unwrap();
        orch.fail_task(task_id, format!("compile error #{attempt}")).unwrap();
    }

    let agent = orch.get_agent(id).unwrap();
    assert_eq!(agent.state.status, AgentStatus::Error);
    assert_eq!(agent.state.consecutive_errors, 3);

    let task_id = orch.submit_task(go_task()).await.unwrap();
    assert_eq!(wait_for_status(&orch, task_id).await, TaskStatus::Failed);

    assert_eq!(orch.heartbeat(id).unwrap(), AgentStatus::Idle);
    assert_eq!(orch.get_agent(id).unwrap().state.consecutive_errors, 0);

    orch.shutdown().await;
}

struct DeadBus {
    inner: InMemoryBus,
    down: AtomicBool,
}

#[async_trait]
impl MessageBus for DeadBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> EnsembleResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(EnsembleError::Transport(format!("{subject}: connection lost")));
        }
        self.inner.publish(subject, payload).await
    }

    async fn subscribe(&self, subject: &str, handler: MessageHandler) -> EnsembleResult<()> {
        self.inner.subscribe(subject, handler).await
    }
}

#[tokio::test]
async fn publish_failure_fails_task_and_frees_agent() {
    let bus = Arc::new(DeadBus {
        inner: InMemoryBus::new(),
        down: AtomicBool::new(true),
    });
    let orch = Orchestrator::new(fast_config(), bus.clone()).unwrap();
    let id = orch.register_agent(go_developer("D")).await.unwrap();
    orch.start().unwrap();

    let task_id = orch.submit_task(go_task()).await.unwrap();
    assert_eq!(wait_for_status(&orch, task_id).await, TaskStatus::Failed);

    let agent = orch.get_agent(id).unwrap();
    assert_eq!(agent.state.status, AgentStatus::Idle);
    assert!(agent.state.current_tasks.is_empty());

    orch.shutdown().await;
}

// ---------------------------------------------------------------------------
// 5. Collaborations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn voting_collaboration_with_three_agents() {
    let (_bus, orch) = build(fast_config());
    for name in ["A", "B", "C"] {
        orch.register_agent(go_developer(name)).await.unwrap();
    }

    let c = orch
        .create_collaboration(go_task(), StrategyKind::Voting)
        .unwrap();
    assert_eq!(c.participants.len(), 3);
    assert!(c.participants.contains(&c.leader));

    let done = wait_for_collaboration(&orch, c.id).await;
    let voting = done.voting.unwrap();
    assert_eq!(voting.votes.len(), 3);
    assert_eq!(voting.winner, voting.options[0].id);
    assert!((voting.confidence - 0.85).abs() < f64::EPSILON);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn consensus_terminates_and_completes() {
    let (_bus, orch) = build(fast_config());
    for name in ["A", "B"] {
        orch.register_agent(go_developer(name)).await.unwrap();
    }

    let c = orch
        .create_collaboration(go_task(), StrategyKind::Consensus)
        .unwrap();
    let done = wait_for_collaboration(&orch, c.id).await;

    let outcome = done.consensus.unwrap();
    assert!(outcome.rounds <= 5);
    assert_eq!(done.messages.len(), outcome.rounds * done.participants.len());
    assert_eq!(done.status, CollaborationStatus::Completed);
    assert!(!done.interrupted);
}

#[tokio::test]
async fn insufficient_agents_store_no_collaboration() {
    let (_bus, orch) = build(fast_config());
    orch.register_agent(go_developer("A")).await.unwrap();
    orch.register_agent(tester("T")).await.unwrap();

    let err = orch
        .create_collaboration(go_task(), StrategyKind::Parallel)
        .unwrap_err();
    assert!(matches!(err, EnsembleError::InsufficientResources(_)));
    assert!(orch.list_collaborations().is_empty());
}

#[tokio::test]
async fn sequential_collaboration_with_simulated_agents() {
    let (_bus, orch) = build(simulated_config());
    for name in ["A", "B", "C"] {
        orch.register_agent(go_developer(name)).await.unwrap();
    }

    let c = orch
        .create_collaboration(go_task(), StrategyKind::Sequential)
        .unwrap();
    let done = wait_for_collaboration(&orch, c.id).await;
    assert_eq!(done.sub_tasks.len(), 3);

    for sub_task_id in &done.sub_tasks {
        assert_eq!(wait_for_status(&orch, *sub_task_id).await, TaskStatus::Completed);
        let sub = orch.get_task(*sub_task_id).unwrap();
        assert_eq!(sub.parent_task, Some(done.task.id));
        assert!(sub.description.starts_with("Phase for "));
    }
}

#[tokio::test]
async fn parallel_collaboration_assigns_every_participant() {
    let (_bus, orch) = build(fast_config());
    let mut ids = Vec::new();
    for name in ["A", "B", "C", "D"] {
        ids.push(orch.register_agent(go_developer(name)).await.unwrap());
    }

    let c = orch
        .create_collaboration(go_task(), StrategyKind::Parallel)
        .unwrap();
    let done = wait_for_collaboration(&orch, c.id).await;
    assert_eq!(done.sub_tasks.len(), 4);
    for id in ids {
        assert_eq!(orch.get_agent(id).unwrap().state.current_tasks.len(), 1);
    }
}

#[tokio::test]
async fn cancelled_collaboration_ends_interrupted() {
    let mut config = fast_config();
    config.consensus_round_interval_ms = 60_000;
    let (_bus, orch) = build(config);
    for name in ["A", "B"] {
        orch.register_agent(go_developer(name)).await.unwrap();
    }

    let c = orch
        .create_collaboration(go_task(), StrategyKind::Consensus)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    orch.cancel_collaboration(c.id).unwrap();

    let done = wait_for_collaboration(&orch, c.id).await;
    assert!(done.interrupted);
    assert!(!done.consensus.unwrap().reached);
    assert!(matches!(
        orch.cancel_collaboration(Uuid::new_v4()),
        Err(EnsembleError::NotFound(_))
    ));
}

#[tokio::test]
async fn shutdown_interrupts_running_collaborations() {
    let mut config = fast_config();
    config.consensus_round_interval_ms = 60_000;
    let (_bus, orch) = build(config);
    for name in ["A", "B"] {
        orch.register_agent(go_developer(name)).await.unwrap();
    }
    orch.start().unwrap();

    let c = orch
        .create_collaboration(go_task(), StrategyKind::Consensus)
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), orch.shutdown())
        .await
        .unwrap();

    let done = orch.get_collaboration(c.id).unwrap();
    assert!(done.is_completed());
    assert!(done.interrupted);
}

#[test]
fn unknown_strategy_name_is_rejected() {
    let err = "round_robin".parse::<StrategyKind>().unwrap_err();
    assert!(matches!(err, EnsembleError::UnknownStrategy(_)));
}
