//! Multi-agent task orchestration: agent registry and scoring, task queue and
//! scheduling, health monitoring, and collaborations between agents.
//!
//! Tasks are queued, matched to the best idle agent by score, and handed to
//! that agent over a [`ensemble_core::MessageBus`]. Groups of agents can work
//! jointly on one task under a sequential, parallel, voting or consensus
//! strategy.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Facade owning every component and background worker.
//! - [`AgentRegistry`]: Registered agents, each behind its own lock.
//! - [`Dispatcher`]: Assigns tasks to agents and applies completion reports.
//! - [`TaskScheduler`]: Bounded FIFO queue and its worker.
//! - [`HealthMonitor`]: Periodic liveness sweep and status dashboard.
//! - [`Coordinator`]: Forms collaborations and runs their strategies.
//! - [`OrchestratorConfig`]: Tuning for all of the above.

/// Collaboration board and coordinator.
pub mod collaboration;
/// Orchestrator configuration.
pub mod config;
/// Task assignment and completion handling.
pub mod dispatch;
/// The orchestrator facade.
pub mod engine;
/// Agent health sweeps and status reporting.
pub mod monitor;
/// Default specialized agents.
pub mod profiles;
/// Agent registry.
pub mod registry;
/// Task queue worker.
pub mod scheduler;
/// Agent fitness scoring.
pub mod scoring;
/// Stand-in agents for demos and tests.
pub mod simulator;
/// Collaboration strategies.
pub mod strategies;
/// Task storage and completion signals.
pub mod task_store;
/// Shared data model (Agent, Task, Collaboration, etc.).
pub mod types;

pub use collaboration::{CollaborationBoard, Coordinator};
pub use config::{OrchestratorConfig, SimulationConfig, MAX_CONSENSUS_ROUNDS};
pub use dispatch::{AssignOutcome, Dispatcher, NO_SUITABLE_AGENT};
pub use engine::Orchestrator;
pub use monitor::{AggregatePerformance, HealthMonitor, SweepReport};
pub use profiles::default_agents;
pub use registry::{AgentRegistry, Recommendation};
pub use scheduler::TaskScheduler;
pub use scoring::score;
pub use simulator::AgentSimulator;
pub use strategies::{agreement_reached, RunOutcome, StrategySettings};
pub use task_store::TaskStore;
pub use types::{
    Agent, AgentConfig, AgentPerformance, AgentState, AgentStatus, AgentType, Artifact,
    ArtifactKind, Capability, Collaboration, CollaborationMessage, CollaborationStatus,
    CollaborationStrategy, ConsensusOutcome, ExpertiseTag, MessageKind, StrategyKind, Task,
    TaskMetrics, TaskResult, TaskStatus, VotingOption, VotingResult,
};
