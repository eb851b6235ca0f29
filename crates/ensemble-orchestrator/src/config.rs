use ensemble_core::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling on consensus discussion rounds.
pub const MAX_CONSENSUS_ROUNDS: usize = 5;

/// Tuning for the orchestrator and its background workers.
///
/// Every field has a default, so an empty `[orchestrator]` table is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Capacity of the bounded task queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long `submit_task` waits on a full queue before giving up.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    /// Agents silent for longer than this are marked offline.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// Minimum score for an agent to be recommended (exclusive).
    #[serde(default = "default_recommendation_threshold")]
    pub recommendation_threshold: f64,
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
    #[serde(default = "default_min_participants")]
    pub min_participants: usize,
    /// Consecutive failures after which an agent is parked in `error`.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Upper bound on the wait for each sequential sub-task.
    #[serde(default = "default_sequential_step_timeout_ms")]
    pub sequential_step_timeout_ms: u64,
    #[serde(default = "default_consensus_max_rounds")]
    pub consensus_max_rounds: usize,
    #[serde(default = "default_consensus_round_interval_ms")]
    pub consensus_round_interval_ms: u64,
    #[serde(default = "default_voting_confidence")]
    pub voting_confidence: f64,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Stand-in agents that acknowledge and complete every dispatched task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_simulation_latency_ms")]
    pub latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            latency_ms: default_simulation_latency_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}
fn default_submit_timeout_ms() -> u64 {
    5_000
}
fn default_health_interval_secs() -> u64 {
    30
}
fn default_inactivity_timeout_secs() -> u64 {
    300
}
fn default_recommendation_threshold() -> f64 {
    0.5
}
fn default_max_participants() -> usize {
    5
}
fn default_min_participants() -> usize {
    2
}
fn default_max_consecutive_errors() -> u32 {
    3
}
fn default_sequential_step_timeout_ms() -> u64 {
    3_000
}
fn default_consensus_max_rounds() -> usize {
    MAX_CONSENSUS_ROUNDS
}
fn default_consensus_round_interval_ms() -> u64 {
    1_000
}
fn default_voting_confidence() -> f64 {
    0.85
}
fn default_simulation_latency_ms() -> u64 {
    2_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            submit_timeout_ms: default_submit_timeout_ms(),
            health_interval_secs: default_health_interval_secs(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            recommendation_threshold: default_recommendation_threshold(),
            max_participants: default_max_participants(),
            min_participants: default_min_participants(),
            max_consecutive_errors: default_max_consecutive_errors(),
            sequential_step_timeout_ms: default_sequential_step_timeout_ms(),
            consensus_max_rounds: default_consensus_max_rounds(),
            consensus_round_interval_ms: default_consensus_round_interval_ms(),
            voting_confidence: default_voting_confidence(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> EnsembleResult<()> {
        if self.queue_capacity == 0 {
            return Err(EnsembleError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.min_participants < 2 {
            return Err(EnsembleError::Config(format!(
                "min_participants must be at least 2, got {}",
                self.min_participants
            )));
        }
        if self.max_participants < self.min_participants {
            return Err(EnsembleError::Config(format!(
                "max_participants ({}) is below min_participants ({})",
                self.max_participants, self.min_participants
            )));
        }
        if !(0.0..=1.0).contains(&self.recommendation_threshold) {
            return Err(EnsembleError::Config(format!(
                "recommendation_threshold {} is outside [0, 1]",
                self.recommendation_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.voting_confidence) {
            return Err(EnsembleError::Config(format!(
                "voting_confidence {} is outside [0, 1]",
                self.voting_confidence
            )));
        }
        if !(1..=MAX_CONSENSUS_ROUNDS).contains(&self.consensus_max_rounds) {
            return Err(EnsembleError::Config(format!(
                "consensus_max_rounds must be between 1 and {MAX_CONSENSUS_ROUNDS}, got {}",
                self.consensus_max_rounds
            )));
        }
        if self.health_interval_secs == 0 {
            return Err(EnsembleError::Config(
                "health_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> chrono::Duration {
        chrono::Duration::from_std(Duration::from_secs(self.inactivity_timeout_secs))
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn sequential_step_timeout(&self) -> Duration {
        Duration::from_millis(self.sequential_step_timeout_ms)
    }

    pub fn consensus_round_interval(&self) -> Duration {
        Duration::from_millis(self.consensus_round_interval_ms)
    }

    pub fn simulation_latency(&self) -> Duration {
        Duration::from_millis(self.simulation.latency_ms)
    }
}
