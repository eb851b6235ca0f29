//! The four ways a collaboration can coordinate its participants.
//!
//! Each strategy runs inside the collaboration's coordinator task, checks
//! the cancellation token between sub-steps, and absorbs sub-step failures
//! by logging them.

use crate::collaboration::CollaborationHandle;
use crate::config::OrchestratorConfig;
use crate::dispatch::Dispatcher;
use crate::types::{
    CollaborationMessage, ConsensusOutcome, MessageKind, Task, VotingOption, VotingResult,
};
use chrono::Utc;
use ensemble_core::EnsembleResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rationale recorded with every placeholder vote.
pub const VOTE_RATIONALE: &str = "Best solution based on analysis";

/// Whether a strategy ran to the end or was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Interrupted,
}

/// Timing and policy knobs shared by every strategy run.
#[derive(Debug, Clone, Copy)]
pub struct StrategySettings {
    pub sequential_step_timeout: Duration,
    pub consensus_max_rounds: usize,
    pub consensus_round_interval: Duration,
    pub voting_confidence: f64,
}

impl StrategySettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            sequential_step_timeout: config.sequential_step_timeout(),
            consensus_max_rounds: config.consensus_max_rounds,
            consensus_round_interval: config.consensus_round_interval(),
            voting_confidence: config.voting_confidence,
        }
    }
}

/// Everything a strategy needs to act on one collaboration.
#[derive(Clone)]
pub struct StrategyContext {
    pub dispatcher: Arc<Dispatcher>,
    pub collaboration: CollaborationHandle,
    pub cancel: CancellationToken,
    pub settings: StrategySettings,
}

struct Roster {
    collaboration_id: Uuid,
    participants: Vec<Uuid>,
    leader: Uuid,
    task: Task,
    min_votes: usize,
}

impl StrategyContext {
    fn roster(&self) -> Roster {
        let c = self.collaboration.lock();
        Roster {
            collaboration_id: c.id,
            participants: c.participants.clone(),
            leader: c.leader,
            task: c.task.clone(),
            min_votes: c.strategy.min_votes,
        }
    }

    fn append(&self, message: CollaborationMessage) {
        self.collaboration.lock().messages.push(message);
    }

    /// Store a sub-task of `parent` for `agent_id`, log the request and assign it.
    async fn dispatch_sub_task(
        &self,
        parent: &Task,
        leader: Uuid,
        agent_id: Uuid,
        label: &str,
    ) -> EnsembleResult<Uuid> {
        let agent = self.dispatcher.registry().get(agent_id)?;
        let sub_task = parent.sub_task(format!("{label} {}", agent.name));
        let description = sub_task.description.clone();
        let sub_task_id = self.dispatcher.tasks().insert(sub_task)?;

        {
            let mut c = self.collaboration.lock();
            c.sub_tasks.push(sub_task_id);
            c.messages.push(CollaborationMessage {
                id: Uuid::new_v4(),
                from: leader,
                to: vec![agent_id.to_string()],
                kind: MessageKind::Request,
                content: description,
                timestamp: Utc::now(),
            });
        }

        self.dispatcher
            .assign_task_to_agent(sub_task_id, agent_id, false)
            .await?;
        Ok(sub_task_id)
    }
}

/// Agreement check for a consensus round (0-based).
///
/// Placeholder policy: agreement is declared from the third round on,
/// whatever the participants said.
pub fn agreement_reached(round: usize) -> bool {
    round >= 2
}

/// One sub-task per participant, in order, each awaited before the next.
///
/// A step that does not finish within the step timeout is left running and
/// the next participant starts.
pub async fn run_sequential(ctx: &StrategyContext) -> RunOutcome {
    let roster = ctx.roster();

    for agent_id in roster.participants {
        if ctx.cancel.is_cancelled() {
            return RunOutcome::Interrupted;
        }

        let sub_task_id = match ctx
            .dispatch_sub_task(&roster.task, roster.leader, agent_id, "Phase for")
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    collaboration_id = %roster.collaboration_id,
                    agent_id = %agent_id,
                    error = %e,
                    "Failed to assign sequential sub-task"
                );
                continue;
            }
        };

        let wait = tokio::time::timeout(
            ctx.settings.sequential_step_timeout,
            ctx.dispatcher.tasks().wait_for_completion(sub_task_id),
        );
        tokio::select! {
            _ = ctx.cancel.cancelled() => return RunOutcome::Interrupted,
            waited = wait => match waited {
                Ok(Ok(status)) => {
                    debug!(task_id = %sub_task_id, status = %status, "Sequential step finished");
                }
                Ok(Err(e)) => {
                    warn!(task_id = %sub_task_id, error = %e, "Lost track of sequential step");
                }
                Err(_) => {
                    debug!(task_id = %sub_task_id, "Sequential step timed out, moving on");
                }
            },
        }
    }

    RunOutcome::Finished
}

/// One sub-task per participant, assigned concurrently. Waits for every
/// assignment, not for the sub-tasks to finish.
pub async fn run_parallel(ctx: &StrategyContext) -> RunOutcome {
    let roster = ctx.roster();
    let mut assignments = JoinSet::new();

    for agent_id in roster.participants {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let ctx = ctx.clone();
        let task = roster.task.clone();
        let leader = roster.leader;
        assignments.spawn(async move {
            let result = ctx
                .dispatch_sub_task(&task, leader, agent_id, "Parallel task for")
                .await;
            (agent_id, result)
        });
    }

    while let Some(joined) = assignments.join_next().await {
        match joined {
            Ok((agent_id, Err(e))) => {
                warn!(
                    collaboration_id = %roster.collaboration_id,
                    agent_id = %agent_id,
                    error = %e,
                    "Failed to assign parallel sub-task"
                );
            }
            Ok((agent_id, Ok(sub_task_id))) => {
                debug!(agent_id = %agent_id, task_id = %sub_task_id, "Parallel sub-task assigned");
            }
            Err(e) => {
                warn!(collaboration_id = %roster.collaboration_id, error = %e, "Parallel assignment panicked");
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        RunOutcome::Interrupted
    } else {
        RunOutcome::Finished
    }
}

/// Collect one proposal per participant, have everyone vote, record the tally.
///
/// Placeholder policy: every participant votes for the first option, which
/// wins with the configured confidence.
pub async fn run_voting(ctx: &StrategyContext) -> RunOutcome {
    let roster = ctx.roster();
    if ctx.cancel.is_cancelled() {
        return RunOutcome::Interrupted;
    }

    let mut options: Vec<VotingOption> = roster
        .participants
        .iter()
        .map(|agent_id| VotingOption {
            id: Uuid::new_v4(),
            description: format!("Proposal from {agent_id}"),
            proposed_by: *agent_id,
            content: format!("Proposal from agent {agent_id}"),
            score: 0.0,
        })
        .collect();
    let Some(winner) = options.first().map(|o| o.id) else {
        warn!(collaboration_id = %roster.collaboration_id, "No participants to vote");
        return RunOutcome::Finished;
    };

    let mut votes = HashMap::new();
    let mut rationales = HashMap::new();
    for agent_id in &roster.participants {
        if ctx.cancel.is_cancelled() {
            return RunOutcome::Interrupted;
        }
        votes.insert(*agent_id, winner);
        rationales.insert(*agent_id, VOTE_RATIONALE.to_string());
        ctx.append(CollaborationMessage::broadcast(
            *agent_id,
            MessageKind::Vote,
            format!("Vote for option {winner}"),
        ));
    }

    let vote_count = votes.len();
    if let Some(first) = options.first_mut() {
        first.score = vote_count as f64;
    }

    let result = VotingResult {
        id: Uuid::new_v4(),
        subject: roster.task.description.clone(),
        options,
        quorum_met: vote_count >= roster.min_votes,
        votes,
        rationales,
        winner,
        confidence: ctx.settings.voting_confidence,
        timestamp: Utc::now(),
    };

    {
        let mut c = ctx.collaboration.lock();
        c.messages.push(CollaborationMessage::broadcast(
            roster.leader,
            MessageKind::Decision,
            format!(
                "Option {winner} wins with confidence {:.2}",
                result.confidence
            ),
        ));
        c.voting = Some(result);
    }

    info!(
        collaboration_id = %roster.collaboration_id,
        winner = %winner,
        votes = vote_count,
        "Voting completed"
    );
    RunOutcome::Finished
}

/// Discussion rounds until agreement or the round limit, paced by the round interval.
pub async fn run_consensus(ctx: &StrategyContext) -> RunOutcome {
    let roster = ctx.roster();
    let max_rounds = ctx.settings.consensus_max_rounds;
    let mut rounds = 0;
    let mut reached = false;
    let mut outcome = RunOutcome::Finished;

    for round in 0..max_rounds {
        if ctx.cancel.is_cancelled() {
            outcome = RunOutcome::Interrupted;
            break;
        }
        debug!(collaboration_id = %roster.collaboration_id, round, "Consensus round");

        for agent_id in &roster.participants {
            ctx.append(CollaborationMessage::broadcast(
                *agent_id,
                MessageKind::Response,
                format!("Agent {agent_id} view for round {round}"),
            ));
        }
        rounds = round + 1;

        if agreement_reached(round) {
            reached = true;
            break;
        }

        if rounds < max_rounds {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    outcome = RunOutcome::Interrupted;
                    break;
                }
                _ = tokio::time::sleep(ctx.settings.consensus_round_interval) => {}
            }
        }
    }

    ctx.collaboration.lock().consensus = Some(ConsensusOutcome { rounds, reached });

    if reached {
        info!(collaboration_id = %roster.collaboration_id, rounds, "Consensus reached");
    } else {
        warn!(collaboration_id = %roster.collaboration_id, rounds, "Failed to reach consensus");
    }
    outcome
}
