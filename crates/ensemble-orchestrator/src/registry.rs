use crate::scoring::score;
use crate::types::{Agent, AgentStatus, Task};
use chrono::Utc;
use ensemble_core::{agent_task_subject, EnsembleError, EnsembleResult, MessageBus, MessageHandler};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared, individually locked agent.
pub type AgentHandle = Arc<Mutex<Agent>>;

#[derive(Clone)]
struct Entry {
    /// Registration sequence, used to break score ties.
    seq: u64,
    agent: AgentHandle,
}

/// An agent paired with the score it had when the decision was taken.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub agent: Agent,
    pub score: f64,
}

/// Every known agent, each behind its own lock.
///
/// The map lock only guards membership; mutation of an agent happens under
/// that agent's mutex.
pub struct AgentRegistry {
    agents: RwLock<HashMap<Uuid, Entry>>,
    subscribed: Mutex<HashSet<Uuid>>,
    /// Held across the subscribe await so a re-registration sees its outcome.
    registration: tokio::sync::Mutex<()>,
    next_seq: AtomicU64,
    bus: Arc<dyn MessageBus>,
}

impl AgentRegistry {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            subscribed: Mutex::new(HashSet::new()),
            registration: tokio::sync::Mutex::new(()),
            next_seq: AtomicU64::new(0),
            bus,
        }
    }

    /// Register (or re-register) an agent and subscribe `handler` on its task subject.
    ///
    /// A nil id is replaced by a fresh one. Re-registering a known id
    /// overwrites the agent in place but keeps the tasks it currently owns
    /// and its single bus subscription.
    pub async fn register(&self, mut agent: Agent, handler: MessageHandler) -> EnsembleResult<Uuid> {
        if agent.name.trim().is_empty() {
            return Err(EnsembleError::Validation(
                "agent name must not be empty".to_string(),
            ));
        }
        if agent.id.is_nil() {
            agent.id = Uuid::new_v4();
        }
        dedup_in_place(&mut agent.capabilities);
        dedup_in_place(&mut agent.expertise);

        let id = agent.id;
        let _registering = self.registration.lock().await;
        let first_subscription = self.subscribed.lock().insert(id);
        if first_subscription {
            let subject = agent_task_subject(id);
            if let Err(e) = self.bus.subscribe(&subject, handler).await {
                self.subscribed.lock().remove(&id);
                return Err(EnsembleError::Transport(format!(
                    "failed to subscribe agent {id} on {subject}: {e}"
                )));
            }
        } else {
            debug!(agent_id = %id, "Agent already subscribed, skipping duplicate subscription");
        }

        let now = Utc::now();
        agent.updated_at = now;
        agent.state.last_active_at = now;
        agent.state.current_tasks.clear();
        agent.state.status = AgentStatus::Idle;

        let mut agents = self.agents.write();
        match agents.get(&id) {
            Some(existing) => {
                let mut slot = existing.agent.lock();
                agent.created_at = slot.created_at;
                agent.state.current_tasks = std::mem::take(&mut slot.state.current_tasks);
                if !agent.state.current_tasks.is_empty() {
                    agent.state.status = AgentStatus::Busy;
                }
                *slot = agent;
                info!(agent_id = %id, "Re-registered agent");
            }
            None => {
                agent.created_at = now;
                let agent_type = agent.agent_type;
                let entry = Entry {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    agent: Arc::new(Mutex::new(agent)),
                };
                agents.insert(id, entry);
                info!(agent_id = %id, agent_type = %agent_type, "Registered new agent");
            }
        }

        Ok(id)
    }

    /// Lock handle for one agent.
    pub fn handle(&self, id: Uuid) -> Option<AgentHandle> {
        self.agents.read().get(&id).map(|e| Arc::clone(&e.agent))
    }

    /// Snapshot of one agent.
    pub fn get(&self, id: Uuid) -> EnsembleResult<Agent> {
        self.handle(id)
            .map(|h| h.lock().clone())
            .ok_or_else(|| EnsembleError::not_found("agent", id))
    }

    /// Snapshot of every agent, in registration order.
    pub fn list(&self) -> Vec<Agent> {
        self.handles_in_order()
            .into_iter()
            .map(|h| h.lock().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// All agent handles, in registration order.
    pub fn handles_in_order(&self) -> Vec<AgentHandle> {
        let mut entries: Vec<Entry> = self.agents.read().values().cloned().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.agent).collect()
    }

    /// Idle agents with a positive score for `task`, best first.
    ///
    /// Scores are taken once per agent before sorting; equal scores keep
    /// registration order.
    pub fn idle_candidates(&self, task: &Task) -> Vec<Recommendation> {
        self.ranked(task, |agent, s| agent.state.status == AgentStatus::Idle && s > 0.0)
    }

    /// Every agent scoring above `threshold` for `task`, best first.
    pub fn recommendations(&self, task: &Task, threshold: f64) -> Vec<Recommendation> {
        self.ranked(task, |_, s| s > threshold)
    }

    fn ranked<F>(&self, task: &Task, keep: F) -> Vec<Recommendation>
    where
        F: Fn(&Agent, f64) -> bool,
    {
        let mut ranked: Vec<Recommendation> = self
            .handles_in_order()
            .into_iter()
            .filter_map(|handle| {
                let agent = handle.lock();
                let s = score(&agent, task);
                keep(&agent, s).then(|| Recommendation {
                    agent: agent.clone(),
                    score: s,
                })
            })
            .collect();
        // Stable sort: ties stay in registration order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Liveness report from an agent.
    ///
    /// Refreshes `last_active_at`; an offline or errored agent that owns no
    /// tasks comes back as idle with its error streak cleared.
    pub fn heartbeat(&self, id: Uuid) -> EnsembleResult<AgentStatus> {
        let handle = self
            .handle(id)
            .ok_or_else(|| EnsembleError::not_found("agent", id))?;
        let mut agent = handle.lock();
        agent.state.last_active_at = Utc::now();
        if matches!(agent.state.status, AgentStatus::Offline | AgentStatus::Error) {
            if agent.state.current_tasks.is_empty() {
                agent.state.status = AgentStatus::Idle;
                agent.state.consecutive_errors = 0;
            } else {
                agent.state.status = AgentStatus::Busy;
            }
            info!(agent_id = %id, status = %agent.state.status, "Agent back online");
        }
        Ok(agent.state.status)
    }
}

fn dedup_in_place<T: PartialEq>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    *items = seen;
}
