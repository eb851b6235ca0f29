use crate::dispatch::Dispatcher;
use crate::strategies::{
    run_consensus, run_parallel, run_sequential, run_voting, RunOutcome, StrategyContext,
    StrategySettings,
};
use crate::types::{
    Collaboration, CollaborationStatus, CollaborationStrategy, StrategyKind, Task, PRIORITY_RANGE,
};
use chrono::Utc;
use ensemble_core::{EnsembleError, EnsembleResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared, individually locked collaboration.
pub type CollaborationHandle = Arc<Mutex<Collaboration>>;

struct Entry {
    collaboration: CollaborationHandle,
    cancel: CancellationToken,
    runner: Option<JoinHandle<()>>,
}

/// Every collaboration ever created, with the token that stops its coordinator.
#[derive(Default)]
pub struct CollaborationBoard {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl CollaborationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, collaboration: Collaboration, cancel: CancellationToken) -> CollaborationHandle {
        let id = collaboration.id;
        let handle = Arc::new(Mutex::new(collaboration));
        self.entries.write().insert(
            id,
            Entry {
                collaboration: Arc::clone(&handle),
                cancel,
                runner: None,
            },
        );
        handle
    }

    fn attach_runner(&self, id: Uuid, runner: JoinHandle<()>) {
        if let Some(entry) = self.entries.write().get_mut(&id) {
            entry.runner = Some(runner);
        }
    }

    pub fn get(&self, id: Uuid) -> EnsembleResult<Collaboration> {
        self.entries
            .read()
            .get(&id)
            .map(|e| e.collaboration.lock().clone())
            .ok_or_else(|| EnsembleError::not_found("collaboration", id))
    }

    /// Snapshot of every collaboration, oldest first.
    pub fn list(&self) -> Vec<Collaboration> {
        let handles: Vec<CollaborationHandle> = self
            .entries
            .read()
            .values()
            .map(|e| Arc::clone(&e.collaboration))
            .collect();
        let mut all: Vec<Collaboration> = handles.iter().map(|h| h.lock().clone()).collect();
        all.sort_by_key(|c| c.created_at);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Ask a collaboration's coordinator to stop. A finished one is left as is.
    pub fn cancel(&self, id: Uuid) -> EnsembleResult<()> {
        let entries = self.entries.read();
        let entry = entries
            .get(&id)
            .ok_or_else(|| EnsembleError::not_found("collaboration", id))?;
        entry.cancel.cancel();
        info!(collaboration_id = %id, "Collaboration cancellation requested");
        Ok(())
    }

    /// Detach every coordinator handle so the caller can await them.
    pub fn take_runners(&self) -> Vec<JoinHandle<()>> {
        self.entries
            .write()
            .values_mut()
            .filter_map(|e| e.runner.take())
            .collect()
    }
}

/// Forms collaborations and drives each one with its strategy.
pub struct Coordinator {
    dispatcher: Arc<Dispatcher>,
    board: Arc<CollaborationBoard>,
    settings: StrategySettings,
    recommendation_threshold: f64,
    min_participants: usize,
    max_participants: usize,
}

impl Coordinator {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        board: Arc<CollaborationBoard>,
        settings: StrategySettings,
        recommendation_threshold: f64,
        min_participants: usize,
        max_participants: usize,
    ) -> Self {
        Self {
            dispatcher,
            board,
            settings,
            recommendation_threshold,
            min_participants,
            max_participants,
        }
    }

    pub fn board(&self) -> &Arc<CollaborationBoard> {
        &self.board
    }

    /// Pick participants for `task`, store the collaboration and start its coordinator.
    ///
    /// Returns the freshly stored snapshot right away; the strategy runs in
    /// the background under a child of `parent_cancel`. Nothing is stored
    /// when fewer than the minimum number of agents qualify.
    pub fn create(
        &self,
        task: Task,
        strategy: CollaborationStrategy,
        parent_cancel: &CancellationToken,
    ) -> EnsembleResult<Collaboration> {
        if !PRIORITY_RANGE.contains(&task.priority) {
            return Err(EnsembleError::Validation(format!(
                "priority {} is outside {}..={}",
                task.priority,
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            )));
        }

        let ranked = self
            .dispatcher
            .registry()
            .recommendations(&task, self.recommendation_threshold);
        let participants: Vec<Uuid> = ranked
            .iter()
            .take(self.max_participants)
            .map(|r| r.agent.id)
            .collect();
        let leader = match participants.first() {
            Some(&leader) if participants.len() >= self.min_participants => leader,
            _ => {
                return Err(EnsembleError::InsufficientResources(format!(
                    "{} eligible agent(s) for task {}, at least {} required",
                    participants.len(),
                    task.id,
                    self.min_participants
                )));
            }
        };

        let collaboration = Collaboration::new(task, strategy, participants, leader);
        let id = collaboration.id;
        let kind = collaboration.strategy.kind;
        let participant_count = collaboration.participants.len();
        let snapshot = collaboration.clone();

        let cancel = parent_cancel.child_token();
        let handle = self.board.insert(collaboration, cancel.clone());
        let ctx = StrategyContext {
            dispatcher: Arc::clone(&self.dispatcher),
            collaboration: handle,
            cancel,
            settings: self.settings,
        };
        let runner = tokio::spawn(drive(ctx, kind));
        self.board.attach_runner(id, runner);

        info!(
            collaboration_id = %id,
            strategy = %kind,
            participants = participant_count,
            leader = %leader,
            "Collaboration created"
        );
        Ok(snapshot)
    }
}

/// Run the strategy, then mark the collaboration completed whatever happened.
async fn drive(ctx: StrategyContext, kind: StrategyKind) {
    let id = ctx.collaboration.lock().id;
    info!(collaboration_id = %id, strategy = %kind, "Starting collaboration");

    let outcome = match kind {
        StrategyKind::Sequential => run_sequential(&ctx).await,
        StrategyKind::Parallel => run_parallel(&ctx).await,
        StrategyKind::Voting => run_voting(&ctx).await,
        StrategyKind::Consensus => run_consensus(&ctx).await,
    };

    let mut c = ctx.collaboration.lock();
    c.status = CollaborationStatus::Completed;
    c.completed_at = Some(Utc::now());
    c.interrupted = outcome == RunOutcome::Interrupted;
    if c.interrupted {
        warn!(collaboration_id = %id, strategy = %kind, "Collaboration interrupted");
    } else {
        info!(collaboration_id = %id, strategy = %kind, messages = c.messages.len(), "Collaboration completed");
    }
}
