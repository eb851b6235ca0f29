use chrono::{DateTime, Utc};
use ensemble_core::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Specialization of an agent in the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Designs system architecture.
    Architect,
    /// Writes production code.
    Developer,
    /// Writes and runs tests.
    Tester,
    /// Audits for vulnerabilities.
    Security,
    /// Profiles and optimizes.
    Performance,
    /// Reviews code quality.
    Reviewer,
    /// Writes documentation.
    Documentor,
    /// Builds and deploys.
    DevOps,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::Architect => write!(f, "architect"),
            AgentType::Developer => write!(f, "developer"),
            AgentType::Tester => write!(f, "tester"),
            AgentType::Security => write!(f, "security"),
            AgentType::Performance => write!(f, "performance"),
            AgentType::Reviewer => write!(f, "reviewer"),
            AgentType::Documentor => write!(f, "documentor"),
            AgentType::DevOps => write!(f, "devops"),
        }
    }
}

/// A skill an agent can offer. Matched against [`Task::task_type`] when scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CodeGeneration,
    CodeReview,
    TestGeneration,
    SecurityAudit,
    PerformanceOptimization,
    Documentation,
    Architecture,
    Deployment,
    Debugging,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 9] = [
        Capability::CodeGeneration,
        Capability::CodeReview,
        Capability::TestGeneration,
        Capability::SecurityAudit,
        Capability::PerformanceOptimization,
        Capability::Documentation,
        Capability::Architecture,
        Capability::Deployment,
        Capability::Debugging,
    ];

    /// Wire name, identical to the task type it satisfies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CodeGeneration => "code_generation",
            Capability::CodeReview => "code_review",
            Capability::TestGeneration => "test_generation",
            Capability::SecurityAudit => "security_audit",
            Capability::PerformanceOptimization => "performance_optimization",
            Capability::Documentation => "documentation",
            Capability::Architecture => "architecture",
            Capability::Deployment => "deployment",
            Capability::Debugging => "debugging",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| EnsembleError::Validation(format!("unknown capability '{s}'")))
    }
}

/// A free-form expertise tag (language, framework or domain).
///
/// Tags are trimmed and lowercased on construction; empty tags and tags
/// containing whitespace are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpertiseTag(String);

impl ExpertiseTag {
    /// Validate and normalize a raw tag.
    pub fn parse(raw: &str) -> EnsembleResult<Self> {
        let tag = normalize_tag(raw);
        if tag.is_empty() {
            return Err(EnsembleError::Validation(
                "expertise tag must not be empty".to_string(),
            ));
        }
        if tag.chars().any(char::is_whitespace) {
            return Err(EnsembleError::Validation(format!(
                "expertise tag '{tag}' must not contain whitespace"
            )));
        }
        Ok(Self(tag))
    }

    /// The normalized tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExpertiseTag {
    type Error = EnsembleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExpertiseTag> for String {
    fn from(tag: ExpertiseTag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for ExpertiseTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalization shared by expertise tags and the task `language` input.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Per-agent execution limits and model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_concurrent_tasks: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: String,
    /// `json`, `markdown` or `plain`.
    #[serde(default = "default_response_format")]
    pub response_format: String,
}

fn default_response_format() -> String {
    "markdown".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 1,
            timeout_secs: 300,
            retry_attempts: 2,
            temperature: 0.7,
            max_tokens: 4096,
            system_prompt: String::new(),
            response_format: default_response_format(),
        }
    }
}

/// Availability of an agent for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Busy => write!(f, "busy"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Live state of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentStatus,
    pub current_tasks: Vec<Uuid>,
    pub last_active_at: DateTime<Utc>,
    pub error_count: u32,
    pub consecutive_errors: u32,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: AgentStatus::Idle,
            current_tasks: Vec::new(),
            last_active_at: Utc::now(),
            error_count: 0,
            consecutive_errors: 0,
        }
    }
}

/// Historical performance of an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_latency_ms: f64,
    /// Fraction of finished tasks that completed, in `[0, 1]`.
    pub success_rate: f64,
    /// 0–100.
    pub quality_score: f64,
    pub tokens_used: u64,
}

impl AgentPerformance {
    /// Count one finished task and recompute the success rate.
    pub fn record_outcome(&mut self, succeeded: bool) {
        if succeeded {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        let finished = self.tasks_completed + self.tasks_failed;
        self.success_rate = self.tasks_completed as f64 / finished as f64;
    }
}

/// A registered worker agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// A nil id is replaced with a fresh one on registration.
    pub id: Uuid,
    pub agent_type: AgentType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub expertise: Vec<ExpertiseTag>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub config: AgentConfig,
    #[serde(default)]
    pub state: AgentState,
    #[serde(default)]
    pub performance: AgentPerformance,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_type,
            name: name.into(),
            description: String::new(),
            capabilities: Vec::new(),
            expertise: Vec::new(),
            model: String::new(),
            config: AgentConfig::default(),
            state: AgentState::default(),
            performance: AgentPerformance::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// Parse and attach expertise tags. Fails on the first invalid tag.
    pub fn with_expertise<I, S>(mut self, tags: I) -> EnsembleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expertise = tags
            .into_iter()
            .map(|t| ExpertiseTag::parse(t.as_ref()))
            .collect::<EnsembleResult<_>>()?;
        Ok(self)
    }

    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.performance.success_rate = success_rate;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.as_str() == name)
    }

    pub fn has_expertise(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        self.expertise.iter().any(|e| e.as_str() == tag)
    }

    pub fn owns_task(&self, task_id: Uuid) -> bool {
        self.state.current_tasks.contains(&task_id)
    }

    /// Drop `task_id` from the current tasks; the agent goes idle once it owns none.
    /// Returns whether the task was owned.
    pub fn release_task(&mut self, task_id: Uuid) -> bool {
        let before = self.state.current_tasks.len();
        self.state.current_tasks.retain(|id| *id != task_id);
        let released = self.state.current_tasks.len() != before;
        if self.state.current_tasks.is_empty() && self.state.status == AgentStatus::Busy {
            self.state.status = AgentStatus::Idle;
        }
        released
    }
}

/// Lifecycle of a task. Declaration order is the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Review,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Assigned => 1,
            TaskStatus::InProgress => 2,
            TaskStatus::Review => 3,
            TaskStatus::Completed => 4,
            TaskStatus::Failed => 5,
            TaskStatus::Cancelled => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Forward-only; terminal states are never left.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Kind of artifact produced by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Document,
    Diagram,
    Test,
    Report,
}

/// An artifact attached to a task result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub name: String,
    pub content: String,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            content: content.into(),
            language: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Execution metrics reported with a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub execution_time_ms: f64,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub quality_score: f64,
    pub iterations: u32,
}

/// Output of a finished task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: serde_json::Value,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub metrics: TaskMetrics,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(output: impl Into<serde_json::Value>) -> Self {
        Self {
            output: output.into(),
            artifacts: Vec::new(),
            metrics: TaskMetrics::default(),
            completed_at: Utc::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: TaskMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }
}

/// Lowest and highest accepted task priority.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// A unit of work submitted to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Compared against capability names when scoring.
    pub task_type: String,
    pub description: String,
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub priority: u8,
    pub deadline: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    /// Failure reason once `status == Failed`.
    pub error: Option<String>,
    /// Set on sub-tasks dispatched by a collaboration.
    #[serde(default)]
    pub parent_task: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            description: description.into(),
            input: HashMap::new(),
            requirements: Vec::new(),
            priority: 5,
            deadline: None,
            assigned_to: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            parent_task: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// The `language` input, if present and a string.
    pub fn language(&self) -> Option<&str> {
        self.input.get("language").and_then(serde_json::Value::as_str)
    }

    /// A fresh pending sub-task carrying this task's type, input and priority.
    pub fn sub_task(&self, description: impl Into<String>) -> Task {
        let mut sub = Task::new(self.task_type.clone(), description);
        sub.input = self.input.clone();
        sub.requirements = self.requirements.clone();
        sub.priority = self.priority;
        sub.parent_task = Some(self.id);
        sub
    }

    /// Move to `next`, enforcing forward-only transitions.
    pub fn transition(&mut self, next: TaskStatus) -> EnsembleResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(EnsembleError::Validation(format!(
                "task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// How a collaboration coordinates its participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Sequential,
    Parallel,
    Voting,
    Consensus,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Sequential => write!(f, "sequential"),
            StrategyKind::Parallel => write!(f, "parallel"),
            StrategyKind::Voting => write!(f, "voting"),
            StrategyKind::Consensus => write!(f, "consensus"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(StrategyKind::Sequential),
            "parallel" => Ok(StrategyKind::Parallel),
            "voting" => Ok(StrategyKind::Voting),
            "consensus" => Ok(StrategyKind::Consensus),
            other => Err(EnsembleError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Strategy selection plus its tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationStrategy {
    pub kind: StrategyKind,
    #[serde(default)]
    pub phases: Vec<String>,
    #[serde(default)]
    pub voting_required: bool,
    #[serde(default)]
    pub min_votes: usize,
}

impl CollaborationStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            phases: Vec::new(),
            voting_required: kind == StrategyKind::Voting,
            min_votes: 0,
        }
    }

    pub fn with_min_votes(mut self, min_votes: usize) -> Self {
        self.min_votes = min_votes;
        self
    }

    pub fn with_phases(mut self, phases: Vec<String>) -> Self {
        self.phases = phases;
        self
    }
}

impl From<StrategyKind> for CollaborationStrategy {
    fn from(kind: StrategyKind) -> Self {
        Self::new(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Vote,
    Decision,
}

/// One entry in a collaboration's message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationMessage {
    pub id: Uuid,
    pub from: Uuid,
    /// Agent ids, or `"all"` for a broadcast.
    pub to: Vec<String>,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl CollaborationMessage {
    /// A message addressed to every participant.
    pub fn broadcast(from: Uuid, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to: vec!["all".to_string()],
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A proposal participants can vote on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingOption {
    pub id: Uuid,
    pub description: String,
    pub proposed_by: Uuid,
    pub content: String,
    pub score: f64,
}

/// Outcome of a voting round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingResult {
    pub id: Uuid,
    pub subject: String,
    pub options: Vec<VotingOption>,
    /// Agent id to chosen option id.
    pub votes: HashMap<Uuid, Uuid>,
    /// Agent id to free-text rationale.
    pub rationales: HashMap<Uuid, String>,
    pub winner: Uuid,
    pub confidence: f64,
    pub quorum_met: bool,
    pub timestamp: DateTime<Utc>,
}

/// How a consensus run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub rounds: usize,
    pub reached: bool,
}

/// A group of agents working jointly on one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub participants: Vec<Uuid>,
    pub leader: Uuid,
    pub task: Task,
    pub strategy: CollaborationStrategy,
    pub messages: Vec<CollaborationMessage>,
    /// Sub-tasks dispatched by the strategy, in dispatch order.
    #[serde(default)]
    pub sub_tasks: Vec<Uuid>,
    pub voting: Option<VotingResult>,
    pub consensus: Option<ConsensusOutcome>,
    pub status: CollaborationStatus,
    /// The run was cut short by cancellation.
    #[serde(default)]
    pub interrupted: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Collaboration {
    /// A fresh, active collaboration on `task`. `participants` should be ranked best first.
    pub fn new(
        task: Task,
        strategy: CollaborationStrategy,
        participants: Vec<Uuid>,
        leader: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("Collaboration for {}", task.description),
            description: task.description.clone(),
            participants,
            leader,
            task,
            strategy,
            messages: Vec::new(),
            sub_tasks: Vec::new(),
            voting: None,
            consensus: None,
            status: CollaborationStatus::Active,
            interrupted: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CollaborationStatus::Completed
    }
}
