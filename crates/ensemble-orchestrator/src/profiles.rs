use crate::types::{Agent, AgentConfig, AgentType, Capability};
use ensemble_core::EnsembleResult;

/// The eight specialized agents every ensemble starts with, idle and with
/// seeded performance numbers.
pub fn default_agents() -> EnsembleResult<Vec<Agent>> {
    Ok(vec![
        architect_agent()?,
        developer_agent()?,
        tester_agent()?,
        security_agent()?,
        performance_agent()?,
        reviewer_agent()?,
        documentor_agent()?,
        devops_agent()?,
    ])
}

struct Profile {
    agent_type: AgentType,
    name: &'static str,
    description: &'static str,
    capabilities: &'static [Capability],
    expertise: &'static [&'static str],
    model: &'static str,
    max_concurrent_tasks: u32,
    timeout_secs: u64,
    retry_attempts: u32,
    temperature: f32,
    max_tokens: u32,
    system_prompt: &'static str,
    success_rate: f64,
    quality_score: f64,
}

fn build(profile: Profile) -> EnsembleResult<Agent> {
    let mut agent = Agent::new(profile.name, profile.agent_type)
        .with_description(profile.description)
        .with_capabilities(profile.capabilities.iter().copied())
        .with_expertise(profile.expertise.iter().copied())?
        .with_success_rate(profile.success_rate);
    agent.model = profile.model.to_string();
    agent.config = AgentConfig {
        max_concurrent_tasks: profile.max_concurrent_tasks,
        timeout_secs: profile.timeout_secs,
        retry_attempts: profile.retry_attempts,
        temperature: profile.temperature,
        max_tokens: profile.max_tokens,
        system_prompt: profile.system_prompt.to_string(),
        ..AgentConfig::default()
    };
    agent.performance.quality_score = profile.quality_score;
    Ok(agent)
}

fn architect_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Architect,
        name: "System Architect",
        description: "Designs system architecture and makes high-level technical decisions",
        capabilities: &[
            Capability::Architecture,
            Capability::CodeReview,
            Capability::Documentation,
        ],
        expertise: &[
            "microservices",
            "distributed-systems",
            "cloud-architecture",
            "design-patterns",
            "scalability",
            "system-design",
        ],
        model: "claude-3-opus",
        max_concurrent_tasks: 3,
        timeout_secs: 300,
        retry_attempts: 2,
        temperature: 0.3,
        max_tokens: 4000,
        system_prompt: ARCHITECT_PROMPT,
        success_rate: 0.95,
        quality_score: 92.0,
    })
}

fn developer_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Developer,
        name: "Senior Developer",
        description: "Writes high-quality, production-ready code",
        capabilities: &[
            Capability::CodeGeneration,
            Capability::Debugging,
            Capability::CodeReview,
        ],
        expertise: &[
            "golang",
            "python",
            "javascript",
            "typescript",
            "react",
            "nodejs",
            "postgresql",
            "redis",
            "rest-api",
            "graphql",
            "microservices",
        ],
        model: "gpt-4-turbo",
        max_concurrent_tasks: 5,
        timeout_secs: 180,
        retry_attempts: 3,
        temperature: 0.2,
        max_tokens: 8000,
        system_prompt: DEVELOPER_PROMPT,
        success_rate: 0.93,
        quality_score: 89.0,
    })
}

fn tester_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Tester,
        name: "QA Engineer",
        description: "Creates comprehensive tests and ensures code quality",
        capabilities: &[Capability::TestGeneration, Capability::Debugging],
        expertise: &[
            "unit-testing",
            "integration-testing",
            "e2e-testing",
            "jest",
            "pytest",
            "go-testing",
            "cypress",
            "test-coverage",
            "tdd",
            "bdd",
            "mocking",
        ],
        model: "claude-3-sonnet",
        max_concurrent_tasks: 4,
        timeout_secs: 120,
        retry_attempts: 2,
        temperature: 0.1,
        max_tokens: 6000,
        system_prompt: TESTER_PROMPT,
        success_rate: 0.94,
        quality_score: 91.0,
    })
}

fn security_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Security,
        name: "Security Expert",
        description: "Identifies vulnerabilities and ensures security best practices",
        capabilities: &[Capability::SecurityAudit, Capability::CodeReview],
        expertise: &[
            "owasp",
            "security-scanning",
            "penetration-testing",
            "authentication",
            "authorization",
            "encryption",
            "sql-injection",
            "xss",
            "csrf",
            "compliance",
        ],
        model: "gpt-4",
        max_concurrent_tasks: 3,
        timeout_secs: 240,
        retry_attempts: 2,
        temperature: 0.1,
        max_tokens: 6000,
        system_prompt: SECURITY_PROMPT,
        success_rate: 0.96,
        quality_score: 94.0,
    })
}

fn performance_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Performance,
        name: "Performance Engineer",
        description: "Optimizes code and system performance",
        capabilities: &[Capability::PerformanceOptimization, Capability::CodeReview],
        expertise: &[
            "profiling",
            "optimization",
            "caching",
            "database-tuning",
            "load-testing",
            "benchmarking",
            "scalability",
            "memory-management",
            "concurrency",
            "async-programming",
        ],
        model: "claude-3-opus",
        max_concurrent_tasks: 3,
        timeout_secs: 180,
        retry_attempts: 2,
        temperature: 0.2,
        max_tokens: 6000,
        system_prompt: PERFORMANCE_PROMPT,
        success_rate: 0.92,
        quality_score: 90.0,
    })
}

fn reviewer_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Reviewer,
        name: "Senior Code Reviewer",
        description: "Performs thorough code reviews and provides feedback",
        capabilities: &[Capability::CodeReview, Capability::Documentation],
        expertise: &[
            "code-quality",
            "best-practices",
            "design-patterns",
            "clean-code",
            "solid-principles",
            "dry",
            "kiss",
            "code-smells",
            "refactoring",
            "maintainability",
        ],
        model: "claude-3-sonnet",
        max_concurrent_tasks: 5,
        timeout_secs: 120,
        retry_attempts: 2,
        temperature: 0.2,
        max_tokens: 6000,
        system_prompt: REVIEWER_PROMPT,
        success_rate: 0.95,
        quality_score: 93.0,
    })
}

fn documentor_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::Documentor,
        name: "Technical Writer",
        description: "Creates comprehensive documentation and guides",
        capabilities: &[Capability::Documentation],
        expertise: &[
            "api-documentation",
            "user-guides",
            "architecture-docs",
            "readme",
            "tutorials",
            "openapi",
            "markdown",
            "diagrams",
            "technical-writing",
        ],
        model: "gpt-4",
        max_concurrent_tasks: 4,
        timeout_secs: 180,
        retry_attempts: 2,
        temperature: 0.3,
        max_tokens: 8000,
        system_prompt: DOCUMENTOR_PROMPT,
        success_rate: 0.94,
        quality_score: 91.0,
    })
}

fn devops_agent() -> EnsembleResult<Agent> {
    build(Profile {
        agent_type: AgentType::DevOps,
        name: "DevOps Engineer",
        description: "Handles deployment, infrastructure, and operations",
        capabilities: &[Capability::Deployment, Capability::Documentation],
        expertise: &[
            "kubernetes",
            "docker",
            "ci-cd",
            "terraform",
            "ansible",
            "github-actions",
            "monitoring",
            "logging",
            "istio",
            "argocd",
            "helm",
        ],
        model: "claude-3-opus",
        max_concurrent_tasks: 4,
        timeout_secs: 240,
        retry_attempts: 3,
        temperature: 0.2,
        max_tokens: 6000,
        system_prompt: DEVOPS_PROMPT,
        success_rate: 0.93,
        quality_score: 92.0,
    })
}

const ARCHITECT_PROMPT: &str = "\
You are the System Architect of a multi-agent engineering ensemble. \
You design distributed systems and choose technologies.

Rules:
1. Propose architectures that scale, fail gracefully and stay secure.
2. Name the trade-offs behind every technology recommendation.
3. Call out architectural risks together with a mitigation.
4. Produce architecture documentation other agents can build from.
5. Review designs from other agents for feasibility.
";

const DEVELOPER_PROMPT: &str = "\
You are the Senior Developer of a multi-agent engineering ensemble. \
You write production code in Go, Python and TypeScript, against \
PostgreSQL and Redis, behind REST or GraphQL APIs.

Rules:
1. Follow the idioms of the target language.
2. Handle and validate errors explicitly.
3. Consider edge cases and performance.
4. Comment only logic that is not obvious.
5. Deliver code that is ready to merge.
";

const TESTER_PROMPT: &str = "\
You are the QA Engineer of a multi-agent engineering ensemble. \
You write unit, integration and end-to-end tests.

Rules:
1. Cover happy paths, edge cases and failure modes.
2. Keep tests independent and deterministic.
3. Mock external dependencies at their boundary.
4. Report coverage gaps you could not close.
";

const SECURITY_PROMPT: &str = "\
You are the Security Expert of a multi-agent engineering ensemble. \
You audit code and designs against the OWASP Top 10.

Rules:
1. Look for injection, XSS, CSRF and broken access control.
2. Check authentication, authorization and encryption choices.
3. Rate every finding by severity and give a concrete fix.
4. Flag compliance concerns explicitly.
";

const PERFORMANCE_PROMPT: &str = "\
You are the Performance Engineer of a multi-agent engineering ensemble. \
You profile, benchmark and optimize.

Rules:
1. Measure before proposing a change.
2. Prefer algorithmic wins over micro-optimizations.
3. Consider caching, database tuning and concurrency.
4. State the expected gain of each optimization.
";

const REVIEWER_PROMPT: &str = "\
You are the Senior Code Reviewer of a multi-agent engineering ensemble. \
You review changes for quality and maintainability.

Rules:
1. Check correctness first, style last.
2. Point out code smells with a suggested refactoring.
3. Hold changes to SOLID, DRY and KISS.
4. Be specific and constructive.
";

const DOCUMENTOR_PROMPT: &str = "\
You are the Technical Writer of a multi-agent engineering ensemble. \
You write API references, guides and READMEs.

Rules:
1. Write for the reader who has not seen the code.
2. Include runnable examples.
3. Keep OpenAPI and architecture docs in sync with the implementation.
";

const DEVOPS_PROMPT: &str = "\
You are the DevOps Engineer of a multi-agent engineering ensemble. \
You build pipelines and run infrastructure on Kubernetes.

Rules:
1. Describe infrastructure as code (Terraform, Helm).
2. Automate build, test and deploy in CI/CD.
3. Ship monitoring and logging with every service.
4. Plan rollbacks before rollouts.
";
