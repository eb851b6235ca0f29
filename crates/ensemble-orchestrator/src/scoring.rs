use crate::types::{normalize_tag, Agent, Task};

/// Added when one of the agent's capabilities names the task type.
pub const CAPABILITY_WEIGHT: f64 = 0.5;
/// Added when the task's `language` input is one of the agent's expertise tags.
pub const EXPERTISE_WEIGHT: f64 = 0.3;
/// Multiplied by the agent's success rate.
pub const PERFORMANCE_WEIGHT: f64 = 0.2;
/// Applied to the whole score while the agent has consecutive errors.
pub const ERROR_PENALTY: f64 = 0.5;

/// Fitness of `agent` for `task`, in `[0, 1]`.
///
/// Recomputed on every call; nothing is cached.
pub fn score(agent: &Agent, task: &Task) -> f64 {
    let mut score = 0.0;

    if agent.has_capability(&task.task_type) {
        score += CAPABILITY_WEIGHT;
    }

    if let Some(language) = task.language() {
        let language = normalize_tag(language);
        if agent.expertise.iter().any(|tag| tag.as_str() == language) {
            score += EXPERTISE_WEIGHT;
        }
    }

    score += agent.performance.success_rate.clamp(0.0, 1.0) * PERFORMANCE_WEIGHT;

    if agent.state.consecutive_errors > 0 {
        score *= ERROR_PENALTY;
    }

    score
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{AgentType, Capability};

    fn developer() -> Agent {
        Agent::new("Dev", AgentType::Developer)
            .with_capabilities([Capability::CodeGeneration])
            .with_expertise(["go"])
            .unwrap()
            .with_success_rate(0.93)
    }

    fn go_task() -> Task {
        Task::new("code_generation", "Write a handler").with_input("language", "go")
    }

    #[test]
    fn test_full_match() {
        let s = score(&developer(), &go_task());
        assert!((s - 0.986).abs() < 1e-9, "score was {s}");
    }

    #[test]
    fn test_no_match_scores_zero() {
        let tester = Agent::new("Tester", AgentType::Tester)
            .with_capabilities([Capability::TestGeneration]);
        assert_eq!(score(&tester, &go_task()), 0.0);
    }

    #[test]
    fn test_expertise_is_case_insensitive() {
        let task = Task::new("code_generation", "x").with_input("language", "Go");
        let s = score(&developer(), &task);
        assert!((s - 0.986).abs() < 1e-9);
    }

    #[test]
    fn test_missing_language_skips_expertise() {
        let task = Task::new("code_generation", "x");
        let s = score(&developer(), &task);
        assert!((s - (0.5 + 0.186)).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_errors_halve_score() {
        let healthy = developer();
        let mut failing = developer();
        failing.state.consecutive_errors = 2;

        let task = go_task();
        assert!((score(&failing, &task) - score(&healthy, &task) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_bounded() {
        let mut agent = Agent::new("Over", AgentType::Developer)
            .with_capabilities(Capability::ALL)
            .with_expertise(["go", "rust"])
            .unwrap();
        agent.performance.success_rate = 7.0;

        for task_type in ["code_generation", "debugging", "unknown"] {
            for language in ["go", "cobol"] {
                let task = Task::new(task_type, "x").with_input("language", language);
                let s = score(&agent, &task);
                assert!((0.0..=1.0).contains(&s), "{task_type}/{language}: {s}");
            }
        }

        agent.performance.success_rate = -1.0;
        assert!(score(&agent, &Task::new("none", "x")) >= 0.0);
    }
}
