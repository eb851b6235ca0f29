mod config;

use clap::{Parser, Subcommand};
use ensemble_core::InMemoryBus;
use ensemble_orchestrator::{default_agents, Orchestrator, StrategyKind, Task, TaskStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ensemble", about = "Ensemble multi-agent task orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ensemble.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run simulated agents through a handful of tasks and one collaboration
    Demo {
        /// Collaboration strategy: sequential, parallel, voting or consensus
        #[arg(short, long, default_value = "voting")]
        strategy: StrategyKind,
        /// Simulated agent latency in milliseconds (overrides config)
        #[arg(long)]
        latency_ms: Option<u64>,
    },
    /// List the default agent profiles
    Profiles,
    /// Validate the config file and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            strategy,
            latency_ms,
        } => {
            let mut settings = config::load_or_default(&cli.config)?.orchestrator;
            settings.simulation.enabled = true;
            if let Some(latency_ms) = latency_ms {
                settings.simulation.latency_ms = latency_ms;
            }
            run_demo(settings, strategy).await?;
        }
        Commands::Profiles => {
            let agents = default_agents()?;
            println!("Default agent profiles:");
            for agent in &agents {
                let capabilities: Vec<String> =
                    agent.capabilities.iter().map(ToString::to_string).collect();
                println!("  {} ({}) - {}", agent.name, agent.agent_type, agent.description);
                println!("    model: {}", agent.model);
                println!("    capabilities: {}", capabilities.join(", "));
                println!(
                    "    success rate: {:.2}, max concurrent tasks: {}",
                    agent.performance.success_rate, agent.config.max_concurrent_tasks
                );
            }
            println!("\nTotal: {} profile(s)", agents.len());
        }
        Commands::CheckConfig => {
            let parsed = config::parse_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&parsed)?);
            info!(path = %cli.config.display(), "Config is valid");
        }
    }

    Ok(())
}

async fn run_demo(
    settings: ensemble_orchestrator::OrchestratorConfig,
    strategy: StrategyKind,
) -> anyhow::Result<()> {
    let bus = Arc::new(InMemoryBus::new());
    let orchestrator = Orchestrator::new(settings, bus)?;

    for agent in default_agents()? {
        orchestrator.register_agent(agent).await?;
    }
    orchestrator.start()?;

    let tasks = [
        Task::new("code_generation", "Implement the user login endpoint")
            .with_input("language", "go")
            .with_priority(8),
        Task::new("test_generation", "Write unit tests for the login endpoint"),
        Task::new("security_audit", "Audit the authentication flow").with_priority(9),
        Task::new("documentation", "Document the public API"),
    ];

    let mut submitted = Vec::with_capacity(tasks.len());
    for task in tasks {
        submitted.push(orchestrator.submit_task(task).await?);
    }

    // Simulated agents finish within their latency; leave room for queueing.
    let wait = Duration::from_millis(orchestrator.config().simulation.latency_ms * 4 + 5_000);
    for task_id in &submitted {
        match tokio::time::timeout(wait, orchestrator.wait_for_completion(*task_id)).await {
            Ok(Ok(status)) => info!(task_id = %task_id, %status, "Task finished"),
            Ok(Err(e)) => warn!(task_id = %task_id, error = %e, "Task lookup failed"),
            Err(_) => warn!(task_id = %task_id, "Task still running"),
        }
    }

    let review = Task::new("code_review", "Review the login endpoint before release")
        .with_input("language", "go");
    let collaboration = orchestrator.create_collaboration(review, strategy)?;
    info!(
        collaboration_id = %collaboration.id,
        %strategy,
        participants = collaboration.participants.len(),
        "Collaboration started"
    );
    wait_for_collaboration(&orchestrator, collaboration.id, wait).await;

    let done = orchestrator.get_collaboration(collaboration.id)?;
    println!("{}", serde_json::to_string_pretty(&done)?);
    println!("{}", serde_json::to_string_pretty(&orchestrator.status_report())?);

    let failed = orchestrator
        .list_tasks()
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    if failed > 0 {
        warn!(failed, "Some tasks failed");
    }

    orchestrator.shutdown().await;
    Ok(())
}

async fn wait_for_collaboration(orchestrator: &Orchestrator, id: Uuid, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        match orchestrator.get_collaboration(id) {
            Ok(c) if c.is_completed() => return,
            Ok(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            Err(e) => {
                warn!(collaboration_id = %id, error = %e, "Collaboration lookup failed");
                return;
            }
        }
    }
    warn!(collaboration_id = %id, "Collaboration did not finish in time");
}
