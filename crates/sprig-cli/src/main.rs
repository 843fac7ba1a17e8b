//! sprig CLI - autonomous sprint supervisor
//!
//! Usage:
//!   sprig init                      Write default config and a starter sprint
//!   sprig start                     Run the supervisor loop
//!   sprig status                    Show the active sprint
//!   sprig report [--save]           Print (or save) a sprint report
//!   sprig approve                   Create the manual approval flag
//!   sprig approve --command <cmd>   Dry-run the policy on a command
//!   sprig unblock                   Clear ERROR_HALT / WAITING_USER

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sprig_agent::{AnthropicClient, PlanGenerator, StandardsLibrary};
use sprig_backlog::BacklogStore;
use sprig_core::{ShellRunner, SprigConfig, SprintStatus};
use sprig_git::{GitCommand, GitExecutor};
use sprig_policy::{ApprovalEngine, ApprovalResult};
use sprig_supervisor::{ApprovalSignal, RunOptions, RunOutcome, Supervisor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const STARTER_SPRINT: &str = "# Current Sprint: Sprint 1
**Objective**: Describe what this sprint delivers
**Status**: PLANNING

## 📋 Backlog
- [ ] Describe the first task
";

#[derive(Parser)]
#[command(name = "sprig")]
#[command(author, version, about = "Autonomous sprint supervisor")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON log lines and JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Project root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and a starter sprint document
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Run the supervisor loop
    Start {
        /// Override the configured retry budget per task
        #[arg(long)]
        max_retries: Option<usize>,

        /// Stop after this many iterations (0 = unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        max_iterations: usize,
    },

    /// Show the active sprint
    Status,

    /// Print a progress report
    Report {
        /// Also write it next to the sprint document
        #[arg(long)]
        save: bool,
    },

    /// Approve the next step, or dry-run the policy
    Approve {
        /// Evaluate a shell command
        #[arg(long, conflicts_with = "plan_file")]
        command: Option<String>,

        /// Evaluate a plan file
        #[arg(long, requires = "task_name")]
        plan_file: Option<PathBuf>,

        /// Task the plan belongs to
        #[arg(long)]
        task_name: Option<String>,
    },

    /// Move a halted or waiting sprint back to PLANNING
    Unblock,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json)?;

    match cli.command {
        Commands::Init { force } => cmd_init(&cli.root, force),
        Commands::Start {
            max_retries,
            max_iterations,
        } => cmd_start(&cli.root, max_retries, max_iterations).await,
        Commands::Status => cmd_status(&cli.root, cli.json),
        Commands::Report { save } => cmd_report(&cli.root, save),
        Commands::Approve {
            command,
            plan_file,
            task_name,
        } => cmd_approve(&cli.root, command, plan_file, task_name, cli.json),
        Commands::Unblock => cmd_unblock(&cli.root),
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

fn load_config(root: &Path) -> Result<SprigConfig> {
    SprigConfig::load_or_default(root)
        .with_context(|| format!("Failed to load configuration under {}", root.display()))
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    let config_path = SprigConfig::config_path(root);
    if config_path.exists() && !force {
        println!("Configuration already exists at {}", config_path.display());
    } else {
        let written = SprigConfig::write_default(root).context("Failed to write configuration")?;
        println!("Created {}", written.display());
    }

    let config = load_config(root)?;
    let sprint = config.active_document_path();
    if !sprint.exists() {
        if let Some(parent) = sprint.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&sprint, STARTER_SPRINT)?;
        println!("Created {}", sprint.display());
    }

    let queue = config.queue_dir_path();
    std::fs::create_dir_all(&queue)?;
    println!("Queue directory: {}", queue.display());

    println!("\nNext steps:");
    println!("  1. Edit {} with your objective and tasks", sprint.display());
    println!("  2. Run 'sprig start' to work through the backlog");
    println!("  3. Use 'sprig status' to check progress");
    Ok(())
}

/// Template planner, or a reasoning-backed one when enabled
fn build_planner(config: &mut SprigConfig) -> Result<PlanGenerator> {
    let standards = Arc::new(StandardsLibrary::new(config.standards_dir_path()));
    let planner = PlanGenerator::from_config(config).with_standards(standards);

    if !config.reasoning.enabled {
        info!("Reasoning disabled; using template plans");
        return Ok(planner);
    }

    config.reasoning.api_key = std::env::var(&config.reasoning.api_key_env).ok();
    let client = AnthropicClient::from_config(&config.reasoning)
        .context("Failed to configure the reasoning client")?;
    info!("Reasoning enabled with model {}", config.reasoning.model);
    Ok(planner.with_client(Arc::new(client)))
}

async fn cmd_start(root: &Path, max_retries: Option<usize>, max_iterations: usize) -> Result<()> {
    let mut config = load_config(root)?;
    if let Some(max_retries) = max_retries {
        config.supervisor.max_retries = max_retries;
    }
    let planner = build_planner(&mut config)?;
    let config = Arc::new(config);

    let git: Arc<dyn GitExecutor> = match GitCommand::detect(root).await {
        Ok(git) => Arc::new(git),
        Err(e) => {
            warn!("{}; checkpoint commits will be skipped", e);
            Arc::new(GitCommand::new(root))
        }
    };

    let mut supervisor = Supervisor::new(config.clone(), Arc::new(ShellRunner::new()), git)
        .context("Failed to build the supervisor")?
        .with_planner(planner);
    let store = BacklogStore::from_config(&config);

    let outcome = tokio::select! {
        outcome = supervisor.run(RunOptions { max_iterations }) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; marking the sprint {}", SprintStatus::WaitingUser);
            store
                .write_status(SprintStatus::WaitingUser)
                .context("Failed to record the interruption")?;
            return Ok(());
        }
    };

    match outcome {
        RunOutcome::Completed => {
            println!("All sprints completed.");
            Ok(())
        }
        RunOutcome::IterationLimit => {
            println!("Stopped after {} iterations.", max_iterations);
            Ok(())
        }
        RunOutcome::Halted { status, reason } => {
            bail!("Supervisor halted in {}: {}", status, reason)
        }
    }
}

fn cmd_status(root: &Path, json: bool) -> Result<()> {
    let config = load_config(root)?;
    let store = BacklogStore::from_config(&config);
    let doc = store
        .read()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;
    let approval_pending = ApprovalSignal::from_config(&config).is_present();

    if json {
        let status = serde_json::json!({
            "name": doc.name,
            "objective": doc.objective,
            "status": doc.status,
            "completed": doc.completed_tasks().len(),
            "total": doc.tasks.len(),
            "progress": doc.progress(),
            "next_task": doc.next_task().map(|t| t.name.clone()),
            "approval_flag": approval_pending,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("sprig Status");
    println!("============");
    println!("Sprint:    {}", doc.name);
    println!("Objective: {}", doc.objective);
    println!("Status:    {}", doc.status);
    println!(
        "Progress:  {}/{} tasks ({:.1}%)",
        doc.completed_tasks().len(),
        doc.tasks.len(),
        doc.progress()
    );
    match doc.next_task() {
        Some(task) => println!("Next task: {}", task.name),
        None => println!("Next task: none"),
    }
    if approval_pending {
        println!("\nApproval flag is set; the next plan will be auto-approved.");
    }
    if doc.status.needs_intervention() {
        println!("\nBlocked: run 'sprig approve' or 'sprig unblock' to continue.");
    }
    Ok(())
}

fn cmd_report(root: &Path, save: bool) -> Result<()> {
    let config = load_config(root)?;
    let store = BacklogStore::from_config(&config);
    let report = store
        .report()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    if save {
        let path = store
            .path()
            .parent()
            .map(|p| p.join("sprint_report.md"))
            .unwrap_or_else(|| PathBuf::from("sprint_report.md"));
        std::fs::write(&path, &report)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Report saved to {}", path.display());
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn cmd_approve(
    root: &Path,
    command: Option<String>,
    plan_file: Option<PathBuf>,
    task_name: Option<String>,
    json: bool,
) -> Result<()> {
    let config = load_config(root)?;

    let result = match (command, plan_file) {
        (Some(command), _) => {
            let engine = ApprovalEngine::from_config(&config.policy)?;
            engine.evaluate_command(&command)
        }
        (None, Some(plan_file)) => {
            let plan = std::fs::read_to_string(&plan_file)
                .with_context(|| format!("Failed to read {}", plan_file.display()))?;
            let engine = ApprovalEngine::from_config(&config.policy)?;
            engine.evaluate_plan(&plan, task_name.as_deref().unwrap_or_default())
        }
        (None, None) => {
            let signal = ApprovalSignal::from_config(&config);
            signal.grant().context("Failed to create the approval flag")?;
            println!("Approval flag created at {}", signal.path().display());
            return Ok(());
        }
    };

    print_approval(&result, json)
}

fn print_approval(result: &ApprovalResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("Decision: {}", result.decision);
    println!("Risk:     {}", result.risk_level);
    println!("Reason:   {}", result.reason);
    for check in &result.checks_passed {
        println!("  ✓ {}", check);
    }
    for check in &result.checks_failed {
        println!("  ✗ {}", check);
    }
    Ok(())
}

fn cmd_unblock(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let store = BacklogStore::from_config(&config);
    let doc = store
        .read()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    if !doc.status.needs_intervention() {
        println!("Sprint is {}; nothing to unblock.", doc.status);
        return Ok(());
    }

    store.write_status(SprintStatus::Planning)?;
    println!("Sprint moved from {} to {}.", doc.status, SprintStatus::Planning);
    Ok(())
}
