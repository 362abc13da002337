//! ralph — agent loop orchestrator
//!
//! Usage:
//!   ralph run                      → drive the loop in the current directory
//!   ralph run --prd PRD.md         → use the markdown checklist tracker
//!   ralph resume --continue        → restore the last session and keep going
//!   ralph status                   → show the last session snapshot
//!   ralph setup                    → print plugin setup questions
//!   ralph config show              → print the effective configuration
//!   ralph plugins agents|trackers  → list installed plugins

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ralph_core::{EngineEvent, Error, RalphConfig, SessionConfig, TaskFilter};
use ralph_engine::{audit_path, read_snapshot, snapshot_path, AuditLog, Engine, EngineParams};
use ralph_plugins::{ExecOptions, PluginRegistry};

#[derive(Parser)]
#[command(
    name = "ralph",
    about = "Agent loop orchestrator — drives an AI coding CLI over a task tracker",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent loop
    Run(RunArgs),
    /// Restore the previous session (held paused unless --continue)
    Resume {
        #[command(flatten)]
        run: RunArgs,
        /// Re-enter the loop immediately instead of just restoring
        #[arg(long = "continue", default_value_t = false)]
        continue_: bool,
    },
    /// Show the last session snapshot
    Status {
        /// Working directory (default: current)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Print the setup questions for the selected plugins
    Setup {
        /// Agent runner plugin id
        #[arg(long)]
        agent: Option<String>,
        /// Tracker plugin id
        #[arg(long)]
        tracker: Option<String>,
    },
    /// Configuration inspection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Plugin listings
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show {
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// List agent runner plugins
    Agents,
    /// List tracker plugins
    Trackers,
}

#[derive(Args)]
struct RunArgs {
    /// Only work on tasks under this epic / parent id
    #[arg(long)]
    epic: Option<String>,

    /// PRD markdown file (implies the markdown tracker)
    #[arg(long)]
    prd: Option<PathBuf>,

    /// Agent runner plugin id
    #[arg(long)]
    agent: Option<String>,

    /// Model override passed to the vendor CLI
    #[arg(long)]
    model: Option<String>,

    /// Tracker plugin id
    #[arg(long)]
    tracker: Option<String>,

    /// Iteration cap (0 = unlimited)
    #[arg(long)]
    iterations: Option<u32>,

    /// Suppress console event echo
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Skip setup-answer validation
    #[arg(long, default_value_t = false)]
    no_setup: bool,

    /// Take over a live session lock
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Working directory (default: current)
    #[arg(long)]
    cwd: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args, false).await,
        Commands::Resume { run, continue_ } => {
            if continue_ {
                cmd_run(run, true).await
            } else {
                // Restored-as-paused default: show what would resume.
                cmd_status(run.cwd).await
            }
        }
        Commands::Status { cwd } => cmd_status(cwd).await,
        Commands::Setup { agent, tracker } => cmd_setup(agent, tracker),
        Commands::Config {
            command: ConfigCommands::Show { cwd },
        } => cmd_config_show(cwd),
        Commands::Plugins { command } => cmd_plugins(command),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ralph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_cwd(cwd: Option<PathBuf>) -> Result<PathBuf, Error> {
    match cwd {
        Some(p) => Ok(p),
        None => std::env::current_dir().map_err(Error::Io),
    }
}

async fn cmd_run(args: RunArgs, resume: bool) -> Result<(), Error> {
    let cwd = resolve_cwd(args.cwd)?;
    let config = RalphConfig::load(&cwd.join("ralph.toml"));

    let agent_id = args.agent.unwrap_or_else(|| config.agent.plugin.clone());
    let tracker_id = if args.prd.is_some() {
        "markdown".to_string()
    } else {
        args.tracker.unwrap_or_else(|| config.tracker.plugin.clone())
    };

    let registry = PluginRegistry::with_builtins();
    let runner = registry.runner(&agent_id)?;
    let agent_answers = config.plugin_answers(&agent_id);
    if !args.no_setup {
        registry.validate_runner_setup(&agent_id, &agent_answers)?;
    }

    let mut tracker_answers = config.plugin_answers(&tracker_id);
    let tracker_path = args.prd.clone().or_else(|| config.tracker.path.clone());
    if let Some(path) = &tracker_path {
        tracker_answers.insert(
            "path".to_string(),
            serde_json::Value::String(path.display().to_string()),
        );
    }
    let tracker = registry.create_tracker(&tracker_id, &tracker_answers)?;

    let mut session = SessionConfig::new(&cwd, &agent_id, &tracker_id);
    session.agent_config = agent_answers.clone();
    session.tracker_config = tracker_answers;
    if resume {
        // Keep the restored session's identity so the audit trail lines up,
        // and re-enter the loop without waiting for an explicit start.
        if let Ok(snap) = read_snapshot(&snapshot_path(&cwd)).await {
            session.id = snap.session_id;
        }
        session.resume = ralph_core::ResumePolicy::Running;
    }

    let mut tuning = config.engine.clone();
    if let Some(n) = args.iterations {
        tuning.iterations = n;
    }
    session.iteration_cap = tuning.iterations;

    let template = match &config.prompt.template_path {
        Some(path) => Some(std::fs::read_to_string(path).map_err(Error::Io)?),
        None => config.prompt.template.clone(),
    };

    let mut filter = TaskFilter::default();
    if let Some(epic) = args.epic {
        filter.parent = Some(epic);
    }

    let mut exec_options = ExecOptions::new(&cwd);
    exec_options.model = args.model.or_else(|| config.agent.model.clone());
    exec_options.reasoning_effort = config.agent.reasoning_effort.clone();
    exec_options.binary = config.agent.binary.clone();
    exec_options.answers = agent_answers;
    if runner.meta().capabilities.file_context {
        if let Some(prd) = &args.prd {
            exec_options.files.push(prd.clone());
        }
    }

    let (audit, audit_writer) = AuditLog::open(audit_path(&cwd), &session.id);
    let params = EngineParams {
        session,
        tuning,
        template,
        filter,
        exec_options,
        force_lock: args.force,
    };
    let (mut engine, controller) = Engine::new(params, runner, tracker, audit);

    let echo = if args.headless {
        None
    } else {
        Some(tokio::spawn(echo_events(engine.subscribe("console"))))
    };

    // Ctrl-C: graceful stop; a second one forces.
    let sig_controller = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping (ctrl-c again to force)...");
            sig_controller.stop(false).await;
            if tokio::signal::ctrl_c().await.is_ok() {
                sig_controller.stop(true).await;
            }
        }
    });

    let run_task = tokio::spawn(engine.run());
    controller.start().await;
    drop(controller);

    let result = run_task.await.map_err(|e| Error::Internal(e.to_string()))?;
    if let Some(echo) = echo {
        let _ = echo.await;
    }
    let _ = audit_writer.await;

    let history = result?;
    let completed = history
        .iter()
        .filter(|i| i.outcome == ralph_core::IterationOutcome::Completed)
        .count();
    println!("{} iteration(s), {} completed", history.len(), completed);
    Ok(())
}

async fn echo_events(mut rx: tokio::sync::mpsc::Receiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::StateChanged { to, .. } => println!("state: {to}"),
            EngineEvent::IterationStarted { iteration, task } => {
                let title = task.map(|t| t.title).unwrap_or_default();
                println!("iteration {iteration}: {title}");
            }
            EngineEvent::DetectorFired { signal, .. } => println!("detected: {}", signal.name()),
            EngineEvent::RateLimitCountdown { remaining_secs } => {
                println!("rate limited, retrying in {remaining_secs}s");
            }
            EngineEvent::IterationFinished { iteration } => {
                println!("iteration {} → {}", iteration.number, iteration.outcome);
            }
            EngineEvent::TaskUpdated { task } => println!("task {} → {}", task.id, task.status),
            EngineEvent::FatalError { kind, message, hint } => {
                println!("fatal [{kind}]: {message}");
                if let Some(hint) = hint {
                    println!("hint: {hint}");
                }
            }
            EngineEvent::EventsDropped { count } => {
                println!("(console lagged, {count} events dropped)");
            }
            // Raw output chunks and subagent churn stay off the console.
            _ => {}
        }
    }
}

async fn cmd_status(cwd: Option<PathBuf>) -> Result<(), Error> {
    let cwd = resolve_cwd(cwd)?;
    let path = snapshot_path(&cwd);
    let snap = read_snapshot(&path)
        .await
        .map_err(|_| Error::Internal(format!("no session snapshot at {}", path.display())))?;
    println!("session:    {}", snap.session_id);
    println!("cwd:        {}", snap.cwd.display());
    println!("state:      {}", snap.state);
    println!("iterations: {}", snap.iterations);
    if let Some(outcome) = snap.last_outcome {
        println!("last:       {outcome}");
    }
    if let Some(task) = snap.last_task_id {
        println!("last task:  {task}");
    }
    println!("saved:      {}", snap.saved_at.to_rfc3339());
    Ok(())
}

fn cmd_setup(agent: Option<String>, tracker: Option<String>) -> Result<(), Error> {
    let registry = PluginRegistry::with_builtins();
    let agent_id = agent.unwrap_or_else(|| "claude".to_string());
    let runner = registry.runner(&agent_id)?;
    println!("# {} ({})", runner.meta().display_name, agent_id);
    for q in runner.setup_questions() {
        println!("{}", serde_json::to_string_pretty(&q)?);
    }
    if let Some(tracker_id) = tracker {
        let tracker = registry.create_tracker(&tracker_id, &Default::default())?;
        println!("# {} ({})", tracker.meta().display_name, tracker_id);
        for q in tracker.setup_questions() {
            println!("{}", serde_json::to_string_pretty(&q)?);
        }
    }
    Ok(())
}

fn cmd_config_show(cwd: Option<PathBuf>) -> Result<(), Error> {
    let cwd = resolve_cwd(cwd)?;
    let config = RalphConfig::load(&cwd.join("ralph.toml"));
    print!("{}", config.to_toml());
    Ok(())
}

fn cmd_plugins(command: PluginCommands) -> Result<(), Error> {
    let registry = PluginRegistry::with_builtins();
    match command {
        PluginCommands::Agents => {
            for meta in registry.runner_metas() {
                println!(
                    "{:<10} {:<16} binary={} dialect={}",
                    meta.id, meta.display_name, meta.default_binary, meta.dialect
                );
            }
        }
        PluginCommands::Trackers => {
            for meta in registry.tracker_metas() {
                println!(
                    "{:<10} {:<24} sync={}",
                    meta.id, meta.display_name, meta.supports_sync
                );
            }
        }
    }
    Ok(())
}
