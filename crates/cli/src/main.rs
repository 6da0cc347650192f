// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gaffer - a foreman for agent crews: plans in, merged branches out.

mod output;
mod plan;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gf_adapters::backend::{new_backend, BackendConfig, BackendError};
use gf_adapters::ProcessManager;
use gf_core::Config;
use gf_engine::{
    BackendFactory, Dag, QaChannel, Runner, RunnerConfig, RunnerError, WorkflowManager,
    WorktreeManager,
};
use gf_storage::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Grace period between the first termination signal and forced exit.
const SHUTDOWN_WINDOW: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "gaffer",
    version,
    about = "Gaffer - multi-agent plan orchestrator"
)]
struct Cli {
    /// Change to <dir> before doing anything
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan against the current repository
    Run(RunArgs),
    /// Validate a plan and print its execution order
    Validate(ValidateArgs),
    /// Resume an interrupted run from the state database
    Resume(ResumeArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Plan file (TOML)
    #[arg(long, value_name = "FILE")]
    plan: PathBuf,

    /// Base branch that worktrees merge back into
    #[arg(long, default_value = "main")]
    base: String,

    /// Maximum concurrently running tasks
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Print the execution order without running anything
    #[arg(long)]
    dry_run: bool,

    /// State database (defaults to the user data directory)
    #[arg(long, value_name = "FILE")]
    state_db: Option<PathBuf>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Plan file (TOML)
    #[arg(long, value_name = "FILE")]
    plan: PathBuf,
}

#[derive(Args)]
struct ResumeArgs {
    /// Base branch that worktrees merge back into
    #[arg(long, default_value = "main")]
    base: String,

    /// Maximum concurrently running tasks
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// State database (defaults to the user data directory)
    #[arg(long, value_name = "FILE")]
    state_db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GAFFER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gf=info,gaffer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("cannot change to {}", dir.display()))?;
    }

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate(args) => validate(args),
        Commands::Resume(args) => resume(args).await,
    }
}

fn validate(args: ValidateArgs) -> Result<()> {
    let tasks = plan::load_plan(&args.plan)?;
    let dag = Dag::from_tasks(tasks)?;
    println!("plan is valid; execution order:");
    for id in dag.order() {
        println!("  {id}");
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let tasks = plan::load_plan(&args.plan)?;
    let dag = Dag::from_tasks(tasks)?;

    if args.dry_run {
        for id in dag.order() {
            println!("{id}");
        }
        return Ok(());
    }

    let runner = build_runner(dag, &args.base, args.concurrency, args.state_db)?;
    let token = root_token(runner.process_manager().clone());
    let printer = output::spawn_printer(runner.bus().subscribe_all(256));

    let outcome = runner.run(&token).await;
    runner.bus().close();
    let _ = printer.await;

    finish(outcome)
}

async fn resume(args: ResumeArgs) -> Result<()> {
    let runner = build_runner(Dag::new(), &args.base, args.concurrency, args.state_db)?;
    let token = root_token(runner.process_manager().clone());
    let printer = output::spawn_printer(runner.bus().subscribe_all(256));

    let outcome = runner.resume(&token).await;
    runner.bus().close();
    let _ = printer.await;

    finish(outcome)
}

fn finish(outcome: Result<Vec<gf_engine::TaskResult>, RunnerError>) -> Result<()> {
    match outcome {
        Ok(results) => {
            output::print_summary(&results);
            if results.iter().any(|r| r.error.is_some()) {
                bail!("some tasks failed");
            }
            Ok(())
        }
        Err(RunnerError::Cancelled) => bail!("run cancelled"),
        Err(e) => Err(e.into()),
    }
}

fn build_runner(
    dag: Dag,
    base: &str,
    concurrency: usize,
    state_db: Option<PathBuf>,
) -> Result<Runner> {
    let repo_root = std::env::current_dir().context("cannot resolve working directory")?;
    let config = Config::load(&repo_root)?;
    let pm = ProcessManager::new();

    let mut runner = Runner::new(
        dag,
        WorktreeManager::new(&repo_root, base),
        backend_factory(config.clone(), pm.clone()),
        RunnerConfig {
            concurrency,
            ..RunnerConfig::default()
        },
    )
    .with_process_manager(pm)
    .with_workflows(WorkflowManager::from_config(&config))
    .with_qa(headless_qa(concurrency));

    let db_path = state_db.or_else(Config::default_state_db_path);
    if let Some(path) = db_path {
        runner = runner.with_store(Arc::new(
            Store::open(&path)
                .with_context(|| format!("cannot open state db {}", path.display()))?,
        ));
    } else {
        tracing::warn!("no data directory found; running without checkpoints");
    }

    Ok(runner)
}

/// Question channel for a headless run: log the question, answer with a
/// standing instruction. Capacity is twice the concurrency so a slow
/// answer never blocks other askers.
fn headless_qa(concurrency: usize) -> Arc<QaChannel> {
    Arc::new(QaChannel::new(
        concurrency * 2,
        Arc::new(|task_id, question| {
            Box::pin(async move {
                tracing::info!(task = %task_id, question = %question, "agent question (auto-acknowledged)");
                "No operator is attached; use your best judgment and record \
                 the decision in your final summary."
                    .to_string()
            })
        }),
    ))
}

/// Map each task's role through the config to a concrete backend.
fn backend_factory(config: Config, pm: ProcessManager) -> BackendFactory {
    Arc::new(move |task, work_dir, session| {
        let agent = config.agents.get(&task.role).ok_or_else(|| {
            BackendError::InvalidConfig(format!("no agent configured for role {:?}", task.role))
        })?;
        let provider = config.providers.get(&agent.provider).ok_or_else(|| {
            BackendError::InvalidConfig(format!(
                "agent {:?} references unknown provider {:?}",
                task.role, agent.provider
            ))
        })?;

        let mut cfg = BackendConfig::new(provider.backend_type, work_dir);
        cfg.command = Some(provider.command.clone());
        cfg.args = provider.args.clone();
        cfg.session_id = session;
        cfg.model = agent.model.clone();
        cfg.provider = agent.llm_provider.clone();
        cfg.system_prompt = agent.system_prompt.clone();
        Ok(new_backend(cfg, pm.clone()))
    })
}

/// Root cancellation: first signal starts a bounded shutdown, a second
/// one forces exit immediately.
fn root_token(pm: ProcessManager) -> CancellationToken {
    let token = CancellationToken::new();
    let root = token.clone();
    tokio::spawn(async move {
        wait_for_termination().await;
        tracing::warn!("termination signal received; cancelling run");
        root.cancel();
        pm.kill_all();
        tokio::select! {
            _ = wait_for_termination() => std::process::exit(130),
            _ = tokio::time::sleep(SHUTDOWN_WINDOW) => {
                tracing::error!("shutdown window elapsed; forcing exit");
                std::process::exit(1);
            }
        }
    });
    token
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
