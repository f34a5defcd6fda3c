//! `autoforge` CLI entry point.
//!
//! Subcommands mirror the external interfaces in spec §9: creating a
//! project registers its workspace and spec file with the Task Store;
//! `run` drives a single project through [`SessionOrchestrator::run_until_halt`]
//! until it halts (initializer done, failure threshold tripped, or no work
//! left); `status` prints task/test progress; `reset` clears a project's
//! hierarchy for a fresh run.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use autoforge_core::{AppError, AppResult, ProjectId};
use autoforge_orchestrator::config::Config;
use autoforge_orchestrator::services::{orchestrator::SessionOrchestrator, sandbox as sandbox_service};
use autoforge_orchestrator::storage::{Database, PromptVersions, TaskStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autoforge", author, version, about)]
struct Cli {
    /// Override the sqlite database path (defaults to `AUTOFORGE_DATABASE_PATH`
    /// or `~/.autoforge/autoforge.db`).
    #[arg(long, global = true)]
    database_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new project: copies nothing, just records the workspace
    /// and spec path the initializer session will read.
    CreateProject {
        name: String,
        #[arg(long)]
        workspace: PathBuf,
        #[arg(long)]
        spec: PathBuf,
    },
    /// Run one session for a project (whichever kind is next in sequence).
    RunSession {
        #[arg(long)]
        project: String,
    },
    /// Run a project to completion: repeated sessions until auto-chain halts.
    Run {
        #[arg(long)]
        project: String,
    },
    /// Request cancellation of a project's currently running session.
    Cancel {
        #[arg(long)]
        project: String,
    },
    /// Print task/test/epic progress for a project.
    Status {
        #[arg(long)]
        project: String,
    },
    /// Clear a project's epics/tasks/tests/sessions, keeping the project row.
    Reset {
        #[arg(long)]
        project: String,
    },
    /// Long-running scheduler: drives every registered project to a halt
    /// concurrently, then exits (SPEC_FULL §1 "CLI / process entry").
    Serve,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(path) = cli.database_path {
        config.database_path = path;
    }

    let db = Database::open(&config.database_path)?;
    let store = Arc::new(TaskStore::new(db));
    let recovered = store.reconcile().await?;
    if recovered > 0 {
        tracing::info!(recovered, "reconciled stale running sessions on startup");
    }
    let sandbox = sandbox_service::build_sandbox_manager(&config.sandbox_runtime_bin);

    match cli.command {
        Command::CreateProject { name, workspace, spec } => {
            let project = store
                .create_project(&name, workspace, spec, config.default_sandbox_policy.clone(), PromptVersions::default())
                .await?;
            println!("{project}");
        }
        Command::RunSession { project } => {
            let project = parse_project_id(&project)?;
            let orchestrator = SessionOrchestrator::new(store, sandbox, config);
            let run = orchestrator.run_session(project).await?;
            println!("session {} ({:?}) -> {:?}", run.session_id, run.kind, run.outcome.status);
        }
        Command::Run { project } => {
            let project = parse_project_id(&project)?;
            let orchestrator = SessionOrchestrator::new(store, sandbox, config);
            orchestrator.run_until_halt(project).await?;
            println!("halted");
        }
        Command::Cancel { project } => {
            // Recorded in the Task Store rather than on an in-process
            // orchestrator: the session actually running belongs to a
            // separate `run`/`run-session`/`serve` invocation, which polls
            // this flag (SessionOrchestrator::run_agent_once).
            let project = parse_project_id(&project)?;
            store.request_cancellation(project).await?;
            println!("cancellation requested");
        }
        Command::Status { project } => {
            let project_id = parse_project_id(&project)?;
            let progress = store.project_progress(project_id).await?;
            println!(
                "epics {}/{} done, tasks {}/{} done, tests {}/{} passing",
                progress.done_epics,
                progress.total_epics,
                progress.done_tasks,
                progress.total_tasks,
                progress.passing_tests,
                progress.total_tests,
            );
        }
        Command::Reset { project } => {
            let project = parse_project_id(&project)?;
            store.reset_project(project).await?;
            println!("reset");
        }
        Command::Serve => {
            let projects = store.list_projects().await?;
            tracing::info!(count = projects.len(), "serve: driving all registered projects");
            let orchestrator = Arc::new(SessionOrchestrator::new(store, sandbox, config));

            let mut handles = Vec::with_capacity(projects.len());
            for project in projects {
                let orchestrator = orchestrator.clone();
                handles.push(tokio::spawn(async move {
                    if let Err(err) = orchestrator.run_until_halt(project.id).await {
                        tracing::error!(project = %project.id, error = %err, "project run halted with an error");
                    }
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    Ok(())
}

fn parse_project_id(raw: &str) -> AppResult<ProjectId> {
    ProjectId::from_str(raw).map_err(|_| AppError::validation(format!("not a valid project id: {raw}")))
}
