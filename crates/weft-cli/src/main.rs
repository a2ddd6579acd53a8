//! weft CLI - LLM-driven build orchestrator
//!
//! Usage:
//!   weft <goal> [repoPath]          Plan, build, verify, and document
//!   weft <goal> --resume            Continue the latest checkpoint for the goal
//!   weft <goal> -c 5 -m gpt-4o      Override concurrency and model

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use weft_core::{TaskStatus, WeftConfig};
use weft_engine::{Engine, EngineConfig};
use weft_env::{api_key_from_env, detect_runner, LocalWorkspace, OpenAiClient, SystemShell};

#[derive(Parser)]
#[command(name = "weft")]
#[command(version)]
#[command(about = "LLM-driven build orchestrator: plan, build, verify, self-heal, resume")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Natural-language goal to build
    goal: String,

    /// Existing repository to use as context and output root
    repo_path: Option<PathBuf>,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Verbose event logging
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Resume the latest matching checkpoint
    #[arg(short, long)]
    resume: bool,

    /// Maximum tasks executing at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Model identifier
    #[arg(short, long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{}", e);
                std::process::exit(0);
            }
            _ => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
    };

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to initialize logging");
    }

    if let Err(e) = api_key_from_env() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("weft failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let base = match &cli.repo_path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    let config_file = WeftConfig::load_or_default(&base)?;
    let model_name = cli
        .model
        .clone()
        .unwrap_or_else(|| config_file.model.default.clone());

    let mut config = EngineConfig::from_config(&config_file);
    if let Some(concurrency) = cli.concurrency {
        config = config.with_max_concurrency(concurrency);
    }
    config = config.with_state_dir(base.join(&config_file.state_dir));

    let runner_kind = detect_runner(&base);
    info!(
        "Workspace {} (runner: {}, model: {})",
        base.display(),
        runner_kind.name(),
        model_name
    );

    let engine = Engine::new(
        Arc::new(LocalWorkspace::new(&base)),
        Arc::new(SystemShell::new(&base)),
        Arc::new(OpenAiClient::from_env(model_name)?),
        runner_kind,
        config,
    );

    // A given repoPath doubles as planning context; without one the
    // Architect plans from the goal alone
    let context_dir = cli.repo_path.as_ref().map(|_| ".");
    let state = engine.run(&cli.goal, context_dir, cli.resume).await?;

    let completed = state.count_status(TaskStatus::Completed);
    println!(
        "Completed: {} task(s) built for plan {}",
        completed, state.plan_id
    );
    for task in &state.tasks {
        println!("  {} {}", task.status, task.file_path);
    }

    Ok(())
}
