use anyhow::Context;
use clap::{Parser, Subcommand};
use retrace_engine::WorkflowEngine;
use retrace_engine::config::{ConfigLoader, ExecutionConfig};
use retrace_engine::execution::ExecutionProgress;
use retrace_engine::formatter::{format_progress, format_result};
use retrace_engine::resolution::resolve_locators;
use retrace_engine::trace::Workflow;
use retrace_h::HeadlessBackend;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retrace", version, about = "Replay recorded browser workflows")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a workflow in Chromium
    Run {
        /// Workflow JSON file
        workflow: PathBuf,

        /// YAML config file (defaults to ./retrace.yaml or ~/.retrace/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Launch browser in visible mode (not headless)
        #[arg(long)]
        visible: bool,

        /// Capture before/after screenshots of every attempt into this directory
        #[arg(long)]
        screenshots: Option<PathBuf>,

        /// Write the execution result JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the ranked locators of every step without launching a browser
    Resolve {
        /// Workflow JSON file
        workflow: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run {
            workflow,
            config,
            visible,
            screenshots,
            output,
        } => {
            let workflow = load_workflow(&workflow).await?;
            let mut config = match config {
                Some(path) => ConfigLoader::load_from(&path).await,
                None => ConfigLoader::load_default().await,
            }
            .context("Failed to load configuration")?;
            apply_overrides(&mut config, visible, screenshots);

            let success = run(workflow, config, output.as_deref()).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Command::Resolve { workflow } => {
            let workflow = load_workflow(&workflow).await?;
            print_locators(&workflow);
        }
    }
    Ok(())
}

async fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read workflow {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse workflow {}", path.display()))
}

fn apply_overrides(config: &mut ExecutionConfig, visible: bool, screenshots: Option<PathBuf>) {
    if visible {
        config.headless = false;
    }
    if let Some(dir) = screenshots {
        config.screenshots.enabled = true;
        config.screenshots.dir = dir;
    }
}

async fn run(
    workflow: Workflow,
    config: ExecutionConfig,
    output: Option<&Path>,
) -> anyhow::Result<bool> {
    let engine = WorkflowEngine::new(config, HeadlessBackend::new());

    let events = engine.subscribe();
    let printer = tokio::spawn(forward_progress(events, |progress| {
        eprintln!("{}", format_progress(progress))
    }));

    let result = engine.execute_workflow(&workflow).await?;
    // Closes the progress channel so the printer ends even if it missed the last event.
    drop(engine);
    printer.await.ok();
    eprintln!("{}", format_result(&result));

    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write result to {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(result.success)
}

/// Feed progress events to `emit` until the run ends or the channel closes.
async fn forward_progress(
    mut events: broadcast::Receiver<ExecutionProgress>,
    mut emit: impl FnMut(&ExecutionProgress),
) {
    loop {
        match events.recv().await {
            Ok(progress) => {
                emit(&progress);
                if progress.status.is_terminal() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Progress display fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_locators(workflow: &Workflow) {
    for (index, step) in workflow.steps.iter().enumerate() {
        println!("[{}] {} {}", index + 1, step.action, step.id);
        let resolved = resolve_locators(&step.id, step.selectors.as_deref());
        if resolved.synthetic {
            println!("    (no usable selectors) {}", resolved.primary);
            continue;
        }
        for scored in &resolved.ranked {
            println!(
                "    {:>4}  {:<14} {}",
                scored.score,
                format!("{:?}", scored.source),
                scored.locator
            );
        }
    }
}
