use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, RwLock};

use maestro::config::Config;
use maestro::core::TaskId;
use maestro::orchestration::{simulate_workers, Orchestrator, Runner, Worker};
use maestro::{mlog, Error, Result};

/// Maestro - dependency-aware task orchestration for agent pools
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    MAESTRO_DEBUG=1     Enable debug logging (alternative to --debug)\n    MAESTRO_LOG=<level> Log threshold: error, warn, info, debug or trace"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.maestro/maestro.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.maestro/maestro.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show parallel batches, the critical path and bottlenecks
    Plan {
        /// Task list file
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency graph as node and edge lists (JSON)
    Graph {
        /// Task list file
        file: PathBuf,
    },

    /// Show the initial progress report for a task list
    Status {
        /// Task list file
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Drive a task list to completion with simulated workers
    Run {
        /// Task list file
        file: PathBuf,

        /// Worker types, one worker per entry
        #[arg(short = 'w', long = "worker", default_values_t = vec!["coder".to_string()])]
        workers: Vec<String>,

        /// Override max_parallel_tasks from the config
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Task ids the simulated workers report as failed
        #[arg(long = "fail")]
        fail: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    maestro::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Plan { file, json } => run_plan(&file, config, json),
        Command::Graph { file } => run_graph(&file, config),
        Command::Status { file, json } => run_status(&file, config, json),
        Command::Run {
            file,
            workers,
            max_parallel,
            fail,
        } => run_tasks(&file, config, workers, max_parallel, fail),
    }
}

fn load_orchestrator(file: &Path, config: Config) -> Result<Orchestrator> {
    mlog!("Loading task list {}", file.display());
    let text = std::fs::read_to_string(file)?;
    let mut orchestrator = Orchestrator::new(config);
    orchestrator.load(&text)?;
    Ok(orchestrator)
}

fn print_warnings(orchestrator: &Orchestrator) {
    for warning in orchestrator.warnings() {
        eprintln!("warning: {}", warning);
    }
}

fn run_plan(file: &Path, config: Config, json: bool) -> Result<()> {
    let orchestrator = load_orchestrator(file, config)?;
    let batches = orchestrator.parallel_batches();
    let critical = orchestrator.critical_path()?;
    let bottlenecks = orchestrator.bottlenecks();

    if json {
        let output = serde_json::json!({
            "tasks": orchestrator.dag().task_count(),
            "dependencies": orchestrator.dag().dependency_count(),
            "warnings": orchestrator.warnings(),
            "batches": batches,
            "critical_path": critical,
            "bottlenecks": bottlenecks,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_warnings(&orchestrator);
    println!(
        "{} tasks, {} dependencies",
        orchestrator.dag().task_count(),
        orchestrator.dag().dependency_count()
    );
    println!();
    println!("Parallel batches:");
    for (i, batch) in batches.iter().enumerate() {
        let ids: Vec<&str> = batch.tasks.iter().map(TaskId::as_str).collect();
        println!(
            "  {:>2}. [{:>4} min] {}",
            i + 1,
            batch.estimated_duration,
            ids.join(", ")
        );
    }
    println!();
    let path: Vec<&str> = critical.path.iter().map(TaskId::as_str).collect();
    println!(
        "Critical path ({} min): {}",
        critical.total_duration,
        path.join(" -> ")
    );
    if !critical.bottlenecks.is_empty() {
        let slow: Vec<&str> = critical.bottlenecks.iter().map(TaskId::as_str).collect();
        println!("  long tasks on path: {}", slow.join(", "));
    }
    if !bottlenecks.is_empty() {
        println!();
        println!("Bottlenecks:");
        for b in bottlenecks.iter().take(5) {
            println!(
                "  {} blocks {} task(s) ({:.1}%)",
                b.task_id, b.blocked_count, b.impact
            );
        }
    }
    Ok(())
}

fn run_graph(file: &Path, config: Config) -> Result<()> {
    let orchestrator = load_orchestrator(file, config)?;
    print_warnings(&orchestrator);
    println!("{}", serde_json::to_string_pretty(&orchestrator.export()?)?);
    Ok(())
}

fn run_status(file: &Path, config: Config, json: bool) -> Result<()> {
    let orchestrator = load_orchestrator(file, config)?;
    let progress = orchestrator.progress()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
    } else {
        print_warnings(&orchestrator);
        println!("{}", progress);
    }
    Ok(())
}

fn run_tasks(
    file: &Path,
    mut config: Config,
    worker_types: Vec<String>,
    max_parallel: Option<usize>,
    fail: Vec<String>,
) -> Result<()> {
    if let Some(max) = max_parallel {
        if max == 0 {
            return Err(Error::Validation(
                "--max-parallel must be at least 1".to_string(),
            ));
        }
        config.max_parallel_tasks = max;
    }

    let mut orchestrator = load_orchestrator(file, config)?;
    print_warnings(&orchestrator);
    let mut events = orchestrator.subscribe();

    let workers: Vec<Worker> = worker_types
        .iter()
        .enumerate()
        .map(|(i, kind)| Worker::new(&format!("{}-{}", kind, i + 1), kind))
        .collect();
    let fail: HashSet<TaskId> = fail.into_iter().map(TaskId::from).collect();

    let rt = tokio::runtime::Runtime::new()?;
    let progress = rt.block_on(async {
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(body) => println!("{:<16} {}", event.name(), body),
                    Err(_) => println!("{}", event.name()),
                }
            }
        });

        let orchestrator = Arc::new(RwLock::new(orchestrator));
        let (assign_tx, assign_rx) = mpsc::unbounded_channel();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let executor = simulate_workers(assign_rx, report_tx, fail);

        let runner = Runner::new(Arc::clone(&orchestrator), workers, assign_tx);
        let progress = runner.run(&mut report_rx).await;

        drop(runner);
        let _ = executor.await;
        // Dropping the orchestrator closes the event stream.
        drop(orchestrator);
        let _ = printer.await;
        progress
    })?;

    println!();
    println!("{}", progress);
    Ok(())
}
