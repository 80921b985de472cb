mod spec;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use ship_core::llm::LlmClient;
use ship_core::{ClaudeCodeLlm, ClaudeConfig, Config, Judge, Planner, Refiner, Replanner, SpecDecision, SpecDiffJudge, Validator, Verifier, WorkQueue, Worker};
use ship_store::{StateStore, TaskStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Autonomous coding agent: turns a design document into a completed
/// codebase by orchestrating an external LLM coding CLI.
#[derive(Parser)]
#[command(name = "ship", about = "Autonomous coding agent that orchestrates LLM workers against a design doc")]
struct Cli {
    /// Spec file, directory of specs, or inline context words
    context: Vec<String>,

    /// Wipe the data directory before starting
    #[arg(short = 'f', long)]
    fresh: bool,

    /// Validate the spec only; exit without planning or running
    #[arg(short = 'k', long)]
    check: bool,

    /// Bypass the validator and mark the spec hash as validated
    #[arg(short = 's', long)]
    skip_validation: bool,

    /// Override worker count
    #[arg(short = 'n', long = "max-workers")]
    max_workers: Option<usize>,

    /// Per-task timeout in seconds
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Per-task LLM turn bound
    #[arg(short = 'm', long = "max-turns")]
    max_turns: Option<u32>,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet: errors only
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Enable the Refiner corrective loop
    #[arg(short = 'x', long)]
    codex: bool,

    /// Override instructions prepended to every LLM call
    #[arg(short = 'p', long = "prompt", default_value = "")]
    prompt: String,

    /// Deprecated alias for default behavior
    #[arg(short = 'c', long = "continue")]
    continue_: bool,
}

fn init_tracing(verbosity: u8, quiet: bool, log_path: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if quiet {
        "error"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file = std::fs::OpenOptions::new().create(true).append(true).open(log_path).with_context(|| format!("cannot open {}", log_path.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(stderr_filter))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false).with_filter(EnvFilter::new("info")))
        .init();

    Ok(guard)
}

fn claude_client(role: &str, cwd: PathBuf, model: &str, max_turns: Option<u32>, trace_path: PathBuf) -> Arc<dyn LlmClient> {
    let mut cfg = ClaudeConfig::new(role.to_owned(), cwd).with_max_turns(max_turns).with_trace_path(Some(trace_path));
    cfg.model = model.to_owned();
    Arc::new(ClaudeCodeLlm::new(cfg))
}

/// Watches for SIGINT/SIGTERM and cancels `cancel` on the first one,
/// force-exiting on a second.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    let got_first = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        loop {
            wait_for_signal().await;
            if got_first.swap(true, Ordering::SeqCst) {
                eprintln!("\nforce exit.");
                std::process::exit(130);
            }
            eprintln!("\nshutting down (signal again to force)...");
            cancel.cancel();
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}

/// Validates (or bypasses validation of) a spec, records the artifacts
/// the rest of the engine expects, and reports accept/reject.
#[allow(clippy::too_many_arguments)]
async fn run_validation(data_dir: &std::path::Path, goal_text: &str, context: &[String], prompt: &str, skip_validation: bool, project_root: PathBuf, model: &str, max_turns: Option<u32>) -> Result<bool> {
    if skip_validation {
        std::fs::write(data_dir.join("validated"), spec::spec_hash(goal_text))?;
        return Ok(true);
    }

    let llm = claude_client("validator", project_root, model, max_turns, data_dir.join("trace.jl"));
    let validator = Validator::new(llm);
    let result = validator.validate(goal_text, context, prompt).await.context("validator llm call failed")?;

    if result.accept {
        std::fs::write(data_dir.join("PROJECT.md"), &result.project_md)?;
        std::fs::write(data_dir.join("validated"), spec::spec_hash(goal_text))?;
    } else {
        let gaps = if result.gaps.is_empty() { "(no gaps reported)".to_owned() } else { result.gaps.iter().map(|g| format!("- {g}")).collect::<Vec<_>>().join("\n") };
        std::fs::write(data_dir.join("REJECTION.md"), format!("# Rejected\n\n{gaps}\n"))?;
    }

    Ok(result.accept)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.continue_ {
        eprintln!("--continue is deprecated: continuing a prior run is now the default behavior.");
    }

    let config = Config::load(cli.max_workers, cli.timeout, cli.max_turns, cli.verbose, cli.codex);

    if cli.fresh && config.data_dir.exists() {
        std::fs::remove_dir_all(&config.data_dir).with_context(|| format!("cannot wipe {}", config.data_dir.display()))?;
    }
    std::fs::create_dir_all(&config.data_dir).with_context(|| format!("cannot create {}", config.data_dir.display()))?;

    let _log_guard = init_tracing(config.verbosity, cli.quiet, &config.data_dir.join("ship.log"))?;

    let project_root = std::env::current_dir().context("cannot resolve current directory")?;
    let source = spec::discover_spec(&cli.context).context("spec discovery failed")?;
    let hash = spec::spec_hash(&source.goal_text);
    tracing::info!(spec = %source.label, "resolved spec");

    if cli.check {
        let accepted = run_validation(&config.data_dir, &source.goal_text, &cli.context, &cli.prompt, cli.skip_validation, project_root, &config.model, config.max_turns).await?;
        if accepted {
            println!("accepted");
            return Ok(());
        }
        println!("rejected: see {}", config.data_dir.join("REJECTION.md").display());
        std::process::exit(1);
    }

    let state = Arc::new(StateStore::open(&config.data_dir).context("failed to open state store (is another ship instance running against this data directory?)")?);

    let mut needs_plan = true;
    if let Some(work) = state.get_work_state().await {
        if work.spec_hash == hash {
            tracing::info!("spec unchanged, continuing prior run");
            needs_plan = false;
        } else {
            tracing::info!("spec changed since last run, asking whether to keep or replan");
            let llm = claude_client("spec-diff", project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl"));
            let decision = SpecDiffJudge::new(llm).decide(&work.goal_text, &source.goal_text).await;
            match decision {
                SpecDecision::Keep => {
                    tracing::info!("keeping existing plan despite spec change");
                    state.set_spec_hash(hash.clone()).await?;
                    needs_plan = false;
                }
                SpecDecision::Replan => {
                    tracing::info!("spec change invalidates existing plan, replanning");
                    state.clear_tasks().await?;
                }
            }
        }

        if !needs_plan && work.is_complete {
            println!("done. nothing to do (prior run already completed).");
            return Ok(());
        }
    }

    if needs_plan {
        let accepted = run_validation(&config.data_dir, &source.goal_text, &cli.context, &cli.prompt, cli.skip_validation, project_root.clone(), &config.model, config.max_turns).await?;
        if !accepted {
            eprintln!("spec rejected: see {}", config.data_dir.join("REJECTION.md").display());
            std::process::exit(1);
        }

        state.init_work(source.label.clone(), source.goal_text.clone(), hash, cli.prompt.clone()).await?;

        let planner_llm = claude_client("planner", project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl"));
        let planner = Planner::new(planner_llm);
        let tasks = planner.plan_once(&state, &config.data_dir).await?;
        if tasks.is_empty() {
            anyhow::bail!("no tasks generated from design");
        }
    } else {
        state.reset_interrupted_tasks().await?;
    }

    let work = state.get_work_state().await.context("work state missing after planning")?;
    let pending = state.get_pending_tasks().await;

    let num_workers = if work.execution_mode == ship_store::ExecutionMode::Sequential && cli.max_workers.is_none() {
        1
    } else {
        config.max_workers.min(pending.len().max(1)).max(1)
    };
    let worker_ids: Vec<String> = (0..num_workers).map(|i| format!("w{i}")).collect();

    let (queue, mut inboxes) = WorkQueue::new(&worker_ids);
    let queue = Arc::new(queue);

    let (done_tx, done_rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut worker_handles = Vec::with_capacity(worker_ids.len());
    for id in &worker_ids {
        let llm = claude_client(&format!("worker-{id}"), project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl"));
        let worker = Worker::new(id.clone(), llm, Arc::clone(&state), config.data_dir.clone(), work.project_context.clone(), cli.prompt.clone(), config.task_timeout, done_tx.clone());
        let mut inbox = inboxes.remove(0);
        let worker_cancel = cancel.clone();
        worker_handles.push(tokio::spawn(async move { worker.run(&mut inbox, worker_cancel).await }));
    }
    drop(done_tx);

    let refiner = Refiner::new(claude_client("refiner", project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl")), work.project_context.clone());
    let replanner = Replanner::new(claude_client("replanner", project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl")), work.project_context.clone());
    let verifier = Verifier::new(claude_client("verifier", project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl")));
    let judge_llm = claude_client("judge", project_root.clone(), &config.model, config.max_turns, config.data_dir.join("trace.jl"));

    let mut judge = Judge::new(Arc::clone(&state), Arc::clone(&queue), judge_llm, refiner, replanner, verifier, config.data_dir.clone(), work.project_context.clone(), config.use_codex, done_rx);
    judge.run(cancel.clone()).await;

    cancel.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }

    let interrupted = cancel.is_cancelled();

    let all = state.get_all_tasks().await;
    let total = all.len();
    let completed = all.iter().filter(|t| t.status == TaskStatus::Completed).count();
    let failed: Vec<_> = all.iter().filter(|t| t.status == TaskStatus::Failed).collect();

    if failed.is_empty() {
        println!("done. {completed}/{total} completed");
    } else {
        println!("done. {completed}/{total} completed, {} failed", failed.len());
        for task in &failed {
            let summary = if task.summary.is_empty() { &task.description } else { &task.summary };
            let detail: String = task.error.chars().take(80).collect();
            println!("  - {summary}: {detail}");
        }
    }

    if interrupted {
        std::process::exit(130);
    }
    Ok(())
}
