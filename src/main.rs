use clap::{Parser, Subcommand};
use ganger::cancel::CancelSignal;
use ganger::options::{ConcurrencyStrategy, RunnerOverrides};
use ganger::ordering::builtin_registry;
use ganger::plan::RunPlan;
use ganger::scheduler::GroupScheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run work groups in parallel without letting them trample each other
#[derive(Parser)]
#[command(name = "ganger")]
#[command(about = "Run groups of work items under a bounded concurrency policy", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan file
    Run {
        /// Path to the plan (YAML, or JSON with a .json extension)
        plan: PathBuf,

        /// Maximum groups running at once (0 = processor count, negative = unlimited)
        #[arg(short = 'j', long)]
        max_concurrent: Option<i32>,

        /// Run every group sequentially
        #[arg(long)]
        no_parallel: bool,

        /// Concurrency strategy: conservative or aggressive
        #[arg(long)]
        strategy: Option<ConcurrencyStrategy>,

        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved policy and partition without running anything
    Describe {
        /// Path to the plan (YAML, or JSON with a .json extension)
        plan: PathBuf,

        /// Maximum groups running at once (0 = processor count, negative = unlimited)
        #[arg(short = 'j', long)]
        max_concurrent: Option<i32>,

        /// Run every group sequentially
        #[arg(long)]
        no_parallel: bool,

        /// Concurrency strategy: conservative or aggressive
        #[arg(long)]
        strategy: Option<ConcurrencyStrategy>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_writer(std::io::stderr)
        .init();

    debug!("ganger started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Run {
            plan,
            max_concurrent,
            no_parallel,
            strategy,
            json,
        } => run_plan(plan, overrides_from(max_concurrent, no_parallel, strategy), json).await,
        Commands::Describe {
            plan,
            max_concurrent,
            no_parallel,
            strategy,
        } => describe_plan(plan, overrides_from(max_concurrent, no_parallel, strategy)),
    };

    match result {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            eprintln!("Error: {e:#}");
            std::process::exit(2);
        }
    }
}

fn overrides_from(
    max_concurrent: Option<i32>,
    no_parallel: bool,
    strategy: Option<ConcurrencyStrategy>,
) -> RunnerOverrides {
    RunnerOverrides {
        parallelism_disabled: no_parallel.then_some(true),
        max_concurrent_groups: max_concurrent,
        strategy,
    }
}

async fn run_plan(path: PathBuf, overrides: RunnerOverrides, json: bool) -> anyhow::Result<i32> {
    let plan = RunPlan::load(&path)?;
    let (defaults, groups) = plan.into_parts();

    let cancel = CancelSignal::new();
    install_interrupt_handler(cancel.clone());

    let scheduler = GroupScheduler::new(groups, defaults)
        .with_overrides(overrides)
        .with_registry(Arc::new(builtin_registry()))
        .with_cancel_signal(cancel);
    info!(environment = %scheduler.describe_environment(), "starting run");

    let summary = scheduler.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(if summary.has_failures() { 1 } else { 0 })
}

fn describe_plan(path: PathBuf, overrides: RunnerOverrides) -> anyhow::Result<i32> {
    let plan = RunPlan::load(&path)?;
    let listing: Vec<String> = plan
        .groups
        .iter()
        .map(|group| {
            let phase = if group.sequential { "sequential" } else { "parallel" };
            let items = group.items.len();
            let noun = if items == 1 { "item" } else { "items" };
            format!("  {} ({items} {noun}) [{phase}]", group.name)
        })
        .collect();

    let (defaults, groups) = plan.into_parts();
    let scheduler = GroupScheduler::new(groups, defaults)
        .with_overrides(overrides)
        .with_registry(Arc::new(builtin_registry()));

    println!("environment: {}", scheduler.describe_environment());
    println!("groups:");
    for line in &listing {
        println!("{line}");
    }
    Ok(0)
}

fn install_interrupt_handler(cancel: CancelSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
            Err(e) => warn!("failed to listen for interrupt: {e}"),
        }
    });
}
