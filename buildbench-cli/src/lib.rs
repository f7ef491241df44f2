#![warn(missing_docs)]
//! BuildBench CLI Library
//!
//! Measurement harness for compile-time benchmarks. For every configured
//! `(environment, benchmark)` pair it expands the benchmark template at each
//! input size, builds it through the configured build system, extracts the
//! `[compilation time: ...]` (or `[execution time: ...]`) marker from the build
//! output and writes the resulting series as CSV.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     if let Err(e) = buildbench_cli::run() {
//!         eprintln!("Error: {:#}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

mod aggregator;
mod config;
mod error;
mod executor;
mod harness;
mod invoker;
mod planner;
mod retry;
mod signal;
mod timing;

pub use aggregator::{NoProgress, ProgressSink, SeriesAggregator};
pub use config::*;
pub use error::{ErrorKind, HarnessError};
pub use executor::{
    ExecutionConfig, LaneExecutor, PipelineResult, artifact_path, build_report, failure_info,
    format_human_output,
};
pub use harness::{BenchmarkPlan, Harness, RunOutcome, RunState, Targets};
pub use invoker::{BuildInvoker, CommandInvoker};
pub use planner::{ExecutionPlan, Lane, Pipeline, build_plan};
pub use retry::{
    Attempt, CycleOutcome, Measured, RetryController, RetryPolicy, RetryState, Sleeper,
    ThreadSleeper,
};
pub use signal::{cancel_flag, cancel_requested, install_cancel_handler};
pub use timing::{Timed, run_timed, write_markers};

use anyhow::Context;
use buildbench_core::{MetricTag, TemplateExpander};
use buildbench_report::{OutputFormat, generate_json_report};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Instant;

/// BuildBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "buildbench")]
#[command(author, version, about = "BuildBench - compile-time benchmark harness")]
pub struct Cli {
    /// Optional subcommand; defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Filter pipelines (`<environment>/<benchmark>`) by regex pattern
    #[arg(default_value = ".*")]
    pub filter: String,

    /// Run only this environment
    #[arg(long)]
    pub env: Option<String>,

    /// Configuration file (default: buildbench.toml, searched upwards)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Summary format: human, json
    #[arg(long)]
    pub format: Option<String>,

    /// Summary output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Timeout for a single build invocation, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Re-invocations allowed when a build prints no timing marker
    #[arg(long)]
    pub retry_budget: Option<u32>,

    /// Number of lanes processed in parallel
    #[arg(long, short = 'j', default_value = "1")]
    pub jobs: usize,

    /// Directory for CSV artifacts
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run benchmarks (default)
    Run,
    /// List planned pipelines grouped into lanes
    List,
    /// Print a benchmark's generated source for one size
    Expand {
        /// Benchmark name
        benchmark: String,
        /// Input size to render
        #[arg(long)]
        size: u64,
    },
    /// Print a default buildbench.toml
    Init,
    /// Time a command and print its timing marker
    Time {
        /// Marker tag: compilation-time or execution-time
        #[arg(long, default_value = "compilation-time")]
        tag: String,
        /// Command to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Run the BuildBench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the BuildBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries reports and markers
    let filter = if cli.verbose {
        "buildbench=debug"
    } else {
        "buildbench=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Some(Commands::Init) => {
            print!("{}", BenchConfig::default_toml());
            Ok(())
        }
        Some(Commands::Time {
            ref tag,
            ref command,
        }) => time_command(tag, command),
        Some(Commands::List) => {
            let config = load_config(&cli)?;
            list_pipelines(&cli, &config)
        }
        Some(Commands::Expand {
            ref benchmark,
            size,
        }) => {
            let config = load_config(&cli)?;
            expand_benchmark(&config, benchmark, size)
        }
        Some(Commands::Run) | None => {
            let config = load_config(&cli)?;
            run_benchmarks(&cli, &config)
        }
    }
}

/// Load buildbench.toml (explicit, discovered, or defaults) and apply CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => match BenchConfig::discover() {
            Some(path) => BenchConfig::load(&path)?,
            None => {
                tracing::warn!("no {} found; using defaults", CONFIG_FILE_NAME);
                BenchConfig {
                    base_dir: std::env::current_dir()?,
                    ..Default::default()
                }
            }
        },
    };

    if let Some(timeout) = cli.timeout {
        config.harness.timeout_seconds = timeout;
    }
    if let Some(budget) = cli.retry_budget {
        config.harness.retry_budget = budget;
    }
    if let Some(dir) = &cli.output_dir {
        config.output.directory = std::env::current_dir()?.join(dir);
    }
    if let Some(format) = &cli.format {
        config.output.format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

fn pipeline_filter(cli: &Cli) -> anyhow::Result<Regex> {
    Regex::new(&cli.filter).with_context(|| format!("Invalid filter pattern '{}'", cli.filter))
}

fn list_pipelines(cli: &Cli, config: &BenchConfig) -> anyhow::Result<()> {
    let filter = pipeline_filter(cli)?;
    let plan = build_plan(config, Some(&filter), cli.env.as_deref());

    println!("BuildBench Plan:");
    for lane in &plan.lanes {
        println!("├── lane: {}", lane.source_path.display());
        for pipeline in &lane.pipelines {
            let range = &pipeline.benchmark.range;
            println!(
                "│   ├── {} [{}] sizes {}..={} step {} ({} points)",
                pipeline.id,
                pipeline.benchmark.aspect,
                range.start,
                range.end,
                range.step,
                pipeline.sizes.len()
            );
        }
    }
    println!(
        "{} pipelines in {} lanes.",
        plan.pipeline_count(),
        plan.lanes.len()
    );
    Ok(())
}

fn expand_benchmark(config: &BenchConfig, name: &str, size: u64) -> anyhow::Result<()> {
    let bench = config
        .benchmarks
        .iter()
        .find(|b| b.name == name)
        .ok_or_else(|| {
            let available: Vec<&str> = config.benchmarks.iter().map(|b| b.name.as_str()).collect();
            anyhow::anyhow!(
                "Unknown benchmark '{}'. Available: {}",
                name,
                available.join(", ")
            )
        })?;

    let expander = TemplateExpander::from_file(config.resolve(&bench.template))?;
    let code = expander.expand(size)?;
    print!("{}", code);
    Ok(())
}

fn time_command(tag: &str, command: &[String]) -> anyhow::Result<()> {
    let tag: MetricTag = tag.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let timed = run_timed(command)
        .with_context(|| format!("Failed to run '{}'", command.join(" ")))?;

    write_markers(std::io::stdout().lock(), command, tag, &timed)?;
    if timed.exit_code != 0 {
        std::process::exit(timed.exit_code);
    }
    Ok(())
}

fn run_benchmarks(cli: &Cli, config: &BenchConfig) -> anyhow::Result<()> {
    let format: OutputFormat = config
        .output
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let filter = pipeline_filter(cli)?;
    let plan = build_plan(config, Some(&filter), cli.env.as_deref());

    if plan.is_empty() {
        if let Some(env) = &cli.env {
            let available: Vec<String> = config
                .effective_environments()
                .into_iter()
                .map(|e| e.name)
                .collect();
            if !available.contains(env) {
                eprintln!(
                    "Warning: environment '{}' not found. Available environments: {}",
                    env,
                    available.join(", ")
                );
            }
        }
        println!("No pipelines found.");
        return Ok(());
    }

    let mut exec_config = ExecutionConfig::from_config(config);
    exec_config.jobs = cli.jobs.max(1);
    exec_config.show_progress = !cli.no_progress && std::io::stderr().is_terminal();

    eprintln!(
        "Running {} pipeline(s) in {} lane(s), {} job(s)...\n",
        plan.pipeline_count(),
        plan.lanes.len(),
        exec_config.jobs
    );

    install_cancel_handler();
    let start_time = Instant::now();
    let results = LaneExecutor::new(exec_config, cancel_flag()).execute(&plan)?;
    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(&results, total_duration_ms);

    let output = match format {
        OutputFormat::Json => generate_json_report(&report)?,
        OutputFormat::Human => format_human_output(&report),
    };

    if let Some(ref path) = cli.output {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(output.as_bytes())?;
        eprintln!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }

    if report.summary.has_failures() {
        eprintln!("\n{} pipeline(s) aborted", report.summary.aborted);
        std::process::exit(1);
    }
    if cancel_requested() {
        eprintln!("\nRun cancelled; partial series were written");
        std::process::exit(130);
    }

    Ok(())
}
