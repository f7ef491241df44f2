//! Lane Execution
//!
//! Runs an [`ExecutionPlan`]: lanes in parallel on a rayon pool, the
//! pipelines of a lane sequentially against their shared generated source.
//!
//! ## Data Flow
//!
//! ```text
//!   ExecutionPlan
//!        │  one rayon task per lane
//!        ▼
//! ┌──────────────────┐
//! │  Lane            │  Pipeline → Pipeline → ...   (same generated source)
//! └────────┬─────────┘
//!          │  per pipeline
//!          ▼
//! ┌──────────────────┐
//! │  Harness         │  Expand → Invoke → Extract [→ Retry] → Record
//! └────────┬─────────┘
//!          ▼
//!  <output>/<environment>/<benchmark>.csv  +  PipelineResult
//! ```

use crate::config::{BenchConfig, HarnessConfig};
use crate::error::HarnessError;
use crate::harness::{BenchmarkPlan, Harness, RunOutcome, Targets};
use crate::invoker::CommandInvoker;
use crate::planner::{ExecutionPlan, Lane, Pipeline};
use buildbench_core::{Aspect, TemplateExpander};
use buildbench_report::{RunStatus, Series, write_csv};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{error, info};

/// Settings shared by every pipeline of a run
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Build tool executable
    pub tool: String,
    /// Build tool arguments, with placeholders
    pub args: Vec<String>,
    /// Compile and run targets
    pub targets: Targets,
    /// Timeout and retry settings handed to every harness
    pub harness: HarnessConfig,
    /// Directory CSV artifacts are written under
    pub output_dir: PathBuf,
    /// Lanes run concurrently
    pub jobs: usize,
    /// Draw progress bars
    pub show_progress: bool,
}

impl ExecutionConfig {
    /// Settings from a loaded configuration
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            tool: config.build.tool.clone(),
            args: config.build.args.clone(),
            targets: Targets {
                compile: config.build.compile_target.clone(),
                run: config.build.run_target.clone(),
            },
            harness: config.harness.clone(),
            output_dir: config.resolve(&config.output.directory),
            jobs: 1,
            show_progress: true,
        }
    }
}

/// Result of one pipeline
#[derive(Debug)]
pub struct PipelineResult {
    /// `<environment>/<benchmark>`
    pub id: String,
    /// Environment name
    pub environment: String,
    /// Benchmark name
    pub benchmark: String,
    /// Quantity collected
    pub aspect: Aspect,
    /// Sizes the range asked for
    pub planned_points: usize,
    /// How the sweep ended
    pub outcome: RunOutcome,
    /// CSV artifact, when one was written
    pub artifact: Option<PathBuf>,
}

/// Runs lanes of pipelines
pub struct LaneExecutor<'c> {
    config: ExecutionConfig,
    cancel: &'c AtomicBool,
}

impl<'c> LaneExecutor<'c> {
    /// Create an executor observing `cancel`
    pub fn new(config: ExecutionConfig, cancel: &'c AtomicBool) -> Self {
        Self { config, cancel }
    }

    /// Execute every lane of `plan`; results follow plan order
    pub fn execute(&self, plan: &ExecutionPlan) -> anyhow::Result<Vec<PipelineResult>> {
        let multi = if self.config.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.max(1))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build lane pool: {}", e))?;

        let per_lane: Vec<Vec<PipelineResult>> = pool.install(|| {
            plan.lanes
                .par_iter()
                .map(|lane| self.run_lane(lane, &multi))
                .collect()
        });

        Ok(per_lane.into_iter().flatten().collect())
    }

    fn run_lane(&self, lane: &Lane, multi: &MultiProgress) -> Vec<PipelineResult> {
        info!(
            source = %lane.source_path.display(),
            pipelines = lane.pipelines.len(),
            "lane started"
        );
        lane.pipelines
            .iter()
            .map(|pipeline| self.run_pipeline(pipeline, multi))
            .collect()
    }

    fn run_pipeline(&self, pipeline: &Pipeline, multi: &MultiProgress) -> PipelineResult {
        let pb = multi.add(ProgressBar::new(pipeline.sizes.len() as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {prefix} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_prefix(pipeline.id.clone());

        let start = Instant::now();
        let outcome = match TemplateExpander::from_file(&pipeline.template_path) {
            Ok(expander) => {
                let plan = BenchmarkPlan {
                    name: pipeline.benchmark.name.clone(),
                    expander,
                    sizes: pipeline.sizes.clone(),
                    aspect: pipeline.benchmark.aspect,
                };
                let mut invoker = CommandInvoker::new(
                    self.config.tool.clone(),
                    &pipeline.build_dir,
                    &pipeline.source_path,
                    self.config.harness.timeout(),
                )
                .with_args(self.config.args.clone())
                .with_env(pipeline.environment.env_vars());

                Harness::from_config(&mut invoker, &self.config.harness)
                    .with_targets(self.config.targets.clone())
                    .with_progress(&pb)
                    .with_cancel(self.cancel)
                    .run(&plan)
            }
            Err(e) => {
                let err = HarnessError::from(e);
                error!(pipeline = %pipeline.id, "{}", err);
                pb.finish_with_message(RunStatus::Aborted.as_str().to_string());
                RunOutcome {
                    series: Series::new(),
                    status: RunStatus::Aborted,
                    error: Some(err),
                    retries: 0,
                    duration: start.elapsed(),
                }
            }
        };

        let path = artifact_path(
            &self.config.output_dir,
            &pipeline.environment.name,
            &pipeline.benchmark.name,
        );
        let artifact = if should_flush(&outcome) {
            match write_artifact(&outcome.series, &path) {
                Ok(()) => {
                    info!(pipeline = %pipeline.id, path = %path.display(), "series written");
                    Some(path)
                }
                Err(e) => {
                    error!(
                        pipeline = %pipeline.id,
                        path = %path.display(),
                        "failed to write series: {:#}",
                        e
                    );
                    None
                }
            }
        } else {
            match discard_artifact(&path) {
                Ok(true) => {
                    info!(pipeline = %pipeline.id, path = %path.display(), "removed stale series")
                }
                Ok(false) => {}
                Err(e) => error!(
                    pipeline = %pipeline.id,
                    path = %path.display(),
                    "failed to remove stale series: {}",
                    e
                ),
            }
            None
        };

        PipelineResult {
            id: pipeline.id.clone(),
            environment: pipeline.environment.name.clone(),
            benchmark: pipeline.benchmark.name.clone(),
            aspect: pipeline.benchmark.aspect,
            planned_points: pipeline.sizes.len(),
            outcome,
            artifact,
        }
    }
}

/// Complete series are always written; partial ones only when non-empty.
fn should_flush(outcome: &RunOutcome) -> bool {
    outcome.status == RunStatus::Complete || !outcome.series.is_empty()
}

/// `<output>/<environment>/<benchmark>.csv`
pub fn artifact_path(output_dir: &Path, environment: &str, benchmark: &str) -> PathBuf {
    output_dir
        .join(environment)
        .join(format!("{}.csv", benchmark))
}

fn write_artifact(series: &Series, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(series, std::io::BufWriter::new(file))?;
    Ok(())
}

/// Remove an artifact left by an earlier run; `Ok(false)` when there was none.
fn discard_artifact(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
