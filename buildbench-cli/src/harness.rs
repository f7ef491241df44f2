//! Measurement Harness
//!
//! Sweeps one benchmark over its sizes in a single build directory:
//!
//! ```text
//! Init ──► per size: Expand ──► Invoke ──► Extract ──► Record ──► Finalize
//!                                  ▲           │
//!                                  └── Retry ◄─┘ (no marker)
//! ```
//!
//! The first fatal error ends the sweep with status `Aborted`; points measured
//! before it are kept. Cancellation is checked before each expansion.

use crate::aggregator::{NoProgress, ProgressSink, SeriesAggregator};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::invoker::BuildInvoker;
use crate::retry::{Attempt, Measured, RetryController, RetryPolicy, Sleeper, ThreadSleeper};
use buildbench_core::{
    Aspect, Extraction, MeasurementRequest, MetricTag, TemplateExpander, extract_metric,
};
use buildbench_report::{RunStatus, Series};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Build targets the harness invokes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    /// Compiles the generated source, prints `[compilation time: ...]`
    pub compile: String,
    /// Runs the compiled program, prints `[execution time: ...]`
    pub run: String,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            compile: "compile.benchmark.measure".to_string(),
            run: "run.benchmark.measure".to_string(),
        }
    }
}

/// A benchmark ready to sweep
#[derive(Debug)]
pub struct BenchmarkPlan {
    /// Benchmark name
    pub name: String,
    /// Compiled source template
    pub expander: TemplateExpander,
    /// Sizes in traversal order
    pub sizes: Vec<u64>,
    /// Quantity collected per size
    pub aspect: Aspect,
}

/// Position of a sweep in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing measured yet
    Init,
    /// Measuring `sizes[index]`
    Measuring {
        /// Position in the size list
        index: usize,
    },
    /// Series handed over with this status
    Finalized(RunStatus),
}

/// How a sweep ended
#[derive(Debug)]
pub struct RunOutcome {
    /// Points measured, possibly partial
    pub series: Series,
    /// Terminal status
    pub status: RunStatus,
    /// Fatal error, when `status` is `Aborted`
    pub error: Option<HarnessError>,
    /// Stale-build retries across all sizes
    pub retries: u32,
    /// Wall-clock duration of the sweep
    pub duration: Duration,
}

/// Drives one build directory through a benchmark sweep
pub struct Harness<'a> {
    invoker: &'a mut dyn BuildInvoker,
    policy: RetryPolicy,
    targets: Targets,
    sleeper: &'a dyn Sleeper,
    progress: &'a dyn ProgressSink,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Harness<'a> {
    /// Harness over `invoker` with the default targets
    pub fn new(invoker: &'a mut dyn BuildInvoker, policy: RetryPolicy) -> Self {
        Self {
            invoker,
            policy,
            targets: Targets::default(),
            sleeper: &ThreadSleeper,
            progress: &NoProgress,
            cancel: None,
        }
    }

    /// Harness over `invoker` configured from the `[harness]` table.
    ///
    /// The retry budget and delay drive the retry controller. The invoker is
    /// expected to have been built with the same `timeout_seconds` and
    /// `build_directory`.
    pub fn from_config(invoker: &'a mut dyn BuildInvoker, config: &HarnessConfig) -> Self {
        Self::new(invoker, config.retry_policy())
    }

    /// Use other build targets
    pub fn with_targets(mut self, targets: Targets) -> Self {
        self.targets = targets;
        self
    }

    /// Use another sleeper between retries
    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Report progress to `progress`
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Stop before the next size once `flag` is set
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Sweep `plan` and finalize its series.
    ///
    /// The generated source file is emptied afterwards, whatever the outcome.
    pub fn run(&mut self, plan: &BenchmarkPlan) -> RunOutcome {
        let start = Instant::now();
        info!(
            benchmark = %plan.name,
            aspect = %plan.aspect,
            points = plan.sizes.len(),
            "starting sweep"
        );

        let mut aggregator = SeriesAggregator::new(plan.sizes.len(), self.progress);
        let mut retries = 0u32;
        let mut failure = None;
        let mut state = RunState::Init;

        while let RunState::Init | RunState::Measuring { .. } = state {
            let index = match state {
                RunState::Measuring { index } => index,
                _ => 0,
            };
            let Some(&input_size) = plan.sizes.get(index) else {
                state = RunState::Finalized(RunStatus::Complete);
                break;
            };
            if self.cancelled() {
                warn!(benchmark = %plan.name, input_size, "sweep cancelled");
                state = RunState::Finalized(RunStatus::Cancelled);
                break;
            }

            let request = MeasurementRequest {
                benchmark: &plan.name,
                input_size,
                aspect: plan.aspect,
            };
            match self.measure(&plan.expander, &request) {
                Ok(measured) => {
                    retries += measured.retries;
                    aggregator.record(input_size, measured.value);
                    state = RunState::Measuring { index: index + 1 };
                }
                Err(err) => {
                    if let HarnessError::StaleBuild { attempts, .. } = &err {
                        retries += attempts.saturating_sub(1);
                    }
                    log_failure(&plan.name, &err);
                    failure = Some(err);
                    state = RunState::Finalized(RunStatus::Aborted);
                }
            }
        }

        if let Err(e) = self.invoker.reset_source() {
            warn!(
                path = %self.invoker.source_path().display(),
                error = %e,
                "failed to reset generated source"
            );
        }

        let status = match state {
            RunState::Finalized(status) => status,
            RunState::Init | RunState::Measuring { .. } => RunStatus::Complete,
        };
        self.progress.finish(status.as_str());
        let series = aggregator.into_series();
        let duration = start.elapsed();
        info!(
            benchmark = %plan.name,
            status = status.as_str(),
            points = series.len(),
            retries,
            elapsed = ?duration,
            "sweep finished"
        );

        RunOutcome {
            series,
            status,
            error: failure,
            retries,
            duration,
        }
    }

    /// Expand, build and extract one size.
    fn measure(
        &mut self,
        expander: &TemplateExpander,
        request: &MeasurementRequest<'_>,
    ) -> Result<Measured, HarnessError> {
        let code = expander.expand(request.input_size)?;
        debug!(
            benchmark = request.benchmark,
            input_size = request.input_size,
            bytes = code.len(),
            "expanded template"
        );
        self.invoker
            .write_source(&code)
            .map_err(|source| HarnessError::SourceWrite {
                path: self.invoker.source_path().to_path_buf(),
                source,
            })?;

        let controller = RetryController::new(self.policy, self.sleeper);
        let compiled = controller.measure(
            &mut *self.invoker,
            &Attempt {
                target: &self.targets.compile,
                tag: MetricTag::CompilationTime,
                input_size: request.input_size,
                generated_source: &code,
            },
        )?;

        match request.aspect {
            Aspect::CompileTime => Ok(compiled),
            Aspect::ExecutionTime => {
                let value = self.run_compiled(request.input_size, &code)?;
                Ok(Measured {
                    value,
                    retries: compiled.retries,
                })
            }
        }
    }

    /// Invoke the run target once; its marker is never retried.
    fn run_compiled(&mut self, input_size: u64, code: &str) -> Result<f64, HarnessError> {
        let result = self.invoker.invoke(&self.targets.run);
        if !result.is_success() {
            return Err(HarnessError::Build {
                target: self.targets.run.clone(),
                input_size,
                stderr: result.stderr,
                generated_source: code.to_string(),
            });
        }
        match extract_metric(&result.stdout, MetricTag::ExecutionTime) {
            Extraction::Found(value) => Ok(value),
            Extraction::NotFound => Err(HarnessError::MissingMetric {
                target: self.targets.run.clone(),
                input_size,
                tag: MetricTag::ExecutionTime.to_string(),
                stdout: result.stdout,
                generated_source: code.to_string(),
            }),
        }
    }
}

fn log_failure(benchmark: &str, err: &HarnessError) {
    error!(
        benchmark,
        kind = err.kind().as_str(),
        input_size = ?err.input_size(),
        "{}",
        err
    );
    if let Some(source) = err.generated_source() {
        debug!(benchmark, "generated source:\n{}", source);
    }
}
