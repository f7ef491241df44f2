#![warn(missing_docs)]
//! # BuildBench
//!
//! Measurement harness for compile-time benchmarks.
//!
//! BuildBench sweeps a source template over a range of input sizes and records
//! how long each generated program takes to build (or run):
//! - **Template Expansion**: Jinja templates rendered with a single `input_size` parameter
//! - **Build Invocation**: Any build system target, run as a scoped child with a timeout
//! - **Metric Extraction**: `[compilation time: X]` / `[execution time: X]` markers in build output
//! - **Stale-Build Retry**: Bounded re-invocation when the build system skipped the compile
//! - **Series Output**: One `input_size,seconds` CSV per environment and benchmark
//!
//! ## Quick Start
//!
//! ```ignore
//! use buildbench::{Aspect, BenchmarkPlan, CommandInvoker, Harness, RetryPolicy, TemplateExpander};
//! use std::time::Duration;
//!
//! let expander = TemplateExpander::from_file("benchmark/fold_left.cpp.j2")?;
//! let mut invoker = CommandInvoker::new("cmake", "build", "build/measure.cpp", Duration::from_secs(60));
//! let plan = BenchmarkPlan {
//!     name: "fold_left".to_string(),
//!     expander,
//!     sizes: (0..=100).step_by(10).collect(),
//!     aspect: Aspect::CompileTime,
//! };
//! let outcome = Harness::new(&mut invoker, RetryPolicy::default()).run(&plan);
//! println!("{}", outcome.series.finalize()?);
//! ```

// Re-export core types
pub use buildbench_core::{
    Aspect, BenchmarkPoint, BuildResult, BuildStatus, Extraction, MeasurementRequest, MetricTag,
    TemplateError, TemplateExpander, extract, extract_metric, format_marker,
};

// Re-export series and reports
pub use buildbench_report::{
    FailureInfo, OutputFormat, RunReport, RunStatus, Series, SeriesError, SeriesReport,
    generate_json_report, parse_csv, write_csv,
};

// Re-export the harness
pub use buildbench_cli::{
    BenchConfig, BenchmarkPlan, BuildInvoker, CommandInvoker, ErrorKind, Harness, HarnessError,
    NoProgress, ProgressSink, RetryController, RetryPolicy, RunOutcome, Sleeper, Targets,
    ThreadSleeper,
};

/// Run the BuildBench CLI.
///
/// ```ignore
/// fn main() {
///     buildbench::run().unwrap();
/// }
/// ```
pub use buildbench_cli::run;
