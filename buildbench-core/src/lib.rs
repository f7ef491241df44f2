#![warn(missing_docs)]
//! BuildBench Core - Measurement Primitives
//!
//! This crate provides the pieces of a build-time measurement that do not
//! touch the outside world:
//! - `TemplateExpander` turning a parametrized source template into code
//! - `extract` pulling a tagged timing marker out of captured build output
//! - The data model shared by the harness and the reports

mod extract;
mod template;

pub use extract::{Extraction, MetricTag, extract, extract_metric, format_marker};
pub use template::{TemplateError, TemplateExpander};

use serde::{Deserialize, Serialize};

/// Which quantity a benchmark collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    /// Time spent compiling the generated source
    #[default]
    CompileTime,
    /// Time spent running the compiled program
    ExecutionTime,
}

impl Aspect {
    /// Marker tag the final value is read from
    pub fn metric_tag(self) -> MetricTag {
        match self {
            Aspect::CompileTime => MetricTag::CompilationTime,
            Aspect::ExecutionTime => MetricTag::ExecutionTime,
        }
    }

    /// Stable identifier used in reports
    pub fn as_str(self) -> &'static str {
        match self {
            Aspect::CompileTime => "compile_time",
            Aspect::ExecutionTime => "execution_time",
        }
    }
}

impl std::fmt::Display for Aspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Aspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "compile_time" | "compilation_time" => Ok(Aspect::CompileTime),
            "execution_time" | "run_time" => Ok(Aspect::ExecutionTime),
            other => Err(format!("Unknown aspect: {}", other)),
        }
    }
}

/// One measurement to take: a benchmark template at a given input size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementRequest<'a> {
    /// Benchmark (template) name
    pub benchmark: &'a str,
    /// Value bound to `input_size` in the template
    pub input_size: u64,
    /// Quantity being collected
    pub aspect: Aspect,
}

/// A measured `(input size, seconds)` pair
///
/// Points are created once and never modified; the fields are only
/// reachable through accessors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPoint {
    input_size: u64,
    metric_value: f64,
}

impl BenchmarkPoint {
    /// Create a point
    pub fn new(input_size: u64, metric_value: f64) -> Self {
        Self {
            input_size,
            metric_value,
        }
    }

    /// Independent variable of the sweep
    pub fn input_size(&self) -> u64 {
        self.input_size
    }

    /// Measured value in seconds
    pub fn metric_value(&self) -> f64 {
        self.metric_value
    }
}

/// Exit status of a build invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    /// The build tool exited with status 0
    Success,
    /// Non-zero exit, signal, timeout or spawn failure
    Failure,
}

/// Captured output of one build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit status
    pub status: BuildStatus,
}

impl BuildResult {
    /// Successful build with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: BuildStatus::Success,
        }
    }

    /// Failed build with the given stderr
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status: BuildStatus::Failure,
        }
    }

    /// Whether the build tool reported success
    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }
}
