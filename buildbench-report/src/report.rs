//! Report Data Structures

use buildbench_core::{Aspect, BenchmarkPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run metadata
    pub meta: ReportMeta,
    /// One entry per pipeline, in plan order
    pub series: Vec<SeriesReport>,
    /// Totals across all series
    pub summary: ReportSummary,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// JSON schema version
    pub schema_version: u32,
    /// buildbench version
    pub version: String,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
    /// `HEAD` of the working directory, if it is a git checkout
    pub git_commit: Option<String>,
    /// Host description
    pub system: SystemInfo,
}

/// Host the run executed on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// Available parallelism
    pub cpu_cores: u32,
}

/// Terminal state of one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every size in the range was measured
    Complete,
    /// A fatal error stopped the run; the series is partial
    Aborted,
    /// Cancelled between two sizes; the series is partial
    Cancelled,
}

impl RunStatus {
    /// Short label for terminal output
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Complete => "complete",
            RunStatus::Aborted => "aborted",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// One measured series and how its run ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesReport {
    /// `<environment>/<benchmark>`
    pub id: String,
    /// Environment name
    pub environment: String,
    /// Benchmark name
    pub benchmark: String,
    /// Quantity collected
    pub aspect: Aspect,
    /// Terminal status
    pub status: RunStatus,
    /// Sizes the range asked for
    pub planned_points: usize,
    /// Measured points
    pub points: Vec<BenchmarkPoint>,
    /// Stale-build retries across all sizes
    pub retries: u32,
    /// Path of the CSV artifact, if one was written
    pub artifact: Option<String>,
    /// Diagnostics when the run aborted
    pub failure: Option<FailureInfo>,
    /// Wall-clock duration of the sweep
    pub duration_ms: f64,
}

/// Diagnostics for an aborted run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    /// `template`, `build`, `stale_build`, `missing_metric` or `io`
    pub kind: String,
    /// Error message
    pub message: String,
    /// Size being measured when the run failed
    pub input_size: Option<u64>,
    /// stderr of a failed build, or the stdout that lacked a marker
    pub captured_output: Option<String>,
    /// Source the failing build was given
    pub generated_source: Option<String>,
}

/// Report summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Series in the report
    pub total_series: usize,
    /// Series that completed
    pub complete: usize,
    /// Series stopped by a fatal error
    pub aborted: usize,
    /// Series stopped by cancellation
    pub cancelled: usize,
    /// Points across all series
    pub total_points: usize,
    /// Stale-build retries across all series
    pub total_retries: u32,
    /// Wall-clock duration of the whole run
    pub total_duration_ms: f64,
}

impl ReportSummary {
    /// Tally the given series
    pub fn from_series(series: &[SeriesReport], total_duration_ms: f64) -> Self {
        let mut summary = ReportSummary {
            total_series: series.len(),
            total_duration_ms,
            ..Default::default()
        };
        for s in series {
            match s.status {
                RunStatus::Complete => summary.complete += 1,
                RunStatus::Aborted => summary.aborted += 1,
                RunStatus::Cancelled => summary.cancelled += 1,
            }
            summary.total_points += s.points.len();
            summary.total_retries += s.retries;
        }
        summary
    }

    /// Whether any pipeline hit a fatal error
    pub fn has_failures(&self) -> bool {
        self.aborted > 0
    }
}
