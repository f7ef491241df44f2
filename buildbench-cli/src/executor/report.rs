//! Report Building
//!
//! Turns pipeline results into a [`RunReport`]:
//!
//! ```text
//! PipelineResult (RunOutcome + artifact)
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │   SeriesReport      │  points, status, retries, failure diagnostics
//!   └──────────┬──────────┘
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │     RunReport       │  + metadata + summary, ready for JSON/human output
//!   └─────────────────────┘
//! ```

use super::execution::PipelineResult;
use super::metadata::build_report_meta;
use crate::error::HarnessError;
use buildbench_report::{FailureInfo, ReportSummary, RunReport, SeriesReport};

/// Build a complete report from pipeline results
pub fn build_report(results: &[PipelineResult], total_duration_ms: f64) -> RunReport {
    let series: Vec<SeriesReport> = results.iter().map(series_report).collect();
    let summary = ReportSummary::from_series(&series, total_duration_ms);

    RunReport {
        meta: build_report_meta(),
        series,
        summary,
    }
}

fn series_report(result: &PipelineResult) -> SeriesReport {
    let outcome = &result.outcome;
    SeriesReport {
        id: result.id.clone(),
        environment: result.environment.clone(),
        benchmark: result.benchmark.clone(),
        aspect: result.aspect,
        status: outcome.status,
        planned_points: result.planned_points,
        points: outcome.series.points().to_vec(),
        retries: outcome.retries,
        artifact: result.artifact.as_ref().map(|p| p.display().to_string()),
        failure: outcome.error.as_ref().map(failure_info),
        duration_ms: outcome.duration.as_secs_f64() * 1000.0,
    }
}

/// Diagnostics carried into the report for a fatal error
pub fn failure_info(err: &HarnessError) -> FailureInfo {
    FailureInfo {
        kind: err.kind().as_str().to_string(),
        message: err.to_string(),
        input_size: err.input_size(),
        captured_output: err.captured_output().map(str::to_string),
        generated_source: err.generated_source().map(str::to_string),
    }
}
