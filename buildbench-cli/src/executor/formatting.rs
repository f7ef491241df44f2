//! Output Formatting
//!
//! Human-readable summary of a run: one block per series with its status,
//! measured range and, for aborted runs, the failing size and build output.

use buildbench_report::{RunReport, RunStatus, SeriesReport};

/// Lines of captured output shown per failure
const OUTPUT_TAIL_LINES: usize = 20;

/// Format a report for human-readable terminal display
pub fn format_human_output(report: &RunReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("BuildBench Results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    // Group series by environment
    let mut groups: std::collections::BTreeMap<&str, Vec<&SeriesReport>> =
        std::collections::BTreeMap::new();
    for series in &report.series {
        groups.entry(&series.environment).or_default().push(series);
    }

    for (environment, series) in groups {
        output.push_str(&format!("Environment: {}\n", environment));
        output.push_str(&"-".repeat(60));
        output.push('\n');

        for s in series {
            let status_icon = match s.status {
                RunStatus::Complete => "✓",
                RunStatus::Aborted => "✗",
                RunStatus::Cancelled => "⊘",
            };
            output.push_str(&format!("  {} {} ({})\n", status_icon, s.benchmark, s.aspect));
            output.push_str(&format!(
                "      points: {}/{}  retries: {}  time: {:.1}s\n",
                s.points.len(),
                s.planned_points,
                s.retries,
                s.duration_ms / 1000.0
            ));

            if let (Some(first), Some(last)) = (s.points.first(), s.points.last()) {
                output.push_str(&format!(
                    "      size {} -> {:.4}s  ...  size {} -> {:.4}s\n",
                    first.input_size(),
                    first.metric_value(),
                    last.input_size(),
                    last.metric_value()
                ));
            }

            if let Some(artifact) = &s.artifact {
                output.push_str(&format!("      csv: {}\n", artifact));
            }

            if let Some(failure) = &s.failure {
                output.push_str(&format!(
                    "      error [{}]: {}\n",
                    failure.kind,
                    first_line(&failure.message)
                ));
                if let Some(captured) = failure.captured_output.as_deref() {
                    let tail = tail_lines(captured, OUTPUT_TAIL_LINES);
                    if !tail.is_empty() {
                        output.push_str("      output:\n");
                        for line in tail {
                            output.push_str(&format!("        | {}\n", line));
                        }
                    }
                }
            }

            output.push('\n');
        }
    }

    let summary = &report.summary;
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "{} series: {} complete, {} aborted, {} cancelled  ({} points, {} retries, {:.1}s)\n",
        summary.total_series,
        summary.complete,
        summary.aborted,
        summary.cancelled,
        summary.total_points,
        summary.total_retries,
        summary.total_duration_ms / 1000.0
    ));

    output
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].to_vec()
}
