#![warn(missing_docs)]
//! BuildBench Report - Series and Output
//!
//! Holds measured series and renders them:
//! - CSV (one artifact per series, consumed by the charting frontend)
//! - JSON (full run report, machine-readable)

mod json;
mod report;
mod series;
mod tabular;

pub use json::{SCHEMA_VERSION, generate_json_report};
pub use report::{
    FailureInfo, ReportMeta, ReportSummary, RunReport, RunStatus, SeriesReport, SystemInfo,
};
pub use series::{Series, SeriesError};
pub use tabular::{CSV_HEADER, parse_csv, write_csv};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON with full schema
    Json,
    /// Human-readable terminal output
    #[default]
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
