//! Timing Marker Extraction
//!
//! Build and run targets report their timing by printing a marker line such as
//! `[compilation time: 0.4213]`. Extraction scans captured output for the first
//! marker with the requested tag. Anything between the number and the closing
//! bracket, such as a unit suffix, is ignored.
//!
//! A missing marker is not an error: it is how a build that was skipped by the
//! build system shows up, and the caller decides whether to retry.

use regex::Regex;
use std::sync::OnceLock;

/// Known marker tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricTag {
    /// `[compilation time: …]`, printed by the compile target
    CompilationTime,
    /// `[execution time: …]`, printed by the measured program
    ExecutionTime,
}

impl MetricTag {
    /// Tag text as it appears inside the marker
    pub fn as_str(self) -> &'static str {
        match self {
            MetricTag::CompilationTime => "compilation time",
            MetricTag::ExecutionTime => "execution time",
        }
    }
}

impl std::fmt::Display for MetricTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], " ").as_str() {
            "compilation time" | "compile time" => Ok(MetricTag::CompilationTime),
            "execution time" => Ok(MetricTag::ExecutionTime),
            other => Err(format!("Unknown metric tag: {}", other)),
        }
    }
}

/// Result of scanning output for a marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extraction {
    /// Marker found, value in seconds
    Found(f64),
    /// No marker with a numeric value in the text
    NotFound,
}

impl Extraction {
    /// The value, if one was found
    pub fn value(self) -> Option<f64> {
        match self {
            Extraction::Found(v) => Some(v),
            Extraction::NotFound => None,
        }
    }
}

const VALUE_PATTERN: &str = r"((?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)";

fn marker_regex(tag: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)\[\s*{}\s*:\s*{}[^\]\n]*\]",
        regex::escape(tag),
        VALUE_PATTERN
    ))
}

fn scan(re: &Regex, text: &str) -> Extraction {
    re.captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map_or(Extraction::NotFound, Extraction::Found)
}

/// Scan `text` for `[<tag>: <seconds>]`, ignoring letter case.
pub fn extract(text: &str, tag: &str) -> Extraction {
    match marker_regex(tag) {
        Ok(re) => scan(&re, text),
        Err(_) => Extraction::NotFound,
    }
}

/// Scan `text` for one of the known markers, reusing a compiled pattern.
pub fn extract_metric(text: &str, tag: MetricTag) -> Extraction {
    static COMPILATION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    static EXECUTION_RE: OnceLock<Option<Regex>> = OnceLock::new();

    let cell = match tag {
        MetricTag::CompilationTime => &COMPILATION_RE,
        MetricTag::ExecutionTime => &EXECUTION_RE,
    };

    match cell.get_or_init(|| marker_regex(tag.as_str()).ok()) {
        Some(re) => scan(re, text),
        None => Extraction::NotFound,
    }
}

/// Render the marker line `extract` recognizes.
pub fn format_marker(tag: MetricTag, seconds: f64) -> String {
    format!("[{}: {}]", tag.as_str(), seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_found() {
        let out = "[ 50%] Building CXX object\n[compilation time: 0.4213]\n[100%] Built target";
        assert_eq!(extract(out, "compilation time"), Extraction::Found(0.4213));
    }

    #[test]
    fn test_extract_case_insensitive() {
        assert_eq!(
            extract("[Compilation Time: 1.5]", "compilation time"),
            Extraction::Found(1.5)
        );
        assert_eq!(
            extract("[compilation time: 1.5]", "COMPILATION TIME"),
            Extraction::Found(1.5)
        );
    }

    #[test]
    fn test_extract_not_found() {
        assert_eq!(extract("", "compilation time"), Extraction::NotFound);
        assert_eq!(
            extract("ninja: no work to do.", "compilation time"),
            Extraction::NotFound
        );
        // Other tag only
        assert_eq!(
            extract("[execution time: 0.2]", "compilation time"),
            Extraction::NotFound
        );
        // Not a number
        assert_eq!(
            extract("[compilation time: soon]", "compilation time"),
            Extraction::NotFound
        );
    }

    #[test]
    fn test_extract_exponent_and_integer() {
        assert_eq!(
            extract("[execution time: 2.5e-3]", "execution time"),
            Extraction::Found(0.0025)
        );
        assert_eq!(
            extract("[execution time: 3]", "execution time"),
            Extraction::Found(3.0)
        );
    }

    #[test]
    fn test_extract_ignores_text_after_value() {
        assert_eq!(
            extract("[compilation time: 1.5s]", "compilation time"),
            Extraction::Found(1.5)
        );
        assert_eq!(
            extract("[execution time: 0.42 seconds]", "execution time"),
            Extraction::Found(0.42)
        );
        // the marker still has to close on the same line
        assert_eq!(
            extract("[compilation time: 1.5\n]", "compilation time"),
            Extraction::NotFound
        );
    }

    #[test]
    fn test_extract_first_marker_wins() {
        let out = "[compilation time: 0.1]\n[compilation time: 0.2]";
        assert_eq!(extract(out, "compilation time"), Extraction::Found(0.1));
    }

    #[test]
    fn test_extract_tag_is_literal() {
        // Regex metacharacters in the tag are matched literally
        assert_eq!(extract("[a.b: 1.0]", "a.b"), Extraction::Found(1.0));
        assert_eq!(extract("[axb: 1.0]", "a.b"), Extraction::NotFound);
    }

    #[test]
    fn test_extract_metric_matches_extract() {
        let out = "[command line: g++ measure.cpp]\n[compilation time: 0.75]\n";
        assert_eq!(
            extract_metric(out, MetricTag::CompilationTime),
            extract(out, "compilation time")
        );
        assert_eq!(
            extract_metric(out, MetricTag::ExecutionTime),
            Extraction::NotFound
        );
    }

    #[test]
    fn test_format_marker_is_extractable() {
        let marker = format_marker(MetricTag::ExecutionTime, 0.125);
        assert_eq!(marker, "[execution time: 0.125]");
        assert_eq!(
            extract_metric(&marker, MetricTag::ExecutionTime),
            Extraction::Found(0.125)
        );
    }

    #[test]
    fn test_metric_tag_parse() {
        assert_eq!(
            "compilation-time".parse::<MetricTag>(),
            Ok(MetricTag::CompilationTime)
        );
        assert_eq!(
            "execution_time".parse::<MetricTag>(),
            Ok(MetricTag::ExecutionTime)
        );
    }
}
