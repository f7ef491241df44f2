//! Harness Errors
//!
//! Every variant is fatal for the pipeline it occurs in. A missing compile
//! marker is not an error on its own; it only becomes `StaleBuild` once the
//! retry budget is spent.

use buildbench_core::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal error of a measurement run
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Template could not be loaded or expanded
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Build tool exited unsuccessfully, timed out or could not be spawned
    #[error("Build of target '{target}' failed for input size {input_size}:\n{stderr}")]
    Build {
        /// Target that failed
        target: String,
        /// Size being measured
        input_size: u64,
        /// Captured standard error
        stderr: String,
        /// Source the build was given
        generated_source: String,
    },

    /// Retry budget exhausted without a timing marker
    #[error(
        "Stale build: target '{target}' printed no [{tag}] marker for input size {input_size} \
         after {attempts} attempts"
    )]
    StaleBuild {
        /// Target that kept skipping the build
        target: String,
        /// Size being measured
        input_size: u64,
        /// Marker tag that was expected
        tag: String,
        /// Invocations made, retries included
        attempts: u32,
        /// Standard output of the last invocation
        last_stdout: String,
        /// Source the build was given
        generated_source: String,
    },

    /// Run target succeeded without printing its marker
    #[error(
        "Target '{target}' printed no [{tag}] marker for input size {input_size}; \
         does the measured program report its time?"
    )]
    MissingMetric {
        /// Run target
        target: String,
        /// Size being measured
        input_size: u64,
        /// Marker tag that was expected
        tag: String,
        /// Standard output of the run
        stdout: String,
        /// Source the program was built from
        generated_source: String,
    },

    /// Generated source could not be written
    #[error("Failed to write generated source {path}: {source}")]
    SourceWrite {
        /// Generated source path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of [`HarnessError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed template or unknown parameter
    Template,
    /// Non-success exit status, including timeouts
    Build,
    /// Retry budget exhausted without a timing marker
    StaleBuild,
    /// Run target succeeded without printing its marker
    MissingMetric,
    /// Generated source could not be written
    Io,
}

impl ErrorKind {
    /// Stable identifier used in reports
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Template => "template",
            ErrorKind::Build => "build",
            ErrorKind::StaleBuild => "stale_build",
            ErrorKind::MissingMetric => "missing_metric",
            ErrorKind::Io => "io",
        }
    }
}

impl HarnessError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Template(_) => ErrorKind::Template,
            HarnessError::Build { .. } => ErrorKind::Build,
            HarnessError::StaleBuild { .. } => ErrorKind::StaleBuild,
            HarnessError::MissingMetric { .. } => ErrorKind::MissingMetric,
            HarnessError::SourceWrite { .. } => ErrorKind::Io,
        }
    }

    /// Input size the failure happened at, when one was being measured
    pub fn input_size(&self) -> Option<u64> {
        match self {
            HarnessError::Build { input_size, .. }
            | HarnessError::StaleBuild { input_size, .. }
            | HarnessError::MissingMetric { input_size, .. } => Some(*input_size),
            HarnessError::Template(_) | HarnessError::SourceWrite { .. } => None,
        }
    }

    /// Source text that was being built
    pub fn generated_source(&self) -> Option<&str> {
        match self {
            HarnessError::Build {
                generated_source, ..
            }
            | HarnessError::StaleBuild {
                generated_source, ..
            }
            | HarnessError::MissingMetric {
                generated_source, ..
            } => Some(generated_source),
            HarnessError::Template(_) | HarnessError::SourceWrite { .. } => None,
        }
    }

    /// Captured stderr of a failed build
    pub fn stderr(&self) -> Option<&str> {
        match self {
            HarnessError::Build { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Build output worth showing next to the error: stderr of a failed
    /// build, or the stdout that carried no marker
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            HarnessError::Build { stderr, .. } => Some(stderr),
            HarnessError::StaleBuild { last_stdout, .. } => Some(last_stdout),
            HarnessError::MissingMetric { stdout, .. } => Some(stdout),
            HarnessError::Template(_) | HarnessError::SourceWrite { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_diagnostics() {
        let err = HarnessError::Build {
            target: "compile.benchmark.measure".to_string(),
            input_size: 2,
            stderr: "error: no member named 'x'".to_string(),
            generated_source: "int main() { return x; }".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Build);
        assert_eq!(err.input_size(), Some(2));
        assert_eq!(err.stderr(), Some("error: no member named 'x'"));
        assert!(err.generated_source().unwrap().contains("return x"));
        assert!(err.to_string().contains("input size 2"));
    }

    #[test]
    fn test_stale_build_is_distinct() {
        let err = HarnessError::StaleBuild {
            target: "t".to_string(),
            input_size: 7,
            tag: "compilation time".to_string(),
            attempts: 4,
            last_stdout: "ninja: no work to do.".to_string(),
            generated_source: String::new(),
        };
        assert_eq!(err.kind(), ErrorKind::StaleBuild);
        assert_eq!(err.kind().as_str(), "stale_build");
        assert!(err.to_string().contains("after 4 attempts"));
        assert_eq!(err.captured_output(), Some("ninja: no work to do."));
        assert_eq!(err.stderr(), None);
    }
}
