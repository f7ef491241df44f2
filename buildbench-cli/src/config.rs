//! Configuration loading from buildbench.toml
//!
//! The configuration is discovered by walking up from the current directory,
//! or given explicitly with `--config`. Relative paths inside the file are
//! resolved against the directory containing it.

use crate::retry::RetryPolicy;
use buildbench_core::Aspect;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up by [`BenchConfig::discover`]
pub const CONFIG_FILE_NAME: &str = "buildbench.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Configuration file
        path: PathBuf,
        /// Parser error
        #[source]
        source: toml::de::Error,
    },

    /// Values parsed but are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// BuildBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BenchConfig {
    /// Harness behavior: timeout, retries, build directory
    #[serde(default)]
    pub harness: HarnessConfig,
    /// How the build tool is invoked
    #[serde(default)]
    pub build: BuildConfig,
    /// Where artifacts go
    #[serde(default)]
    pub output: OutputConfig,
    /// Compiler environments, one sweep per environment
    #[serde(default, rename = "environment")]
    pub environments: Vec<EnvironmentConfig>,
    /// Benchmarks to sweep
    #[serde(default, rename = "benchmark")]
    pub benchmarks: Vec<BenchmarkConfig>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Wall-clock budget for a single build invocation
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Build directory shared by environments that do not set their own
    #[serde(default = "default_build_directory")]
    pub build_directory: PathBuf,
    /// Re-invocations allowed when a build prints no timing marker
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Pause before each re-invocation
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            build_directory: default_build_directory(),
            retry_budget: default_retry_budget(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl HarnessConfig {
    /// Per-invocation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Stale-build retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            budget: self.retry_budget,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    60
}
fn default_build_directory() -> PathBuf {
    PathBuf::from("build")
}
fn default_retry_budget() -> u32 {
    10
}
fn default_retry_delay_ms() -> u64 {
    200
}

/// Build tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build tool executable
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Arguments; `{build_dir}`, `{target}` and `{source}` are substituted
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Target that compiles the generated source and prints the compile time
    #[serde(default = "default_compile_target")]
    pub compile_target: String,
    /// Target that runs the compiled program and prints the execution time
    #[serde(default = "default_run_target")]
    pub run_target: String,
    /// Generated source file, relative to the build directory
    #[serde(default = "default_source_file")]
    pub source_file: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            args: default_args(),
            compile_target: default_compile_target(),
            run_target: default_run_target(),
            source_file: default_source_file(),
        }
    }
}

fn default_tool() -> String {
    "cmake".to_string()
}
fn default_args() -> Vec<String> {
    ["--build", "{build_dir}", "--target", "{target}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_compile_target() -> String {
    "compile.benchmark.measure".to_string()
}
fn default_run_target() -> String {
    "run.benchmark.measure".to_string()
}
fn default_source_file() -> PathBuf {
    PathBuf::from("measure.cpp")
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory CSV artifacts are written to
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// Summary format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            format: default_format(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/buildbench")
}
fn default_format() -> String {
    "human".to_string()
}

/// A compiler environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name, first half of a pipeline id
    pub name: String,
    /// Exported to the build tool as `CXX`
    #[serde(default)]
    pub compiler: Option<String>,
    /// Exported, with the include paths, as `CXXFLAGS`
    #[serde(default)]
    pub flags: Vec<String>,
    /// Appended to `CXXFLAGS` as `-I<path>`
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    /// Overrides `harness.build_directory`
    #[serde(default)]
    pub build_directory: Option<PathBuf>,
}

impl EnvironmentConfig {
    /// Environment used when the file declares none
    pub fn implicit() -> Self {
        Self {
            name: "default".to_string(),
            compiler: None,
            flags: Vec::new(),
            include_paths: Vec::new(),
            build_directory: None,
        }
    }

    /// Variables exported to every build invocation
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![("BUILDBENCH_ENVIRONMENT".to_string(), self.name.clone())];
        if let Some(compiler) = &self.compiler {
            vars.push(("CXX".to_string(), compiler.clone()));
        }

        let mut cxxflags = self.flags.clone();
        cxxflags.extend(
            self.include_paths
                .iter()
                .map(|p| format!("-I{}", p.display())),
        );
        if !cxxflags.is_empty() {
            vars.push(("CXXFLAGS".to_string(), cxxflags.join(" ")));
        }
        vars
    }
}

/// A benchmark: a template swept over a range of sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Benchmark name, second half of a pipeline id
    pub name: String,
    /// Template file
    pub template: PathBuf,
    /// Quantity collected
    #[serde(default)]
    pub aspect: Aspect,
    /// Sizes to sweep
    pub range: SizeRange,
}

/// Inclusive size range `start..=end` walked by `step`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    /// First size
    pub start: u64,
    /// Last size, included when the step lands on it
    pub end: u64,
    /// Distance between sizes
    #[serde(default = "default_step")]
    pub step: u64,
}

fn default_step() -> u64 {
    1
}

impl SizeRange {
    /// Sizes in traversal order; empty when the range is invalid
    pub fn sizes(&self) -> Vec<u64> {
        if self.step == 0 || self.start > self.end {
            return Vec::new();
        }
        (self.start..=self.end)
            .step_by(usize::try_from(self.step).unwrap_or(usize::MAX))
            .collect()
    }

    fn validate(&self, benchmark: &str) -> Result<(), ConfigError> {
        if self.step == 0 {
            return Err(ConfigError::Invalid(format!(
                "benchmark '{}': range step must be greater than 0",
                benchmark
            )));
        }
        if self.start > self.end {
            return Err(ConfigError::Invalid(format!(
                "benchmark '{}': range start {} is after end {}",
                benchmark, self.start, self.end
            )));
        }
        Ok(())
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Find `buildbench.toml` by walking up from the current directory
    pub fn discover() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harness.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "harness.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.build.tool.trim().is_empty() {
            return Err(ConfigError::Invalid("build.tool is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for env in &self.environments {
            if env.name.trim().is_empty() {
                return Err(ConfigError::Invalid("environment with empty name".to_string()));
            }
            if !seen.insert(env.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate environment '{}'",
                    env.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for bench in &self.benchmarks {
            if bench.name.trim().is_empty() {
                return Err(ConfigError::Invalid("benchmark with empty name".to_string()));
            }
            if !seen.insert(bench.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate benchmark '{}'",
                    bench.name
                )));
            }
            bench.range.validate(&bench.name)?;
        }
        Ok(())
    }

    /// Configured environments, or the implicit default one
    pub fn effective_environments(&self) -> Vec<EnvironmentConfig> {
        if self.environments.is_empty() {
            vec![EnvironmentConfig::implicit()]
        } else {
            self.environments.clone()
        }
    }

    /// Resolve a path from the file against the config directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Build directory an environment runs in
    pub fn build_directory_for(&self, env: &EnvironmentConfig) -> PathBuf {
        let dir = env
            .build_directory
            .as_deref()
            .unwrap_or(&self.harness.build_directory);
        self.resolve(dir)
    }

    /// Generated source path inside `build_dir`
    pub fn source_file_in(&self, build_dir: &Path) -> PathBuf {
        if self.build.source_file.is_absolute() {
            self.build.source_file.clone()
        } else {
            build_dir.join(&self.build.source_file)
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# BuildBench Configuration

[harness]
# Wall-clock budget for one build invocation, in seconds
timeout_seconds = 60
# Build directory (relative to this file)
build_directory = "build"
# Re-invocations allowed when the build prints no timing marker
retry_budget = 10
# Pause before each re-invocation, in milliseconds
retry_delay_ms = 200

[build]
# Build tool and its arguments; {build_dir}, {target} and {source} are substituted
tool = "cmake"
args = ["--build", "{build_dir}", "--target", "{target}"]
# Target compiling the generated source (prints [compilation time: ...])
compile_target = "compile.benchmark.measure"
# Target running the compiled program (prints [execution time: ...])
run_target = "run.benchmark.measure"
# Generated source file, relative to the build directory
source_file = "measure.cpp"

[output]
# Directory for CSV artifacts
directory = "target/buildbench"
# Summary format: human or json
format = "human"

# One sweep per environment (uncomment to enable)
# [[environment]]
# name = "clang"
# compiler = "clang++"
# flags = ["-std=c++14", "-O2"]
# include_paths = ["include"]
# build_directory = "build/clang"

# [[benchmark]]
# name = "fold_left"
# template = "benchmark/fold_left.cpp.j2"
# aspect = "compile_time"  # or "execution_time"
# range = { start = 0, end = 100, step = 10 }
"#
        .to_string()
    }
}
