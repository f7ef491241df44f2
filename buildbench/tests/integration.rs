//! Integration tests for BuildBench
//!
//! These tests drive the harness end to end: scripted invokers for exact
//! scenarios, and real `sh` processes standing in for the build system.

use buildbench::{
    Aspect, BenchConfig, BenchmarkPlan, BuildInvoker, BuildResult, CommandInvoker, ErrorKind,
    Harness, RetryPolicy, RunStatus, Series, Sleeper, TemplateExpander,
};
use buildbench_cli::{ExecutionConfig, LaneExecutor, artifact_path, build_plan, build_report};
use std::cell::Cell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Counts sleeps without sleeping
#[derive(Default)]
struct CountingSleeper {
    count: Cell<usize>,
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.count.set(self.count.get() + 1);
    }
}

/// Pops one canned result per invocation
struct Canned {
    results: VecDeque<BuildResult>,
}

impl Canned {
    fn new(results: Vec<BuildResult>) -> Self {
        Self {
            results: results.into(),
        }
    }
}

impl BuildInvoker for Canned {
    fn write_source(&mut self, _code: &str) -> std::io::Result<()> {
        Ok(())
    }

    fn invoke(&mut self, _target: &str) -> BuildResult {
        self.results
            .pop_front()
            .unwrap_or_else(|| BuildResult::failure("unexpected invocation"))
    }

    fn source_path(&self) -> &Path {
        Path::new("measure.cpp")
    }
}

fn plan(template: &str, sizes: Vec<u64>) -> BenchmarkPlan {
    BenchmarkPlan {
        name: "bench".to_string(),
        expander: TemplateExpander::new("bench", template).unwrap(),
        sizes,
        aspect: Aspect::CompileTime,
    }
}

fn sh_invoker(build_dir: &Path, script: &str, timeout: Duration) -> CommandInvoker {
    CommandInvoker::new("sh", build_dir, build_dir.join("measure.cpp"), timeout)
        .with_args(vec!["-c".to_string(), script.to_string()])
}

const ECHO_SOURCE: &str = r#"printf '[compilation time: %s]\n' "$(cat {source})""#;

/// Sizes 1, 2, 3 with one stale build at size 2
#[test]
fn test_scenario_retry_once() {
    let mut invoker = Canned::new(vec![
        BuildResult::success("[compilation time: 0.5]"),
        BuildResult::success("ninja: no work to do."),
        BuildResult::success("[compilation time: 0.7]"),
        BuildResult::success("[compilation time: 0.9]"),
    ]);
    let sleeper = CountingSleeper::default();
    let policy = RetryPolicy {
        budget: 2,
        delay: Duration::from_millis(200),
    };

    let outcome = Harness::new(&mut invoker, policy)
        .with_sleeper(&sleeper)
        .run(&plan("{{ input_size }}", vec![1, 2, 3]));

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(sleeper.count.get(), 1);

    let csv = outcome.series.finalize().unwrap();
    assert_eq!(csv, "input_size,seconds\n1,0.5\n2,0.7\n3,0.9\n");
    assert_eq!(Series::from_csv(&csv).unwrap(), outcome.series);
}

/// Sizes 1, 2, 3 with a failed build at size 2
#[test]
fn test_scenario_failure_at_second_size() {
    let mut invoker = Canned::new(vec![
        BuildResult::success("[compilation time: 0.5]"),
        BuildResult::failure("error: no matching function"),
    ]);
    let sleeper = CountingSleeper::default();

    let outcome = Harness::new(&mut invoker, RetryPolicy::default())
        .with_sleeper(&sleeper)
        .run(&plan("{{ input_size }}", vec![1, 2, 3]));

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.series.finalize().unwrap(), "input_size,seconds\n1,0.5\n");
    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::Build);
    assert_eq!(err.input_size(), Some(2));
    assert_eq!(err.generated_source(), Some("2"));
}

/// A build that never prints a marker exhausts the budget exactly
#[test]
fn test_stale_build_budget() {
    let results = (0..6).map(|_| BuildResult::success("")).collect();
    let mut invoker = Canned::new(results);
    let sleeper = CountingSleeper::default();
    let policy = RetryPolicy {
        budget: 5,
        delay: Duration::ZERO,
    };

    let outcome = Harness::new(&mut invoker, policy)
        .with_sleeper(&sleeper)
        .run(&plan("{{ input_size }}", vec![7]));

    assert_eq!(outcome.error.unwrap().kind(), ErrorKind::StaleBuild);
    assert_eq!(sleeper.count.get(), 5);
    assert!(invoker.results.is_empty());
}

/// Real processes: the build tool reads the generated source
#[test]
fn test_command_invoker_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let build_dir = dir.path().join("build");
    let mut invoker = sh_invoker(&build_dir, ECHO_SOURCE, Duration::from_secs(10));

    let outcome = Harness::new(&mut invoker, RetryPolicy::default())
        .run(&plan("{{ input_size * 2 }}", vec![1, 2, 3]));

    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.error);
    let values: Vec<f64> = outcome
        .series
        .points()
        .iter()
        .map(|p| p.metric_value())
        .collect();
    assert_eq!(values, vec![2.0, 4.0, 6.0]);

    // source is emptied once the sweep is over
    assert_eq!(std::fs::read_to_string(build_dir.join("measure.cpp")).unwrap(), "");
}

/// Real processes: the first build per size is a no-op, the retry compiles
#[test]
fn test_command_invoker_stale_then_built() {
    let dir = tempfile::tempdir().unwrap();
    let build_dir = dir.path().join("build");
    let script = r#"if [ -f seen ]; then rm seen; printf '[compilation time: 0.25]\n'; else touch seen; echo 'ninja: no work to do.'; fi"#;
    let mut invoker = sh_invoker(&build_dir, script, Duration::from_secs(10));
    std::fs::create_dir_all(&build_dir).unwrap();
    let policy = RetryPolicy {
        budget: 2,
        delay: Duration::from_millis(10),
    };

    let outcome = Harness::new(&mut invoker, policy).run(&plan("{{ input_size }}", vec![1, 2, 3]));

    assert_eq!(outcome.status, RunStatus::Complete, "{:?}", outcome.error);
    assert_eq!(outcome.retries, 3);
    assert_eq!(outcome.series.len(), 3);
}

/// Real processes: a hung build is killed and reported as a build failure
#[test]
fn test_command_invoker_timeout_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let build_dir = dir.path().join("build");
    let mut invoker = sh_invoker(&build_dir, "sleep 30", Duration::from_secs(1));

    let start = std::time::Instant::now();
    let outcome = Harness::new(&mut invoker, RetryPolicy::default())
        .run(&plan("{{ input_size }}", vec![1, 2]));

    assert!(start.elapsed() < Duration::from_secs(15));
    assert_eq!(outcome.status, RunStatus::Aborted);
    assert!(outcome.series.is_empty());
    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::Build);
    assert!(err.stderr().unwrap().contains("timed out"));
}

fn write_project(root: &Path) -> PathBuf {
    std::fs::write(root.join("linear.j2"), "{{ input_size }}\n").unwrap();
    std::fs::write(root.join("broken.j2"), "{% for %}\n").unwrap();
    let config_path = root.join("buildbench.toml");
    std::fs::write(
        &config_path,
        r#"
[harness]
timeout_seconds = 10
retry_budget = 1
retry_delay_ms = 10

[build]
tool = "sh"
args = ["-c", '''printf '[compilation time: %s]\n' "$(cat {source})"''']

[output]
directory = "out"

[[environment]]
name = "left"
build_directory = "build/left"

[[environment]]
name = "right"
build_directory = "build/right"

[[benchmark]]
name = "linear"
template = "linear.j2"
range = { start = 1, end = 5, step = 2 }

[[benchmark]]
name = "broken"
template = "broken.j2"
range = { start = 1, end = 2 }
"#,
    )
    .unwrap();
    config_path
}

/// Full run from configuration: lanes, artifacts and report
#[test]
fn test_run_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_project(dir.path());
    let config = BenchConfig::load(&config_path).unwrap();
    config.validate().unwrap();

    let plan = build_plan(&config, None, None);
    assert_eq!(plan.lanes.len(), 2);
    assert_eq!(plan.pipeline_count(), 4);

    let mut exec_config = ExecutionConfig::from_config(&config);
    exec_config.jobs = 2;
    exec_config.show_progress = false;
    let cancel = AtomicBool::new(false);
    let results = LaneExecutor::new(exec_config, &cancel).execute(&plan).unwrap();
    assert_eq!(results.len(), 4);

    for env in ["left", "right"] {
        let path = artifact_path(&dir.path().join("out"), env, "linear");
        let series = Series::from_csv(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let points: Vec<(u64, f64)> = series
            .points()
            .iter()
            .map(|p| (p.input_size(), p.metric_value()))
            .collect();
        assert_eq!(points, vec![(1, 1.0), (3, 3.0), (5, 5.0)]);

        // malformed template: aborted before anything was built, no artifact
        assert!(!artifact_path(&dir.path().join("out"), env, "broken").exists());
    }

    let report = build_report(&results, 10.0);
    assert_eq!(report.summary.complete, 2);
    assert_eq!(report.summary.aborted, 2);
    let broken = report
        .series
        .iter()
        .find(|s| s.id == "left/broken")
        .unwrap();
    assert_eq!(broken.failure.as_ref().unwrap().kind, "template");
}

/// A cancelled run measures nothing and writes nothing
#[test]
fn test_run_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchConfig::load(write_project(dir.path())).unwrap();
    let re = regex::Regex::new("linear").unwrap();
    let plan = build_plan(&config, Some(&re), Some("left"));
    assert_eq!(plan.pipeline_count(), 1);

    let mut exec_config = ExecutionConfig::from_config(&config);
    exec_config.show_progress = false;
    let cancel = AtomicBool::new(true);
    let results = LaneExecutor::new(exec_config, &cancel).execute(&plan).unwrap();

    assert_eq!(results[0].outcome.status, RunStatus::Cancelled);
    assert!(results[0].artifact.is_none());
}

/// A run that measures nothing does not leave an earlier run's series behind
#[test]
fn test_failed_run_removes_previous_series() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.j2"), "{{ input_size }}\n").unwrap();
    let config_path = dir.path().join("buildbench.toml");
    std::fs::write(
        &config_path,
        r#"
[build]
tool = "sh"
args = ["-c", "exit 1"]

[output]
directory = "out"

[[environment]]
name = "e"

[[benchmark]]
name = "b"
template = "b.j2"
range = { start = 1, end = 3 }
"#,
    )
    .unwrap();

    let previous = artifact_path(&dir.path().join("out"), "e", "b");
    std::fs::create_dir_all(previous.parent().unwrap()).unwrap();
    std::fs::write(&previous, "input_size,seconds\n1,9.9\n2,9.9\n").unwrap();

    let config = BenchConfig::load(&config_path).unwrap();
    let mut exec_config = ExecutionConfig::from_config(&config);
    exec_config.show_progress = false;
    let cancel = AtomicBool::new(false);
    let results = LaneExecutor::new(exec_config, &cancel)
        .execute(&build_plan(&config, None, None))
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome.status, RunStatus::Aborted);
    assert_eq!(
        results[0].outcome.error.as_ref().unwrap().kind(),
        ErrorKind::Build
    );
    assert!(results[0].artifact.is_none());
    assert!(!previous.exists());
}
