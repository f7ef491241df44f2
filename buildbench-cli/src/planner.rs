//! Run Planner
//!
//! Expands the configuration into `(environment, benchmark)` pipelines and
//! groups them into lanes by generated source file.
//!
//! Filtering options:
//! - Regex pattern matching on the pipeline id `<environment>/<benchmark>`
//! - A single environment by name
//!
//! Pipelines writing the same generated source file run in one lane, one
//! after another. With a relative `build.source_file` that is one lane per
//! build directory; an absolute one puts every environment in a single lane.
//! Lanes are ordered by source path and pipelines keep configuration order.

use crate::config::{BenchConfig, BenchmarkConfig, EnvironmentConfig};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One benchmark swept in one environment
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// `<environment>/<benchmark>`
    pub id: String,
    /// Environment the benchmark is built in
    pub environment: EnvironmentConfig,
    /// Benchmark being swept
    pub benchmark: BenchmarkConfig,
    /// Build directory the targets are invoked in
    pub build_dir: PathBuf,
    /// Generated source file inside the build directory
    pub source_path: PathBuf,
    /// Template file, resolved against the config directory
    pub template_path: PathBuf,
    /// Sizes in traversal order
    pub sizes: Vec<u64>,
}

/// Pipelines bound to one generated source file
#[derive(Debug, Clone)]
pub struct Lane {
    /// Generated source file every pipeline of the lane writes
    pub source_path: PathBuf,
    /// Pipelines in execution order
    pub pipelines: Vec<Pipeline>,
}

/// Execution plan for a run
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Independent lanes, ordered by source path
    pub lanes: Vec<Lane>,
}

impl ExecutionPlan {
    /// All pipelines in execution order
    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.lanes.iter().flat_map(|l| l.pipelines.iter())
    }

    /// Number of pipelines across all lanes
    pub fn pipeline_count(&self) -> usize {
        self.lanes.iter().map(|l| l.pipelines.len()).sum()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.pipeline_count() == 0
    }
}

/// Build the execution plan from a validated configuration.
pub fn build_plan(
    config: &BenchConfig,
    filter: Option<&Regex>,
    environment: Option<&str>,
) -> ExecutionPlan {
    let mut lanes: BTreeMap<PathBuf, Vec<Pipeline>> = BTreeMap::new();

    for env in config.effective_environments() {
        if let Some(name) = environment {
            if env.name != name {
                continue;
            }
        }
        let build_dir = config.build_directory_for(&env);
        let source_path = config.source_file_in(&build_dir);

        for bench in &config.benchmarks {
            let id = format!("{}/{}", env.name, bench.name);
            if let Some(re) = filter {
                if !re.is_match(&id) {
                    continue;
                }
            }

            lanes.entry(source_path.clone()).or_default().push(Pipeline {
                id,
                environment: env.clone(),
                benchmark: bench.clone(),
                build_dir: build_dir.clone(),
                source_path: source_path.clone(),
                template_path: config.resolve(&bench.template),
                sizes: bench.range.sizes(),
            });
        }
    }

    ExecutionPlan {
        lanes: lanes
            .into_iter()
            .map(|(source_path, pipelines)| Lane {
                source_path,
                pipelines,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> BenchConfig {
        let mut config: BenchConfig = toml::from_str(
            r#"
            [[environment]]
            name = "gcc"
            build_directory = "build/gcc"

            [[environment]]
            name = "clang"
            build_directory = "build/clang"

            [[environment]]
            name = "clang-libcxx"
            build_directory = "build/clang"

            [[benchmark]]
            name = "fold_left"
            template = "fold_left.cpp.j2"
            range = { start = 0, end = 20, step = 10 }

            [[benchmark]]
            name = "transform"
            template = "transform.cpp.j2"
            range = { start = 1, end = 3 }
            "#,
        )
        .unwrap();
        config.base_dir = PathBuf::from("/project");
        config
    }

    #[test]
    fn test_lanes_group_by_build_directory() {
        let plan = build_plan(&config(), None, None);
        assert_eq!(plan.pipeline_count(), 6);
        assert_eq!(plan.lanes.len(), 2);

        let clang = &plan.lanes[0];
        assert_eq!(
            clang.source_path,
            Path::new("/project/build/clang/measure.cpp")
        );
        let ids: Vec<&str> = clang.pipelines.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "clang/fold_left",
                "clang/transform",
                "clang-libcxx/fold_left",
                "clang-libcxx/transform"
            ]
        );
        assert_eq!(
            plan.lanes[1].source_path,
            Path::new("/project/build/gcc/measure.cpp")
        );
    }

    #[test]
    fn test_absolute_source_file_shares_one_lane() {
        let mut config = config();
        config.build.source_file = PathBuf::from("/tmp/shared/measure.cpp");
        let plan = build_plan(&config, None, None);

        assert_eq!(plan.lanes.len(), 1);
        assert_eq!(plan.lanes[0].pipelines.len(), 6);
        assert!(
            plan.pipelines()
                .all(|p| p.source_path == Path::new("/tmp/shared/measure.cpp"))
        );
        // each environment still builds in its own directory
        let dirs: std::collections::BTreeSet<&Path> =
            plan.pipelines().map(|p| p.build_dir.as_path()).collect();
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn test_pipeline_paths_and_sizes() {
        let plan = build_plan(&config(), None, Some("gcc"));
        let first = plan.pipelines().next().unwrap();
        assert_eq!(first.source_path, Path::new("/project/build/gcc/measure.cpp"));
        assert_eq!(first.template_path, Path::new("/project/fold_left.cpp.j2"));
        assert_eq!(first.sizes, vec![0, 10, 20]);
    }

    #[test]
    fn test_filter_matches_pipeline_id() {
        let re = Regex::new("^clang/").unwrap();
        let plan = build_plan(&config(), Some(&re), None);
        let ids: Vec<&str> = plan.pipelines().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["clang/fold_left", "clang/transform"]);
    }

    #[test]
    fn test_unknown_environment_is_empty() {
        assert!(build_plan(&config(), None, Some("msvc")).is_empty());
    }

    #[test]
    fn test_implicit_environment() {
        let mut config = config();
        config.environments.clear();
        let plan = build_plan(&config, None, None);
        assert_eq!(plan.lanes.len(), 1);
        assert_eq!(
            plan.pipelines().next().unwrap().build_dir,
            Path::new("/project/build")
        );
        assert!(plan.pipelines().all(|p| p.id.starts_with("default/")));
    }
}
