//! System Metadata Collection
//!
//! Collects the host and revision a run was measured on.
//!
//! ## Collected Data
//!
//! - **Git**: Current commit hash, when run inside a repository
//! - **OS**: Operating system name and architecture
//! - **CPU**: Available core count
//! - **Timestamp**: UTC time of report generation

use buildbench_report::{ReportMeta, SCHEMA_VERSION, SystemInfo};
use chrono::Utc;

/// Build report metadata including system info and git details
pub fn build_report_meta() -> ReportMeta {
    let git_commit = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let system = SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpu_cores: num_cpus(),
    };

    ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        git_commit,
        system,
    }
}

/// Get number of available CPU cores
fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
