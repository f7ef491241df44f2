//! Run Executor
//!
//! Runs planned pipelines and turns their outcomes into a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ExecutionPlan (lanes of pipelines)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Sweep sizes per pipeline, write CSV artifacts
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  Build RunReport with failure diagnostics
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Lane scheduling and pipeline execution
//! - [`report`] - Report building
//! - [`formatting`] - Human-readable output formatting
//! - [`metadata`] - System metadata collection

mod execution;
mod formatting;
mod metadata;
mod report;

pub use execution::{ExecutionConfig, LaneExecutor, PipelineResult, artifact_path};
pub use formatting::format_human_output;
pub use report::{build_report, failure_info};
