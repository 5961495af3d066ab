//! Runscope Library
//!
//! Offline analytics over Spark event logs and reconciliation rule logs: per-stage
//! statistics, utilization scoring, rule/stage correlation, findings and run diffs.

pub mod config;
pub mod services;

// Re-export commonly used types
pub use config::{CommandLineArgs, Config};
pub use services::ReportWriter;
pub use services::run_analyzer::{
    AnalysisContext, DiffReport, ParseError, ParseResult, RunDiff, RunSummary, compare_runs,
    summarize_event_log,
};
