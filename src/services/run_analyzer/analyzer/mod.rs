//! Run analyzer module
//!
//! Statistics, utilization scoring, correlation, insights and run diffs over
//! parsed event logs.

pub mod correlation;
pub mod diff;
pub mod executor_timeline;
pub mod insights;
pub mod order_stats;
pub mod reservoir;
pub mod stage_aggregator;
pub mod thresholds;
pub mod utilization;

pub use correlation::CorrelationEngine;
pub use diff::DiffEngine;
pub use executor_timeline::ExecutorTimeline;
pub use insights::{InsightEngine, InsightRule};
pub use order_stats::OrderStats;
pub use reservoir::Reservoir;
pub use stage_aggregator::{StageAggregator, StageAggregatorConfig, StageState};
pub use utilization::{UtilizationInputs, UtilizationScorer};
