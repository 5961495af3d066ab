//! Fixed thresholds for run analysis
//!
//! All heuristics are explicit constants, grouped by the component that reads them.

// ============================================================================
// Utilization
// ============================================================================

pub mod utilization {
    /// Below this the cluster is under-utilized
    pub const UNDER_UTILIZED_BELOW: f64 = 0.45;

    /// Above this the cluster is over-utilized
    pub const OVER_UTILIZED_ABOVE: f64 = 0.90;

    /// Task count at which the task-count proxy saturates at 1.0
    pub const PROXY_SATURATION_TASKS: f64 = 2000.0;

    /// Average partitions below this size make the proxy pay an overhead penalty
    pub const PROXY_TINY_PARTITION_MB: f64 = 16.0;
    pub const PROXY_INPUT_PENALTY: f64 = 0.15;
    pub const PROXY_SHUFFLE_PENALTY: f64 = 0.20;
}

// ============================================================================
// Insights
// ============================================================================

pub mod insights {
    pub const OVERHEAD_MAX_DURATION_MS: i64 = 120_000;
    pub const OVERHEAD_MAX_TASKS: u64 = 200;
    pub const OVERHEAD_MAX_MEDIAN_STAGE_MS: f64 = 200.0;
    pub const OVERHEAD_MAX_UTILIZATION: f64 = 0.25;

    /// Stages shorter than this count as tiny
    pub const TINY_STAGE_MS: i64 = 200;

    /// Tasks per available slot below which parallelism is too low
    pub const MIN_TASKS_PER_SLOT: u64 = 4;

    /// GC time / executor run time
    pub const GC_PRESSURE_RATIO: f64 = 0.20;

    /// 10 GB, decimal
    pub const SPILL_BYTES: u64 = 10_000_000_000;

    pub const SKEW_RATIO: f64 = 6.0;

    pub const TOP_STAGES: usize = 3;
    pub const TOP_RULES: usize = 3;

    pub const LOW_YIELD_MATCH_PCT: f64 = 5.0;
    pub const LOW_YIELD_MIN_CANDIDATES: u64 = 100_000;
}

// ============================================================================
// Run Signals / Partition Sizing
// ============================================================================

pub mod partitions {
    /// Average partition size (MB) below which partitions are too small
    pub const SMALL_MB: f64 = 32.0;

    /// Below this partitions are tiny
    pub const TINY_MB: f64 = 16.0;

    /// Upper end of the healthy band
    pub const HEALTHY_MAX_MB: f64 = 256.0;

    /// Above this partitions are too large
    pub const LARGE_MB: f64 = 512.0;

    /// Spill (decimal GB) that raises the spill signal
    pub const SPILL_SIGNAL_GB: f64 = 1.0;
}

// ============================================================================
// Diff
// ============================================================================

pub mod diff {
    /// Baselines with an absolute value at or below this have no percent delta
    pub const ZERO_EPSILON: f64 = 1e-9;

    pub const DURATION_PCT: f64 = 20.0;
    pub const DURATION_ABS_MS: f64 = 5000.0;

    pub const SPILL_ABS_GB: f64 = 2.0;

    pub const UTIL_SCORE_POINTS: f64 = 15.0;

    pub const RULE_TIME_PCT: f64 = 25.0;

    /// Match-percentage significance band, in points
    pub const MATCH_PCT_POINTS: f64 = 2.0;

    pub const CONTRIBUTION_MAJOR: f64 = 2.0;
    pub const CONTRIBUTION_MINOR: f64 = 0.5;
}
