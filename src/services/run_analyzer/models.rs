//! Run analysis data models
//!
//! Everything produced by the pipeline is a plain serde model: a `RunSummary` per
//! parsed event log and a `RunDiff` per compared pair. Ratios that cannot be computed
//! are `None` and serialize as `null`, never as 0.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat evidence map attached to utilization scores and findings
pub type Evidence = BTreeMap<String, serde_json::Value>;

// ============================================================================
// Stage Identity
// ============================================================================

/// Composite stage key; ordering is by stage id, then attempt id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageKey {
    pub stage_id: i32,
    pub attempt_id: i32,
}

impl StageKey {
    pub fn new(stage_id: i32, attempt_id: i32) -> Self {
        Self { stage_id, attempt_id }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.stage_id, self.attempt_id)
    }
}

// ============================================================================
// Parse Diagnostics
// ============================================================================

/// Per-parse counters. One instance per parse, never shared across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostics {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub malformed_lines: u64,
    /// Listener events of kinds the analyzer does not track
    pub ignored_events: u64,
    pub task_end_events: u64,
    /// TaskEnd events whose stage could not be resolved
    pub orphaned_task_ends: u64,
    pub task_ends_without_metrics: u64,
    /// Input ended on a read error instead of a clean EOF
    pub truncated: bool,
}

// ============================================================================
// Executors
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub max_concurrent: u32,
    pub total_added: u32,
    pub total_removed: u32,
    /// Time-weighted average over the run window; `None` when the window is undefined
    pub avg_concurrency: Option<f64>,
    pub executor_cores: Option<u32>,
}

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage_id: i32,
    pub attempt_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub submission_time_ms: Option<i64>,
    pub completion_time_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    /// Submission/completion were inferred from task launch/finish times
    pub times_inferred: bool,
    pub num_tasks: u64,
    pub executor_run_time_ms: u64,
    pub gc_time_ms: u64,
    pub shuffle_read_bytes: u64,
    pub shuffle_write_bytes: u64,
    pub input_bytes: u64,
    pub spill_memory_bytes: u64,
    pub spill_disk_bytes: u64,
    pub max_task_duration_ms: i64,
    pub p50_task_duration_ms: i64,
    pub p95_task_duration_ms: i64,
    /// max / p50, 0 when p50 is 0
    pub skew_ratio: f64,
    /// Share of sampled tasks slower than 3 x p50
    pub straggler_fraction: f64,
    /// Number of task durations the order statistics were computed from
    pub sampled_tasks: usize,
}

impl StageSummary {
    pub fn key(&self) -> StageKey {
        StageKey::new(self.stage_id, self.attempt_id)
    }

    pub fn spill_bytes(&self) -> u64 {
        self.spill_memory_bytes + self.spill_disk_bytes
    }

    /// Valid time window, only when completion is after submission
    pub fn window(&self) -> Option<(i64, i64)> {
        match (self.submission_time_ms, self.completion_time_ms) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        }
    }
}

/// Compact stage entry for the top-N lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHotspot {
    pub stage_id: i32,
    pub attempt_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub executor_run_time_ms: u64,
    pub shuffle_write_bytes: u64,
    pub input_bytes: u64,
    pub num_tasks: u64,
}

impl From<&StageSummary> for StageHotspot {
    fn from(s: &StageSummary) -> Self {
        Self {
            stage_id: s.stage_id,
            attempt_id: s.attempt_id,
            name: s.name.clone(),
            executor_run_time_ms: s.executor_run_time_ms,
            shuffle_write_bytes: s.shuffle_write_bytes,
            input_bytes: s.input_bytes,
            num_tasks: s.num_tasks,
        }
    }
}

// ============================================================================
// Rule Log
// ============================================================================

/// One matching-engine rule execution extracted from a driver log line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleMetric {
    pub rule: String,
    pub match_candidates: Option<u64>,
    pub matches: Option<u64>,
    pub matches_from_ageing_breaks: Option<u64>,
    pub total_unmatched: Option<u64>,
    pub total_match_pct: Option<f64>,
    pub match_time_sec: Option<f64>,
    /// Epoch millis of the log line, `None` when the prefix was missing or unparsable
    pub end_timestamp_ms: Option<i64>,
}

// ============================================================================
// Correlation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOverlap {
    pub stage_id: i32,
    pub attempt_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,
    pub overlap_ms: i64,
    /// overlap / rule window duration
    pub overlap_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub rule: String,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub window_duration_ms: i64,
    /// Sorted by overlap descending
    pub overlaps: Vec<StageOverlap>,
}

// ============================================================================
// Utilization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UtilizationClass {
    #[serde(rename = "Under-utilized")]
    UnderUtilized,
    Balanced,
    #[serde(rename = "Over-utilized")]
    OverUtilized,
    #[default]
    Unknown,
}

impl UtilizationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            UtilizationClass::UnderUtilized => "Under-utilized",
            UtilizationClass::Balanced => "Balanced",
            UtilizationClass::OverUtilized => "Over-utilized",
            UtilizationClass::Unknown => "Unknown",
        }
    }
}

/// Which formula produced the utilization value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UtilizationBasis {
    /// executor run time / (avg concurrency x cores x duration)
    SlotTime,
    /// min(1, tasks / 2000), used only when no executor events were logged
    TaskCountProxy,
    #[default]
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationScore {
    /// Bounded to [0, 1]
    pub utilization: f64,
    /// round(utilization x 100)
    pub score: u32,
    pub classification: UtilizationClass,
    pub basis: UtilizationBasis,
    pub evidence: Evidence,
}

// ============================================================================
// Insights
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    OverheadBound,
    UnderUtilized,
    LowParallelism,
    GcPressure,
    Spill,
    Skew,
    TopStage,
    SlowRule,
    LowYieldRule,
    RuleStageCorrelation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub message: String,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightSet {
    pub findings: Vec<Finding>,
    /// Run-wide evidence, populated even when no finding fires
    pub evidence: Evidence,
}

impl InsightSet {
    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }
}

// ============================================================================
// Run Totals & Signals
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total_stages: usize,
    pub total_tasks: u64,
    pub executor_run_time_ms: u64,
    pub gc_time_ms: u64,
    pub spill_bytes: u64,
    pub input_bytes: u64,
    pub shuffle_read_bytes: u64,
    pub shuffle_write_bytes: u64,
    /// Decimal gigabytes
    pub spill_gb: f64,
    /// 100 x gc / executor run time
    pub gc_over_exec_pct: Option<f64>,
    pub avg_input_partition_mb: f64,
    pub avg_shuffle_partition_mb: f64,
    pub median_stage_duration_ms: f64,
    pub tiny_stages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunSignal {
    InputOverPartitioned,
    InputUnderPartitioned,
    ShufflePartitionsTooHigh,
    ShufflePartitionsTooLow,
    SpillDetected,
    ClusterUnderUtilized,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionSuggestions {
    pub input: String,
    pub shuffle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeeded,
    #[default]
    Unknown,
}

// ============================================================================
// Run Summary
// ============================================================================

/// Immutable snapshot of one parsed run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub status: RunStatus,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub spark_conf: BTreeMap<String, String>,
    pub executors: ExecutorSummary,
    /// Sorted by (stage id, attempt id)
    pub stages: Vec<StageSummary>,
    /// In log order
    pub rules: Vec<RuleMetric>,
    pub correlations: Vec<Correlation>,
    pub totals: RunTotals,
    pub signals: Vec<RunSignal>,
    pub partition_suggestions: PartitionSuggestions,
    pub utilization: UtilizationScore,
    pub insights: InsightSet,
    pub top_stages_by_executor_time: Vec<StageHotspot>,
    pub top_rules_by_time: Vec<RuleMetric>,
    pub diagnostics: ParseDiagnostics,
}

// ============================================================================
// Run Diff
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: String,
    pub baseline: Option<f64>,
    pub candidate: Option<f64>,
    pub abs_delta: Option<f64>,
    /// `None` when the baseline is ~0 or either side is missing
    pub pct_delta: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffTag {
    DurationRegressed,
    DurationImproved,
    SpillIncreased,
    SpillReduced,
    UtilizationDropped,
    UtilizationImproved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeClass {
    Improved,
    Regressed,
    Unchanged,
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTimeDiff {
    pub rule: String,
    pub baseline_time_sec: f64,
    pub candidate_time_sec: f64,
    pub abs_delta_sec: f64,
    pub pct_delta: Option<f64>,
    pub classification: ChangeClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchQualityDiff {
    pub baseline_match_pct: Option<f64>,
    pub candidate_match_pct: Option<f64>,
    pub abs_delta_pct: Option<f64>,
    pub pct_delta: Option<f64>,
    pub classification: ChangeClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatchPctDiff {
    pub rule: String,
    pub baseline_match_pct: f64,
    pub candidate_match_pct: f64,
    pub abs_delta_pct: f64,
    pub pct_delta: Option<f64>,
    pub classification: ChangeClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionImpact {
    MajorPositive,
    MinorPositive,
    Neutral,
    MinorNegative,
    MajorNegative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatchContribution {
    pub rule: String,
    pub baseline_candidates: u64,
    pub candidate_candidates: u64,
    pub baseline_matches: u64,
    pub candidate_matches: u64,
    pub baseline_match_pct: f64,
    pub candidate_match_pct: f64,
    /// Weighted change in percentage points of the overall match rate
    pub contribution_pct_points: f64,
    pub impact: ContributionImpact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecisionRecallPattern {
    PrecisionUpRecallDown,
    PrecisionDownRecallUp,
    BothUp,
    BothDown,
    NoSignificantChange,
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallDiff {
    pub baseline_matches: u64,
    pub candidate_matches: u64,
    pub baseline_unmatched: u64,
    pub candidate_unmatched: u64,
    /// matches / (matches + unmatched)
    pub baseline_match_pct: Option<f64>,
    pub candidate_match_pct: Option<f64>,
    pub classification: PrecisionRecallPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingTimeDiff {
    pub baseline_total_sec: f64,
    pub candidate_total_sec: f64,
    pub pct_change: Option<f64>,
}

/// Comparison of a baseline and a candidate run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDiff {
    pub baseline_run_id: Option<String>,
    pub candidate_run_id: Option<String>,
    pub deltas: Vec<MetricDelta>,
    pub regressions: Vec<DiffTag>,
    pub improvements: Vec<DiffTag>,
    pub baseline_partition_suggestions: PartitionSuggestions,
    pub candidate_partition_suggestions: PartitionSuggestions,
    pub matching_time: MatchingTimeDiff,
    pub rules_only_in_baseline: Vec<String>,
    pub rules_only_in_candidate: Vec<String>,
    /// Sorted by seconds delta descending, largest slowdown first
    pub rule_time_diffs: Vec<RuleTimeDiff>,
    pub overall_match_quality: MatchQualityDiff,
    /// Sorted by signed delta ascending, most regressed first
    pub rule_match_pct_diffs: Vec<RuleMatchPctDiff>,
    /// Sorted by |contribution| descending
    pub rule_match_contributions: Vec<RuleMatchContribution>,
    pub precision_recall: PrecisionRecallDiff,
}

impl RunDiff {
    pub fn delta(&self, metric: &str) -> Option<&MetricDelta> {
        self.deltas.iter().find(|d| d.metric == metric)
    }
}

/// Serialized shape of `diff.json`: the diff plus both summaries it came from
#[derive(Debug, Serialize)]
pub struct DiffReport<'a> {
    pub baseline: &'a RunSummary,
    pub candidate: &'a RunSummary,
    pub diff: &'a RunDiff,
}
