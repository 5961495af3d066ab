//! Spark Run Analyzer
//!
//! Streams Spark event logs (and optional reconciliation rule logs) into per-run
//! summaries, scores cluster utilization, correlates rules with stages and diffs
//! two runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 summarize_event_log()                        │
//! │                           │                                  │
//! │           ┌───────────────┼────────────────┐                 │
//! │           ▼               ▼                ▼                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │   Parser     │  │  Analyzer    │  │   Models     │        │
//! │  │ ┌──────────┐ │  │ ┌──────────┐ │  │              │        │
//! │  │ │EventLog  │ │  │ │Stage     │ │  │  RunSummary  │        │
//! │  │ │Parser    │─┼──┼▶│Aggregator│ │  │  StageSummary│        │
//! │  │ └──────────┘ │  │ └──────────┘ │  │  RuleMetric  │        │
//! │  │ ┌──────────┐ │  │ ┌──────────┐ │  │  RunDiff     │        │
//! │  │ │Event     │ │  │ │Executor  │ │  │  ...         │        │
//! │  │ │Decoder   │ │  │ │Timeline  │ │  │              │        │
//! │  │ └──────────┘ │  │ └──────────┘ │  │              │        │
//! │  │ ┌──────────┐ │  │ ┌──────────┐ │  │              │        │
//! │  │ │RuleLog   │ │  │ │Utilizatn │ │  │              │        │
//! │  │ │Parser    │ │  │ │Correlate │ │  │              │        │
//! │  │ └──────────┘ │  │ │Insights  │ │  │              │        │
//! │  │              │  │ └──────────┘ │  │              │        │
//! │  └──────────────┘  └──────────────┘  └──────────────┘        │
//! │                                                              │
//! │   compare_runs() ──▶ DiffEngine ──▶ RunDiff ──▶ prompt       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use runscope::services::run_analyzer::{AnalysisContext, compare_runs, summarize_event_log};
//!
//! let ctx = AnalysisContext::default();
//! let baseline = summarize_event_log(Path::new("a.json"), None, &ctx)?;
//! let candidate = summarize_event_log(Path::new("b.json.gz"), None, &ctx)?;
//! let diff = compare_runs(&baseline, &candidate);
//! println!("regressions: {:?}", diff.regressions);
//! ```

pub mod analyzer;
pub mod models;
pub mod parser;
pub mod prompt;


pub use analyzer::{DiffEngine, InsightEngine};
pub use models::*;
pub use parser::{EventLogParser, LogTimezone, ParseError, ParseResult, ParsedRun, RuleLogParser};

use analyzer::stage_aggregator::StageAggregatorConfig;
use analyzer::thresholds::{insights as insight_limits, partitions};
use analyzer::{CorrelationEngine, UtilizationInputs, UtilizationScorer};
use std::path::Path;

/// Settings one analysis runs with
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Task durations kept per stage for order statistics
    pub reservoir_capacity: usize,
    pub reservoir_seed: u64,
    /// Zone of the rule log's local timestamps
    pub timezone: LogTimezone,
    pub top_stages: usize,
    pub top_rules: usize,
}

impl Default for AnalysisContext {
    fn default() -> Self {
        let defaults = StageAggregatorConfig::default();
        Self {
            reservoir_capacity: defaults.reservoir_capacity,
            reservoir_seed: defaults.seed,
            timezone: LogTimezone::default(),
            top_stages: 10,
            top_rules: 50,
        }
    }
}

impl AnalysisContext {
    fn aggregator_config(&self) -> StageAggregatorConfig {
        StageAggregatorConfig { reservoir_capacity: self.reservoir_capacity, seed: self.reservoir_seed }
    }
}

/// Parse an event log (and optionally its rule log) and build the full summary.
///
/// This is the main entry point. It:
/// 1. Streams the event log into stage, executor and run-header state
/// 2. Extracts rule metrics from the rule log, if given
/// 3. Computes totals, signals, utilization, correlations and insights
pub fn summarize_event_log(
    event_log: &Path,
    rule_log: Option<&Path>,
    ctx: &AnalysisContext,
) -> ParseResult<RunSummary> {
    let parsed = EventLogParser::new(ctx.aggregator_config()).parse_path(event_log)?;
    let rules = match rule_log {
        Some(path) => RuleLogParser::new(ctx.timezone).parse_path(path)?,
        None => Vec::new(),
    };
    Ok(build_summary(parsed, rules, ctx))
}

/// Compare a baseline run with a candidate run
pub fn compare_runs(baseline: &RunSummary, candidate: &RunSummary) -> RunDiff {
    DiffEngine::diff(baseline, candidate)
}

/// Turn one parsed run plus its rules into an immutable summary.
pub fn build_summary(parsed: ParsedRun, rules: Vec<RuleMetric>, ctx: &AnalysisContext) -> RunSummary {
    let duration_ms = parsed.duration_ms();
    let status = parsed.status();
    let executors = parsed.executors.summarize(parsed.window(), parsed.executor_cores);
    let totals = compute_totals(&parsed.stages);

    let utilization = UtilizationScorer::score(&UtilizationInputs {
        executor_run_time_ms: totals.executor_run_time_ms,
        duration_ms,
        avg_concurrency: executors.avg_concurrency,
        max_executors: executors.max_concurrent,
        executor_cores: executors.executor_cores,
        has_executor_events: parsed.executors.has_events(),
        total_tasks: totals.total_tasks,
        avg_input_partition_mb: totals.avg_input_partition_mb,
        avg_shuffle_partition_mb: totals.avg_shuffle_partition_mb,
    });

    let signals = run_signals(&totals, &utilization);
    let partition_suggestions = PartitionSuggestions {
        input: input_partition_suggestion(totals.avg_input_partition_mb),
        shuffle: shuffle_partition_suggestion(totals.avg_shuffle_partition_mb),
    };

    let mut summary = RunSummary {
        run_id: parsed.app_id,
        app_name: parsed.app_name,
        status,
        start_time_ms: parsed.start_time_ms,
        end_time_ms: parsed.end_time_ms,
        duration_ms,
        spark_conf: parsed.spark_conf,
        executors,
        correlations: CorrelationEngine::correlate(&rules, &parsed.stages),
        top_stages_by_executor_time: top_stages(&parsed.stages, ctx.top_stages),
        top_rules_by_time: top_rules(&rules, ctx.top_rules),
        stages: parsed.stages,
        rules,
        totals,
        signals,
        partition_suggestions,
        utilization,
        insights: InsightSet::default(),
        diagnostics: parsed.diagnostics,
    };
    summary.insights = InsightEngine::new().evaluate(&summary);

    tracing::debug!(
        "Run {:?}: {} stages, {} rules, utilization {} ({}), {} findings",
        summary.run_id,
        summary.stages.len(),
        summary.rules.len(),
        summary.utilization.score,
        summary.utilization.classification.as_str(),
        summary.insights.findings.len()
    );
    summary
}

// ============================================================================
// Totals & Signals
// ============================================================================

pub fn compute_totals(stages: &[StageSummary]) -> RunTotals {
    let mut totals = RunTotals { total_stages: stages.len(), ..Default::default() };
    let (mut input_tasks, mut shuffle_tasks) = (0u64, 0u64);

    for s in stages {
        totals.total_tasks += s.num_tasks;
        totals.executor_run_time_ms += s.executor_run_time_ms;
        totals.gc_time_ms += s.gc_time_ms;
        totals.spill_bytes += s.spill_bytes();
        totals.input_bytes += s.input_bytes;
        totals.shuffle_read_bytes += s.shuffle_read_bytes;
        totals.shuffle_write_bytes += s.shuffle_write_bytes;
        if s.input_bytes > 0 {
            input_tasks += s.num_tasks;
        }
        if s.shuffle_write_bytes > 0 {
            shuffle_tasks += s.num_tasks;
        }
    }

    totals.spill_gb = totals.spill_bytes as f64 / 1e9;
    totals.gc_over_exec_pct = (totals.executor_run_time_ms > 0)
        .then(|| 100.0 * totals.gc_time_ms as f64 / totals.executor_run_time_ms as f64);
    totals.avg_input_partition_mb = avg_partition_mb(totals.input_bytes, input_tasks);
    totals.avg_shuffle_partition_mb = avg_partition_mb(totals.shuffle_write_bytes, shuffle_tasks);

    let durations: Vec<i64> = stages.iter().filter_map(|s| s.duration_ms).collect();
    totals.median_stage_duration_ms = median(&durations);
    totals.tiny_stages = durations
        .iter()
        .filter(|&&d| d < insight_limits::TINY_STAGE_MS)
        .count();
    totals
}

fn avg_partition_mb(bytes: u64, tasks: u64) -> f64 {
    if tasks == 0 { 0.0 } else { bytes as f64 / 1e6 / tasks as f64 }
}

/// Average of the two middle values for even counts, 0 when empty
fn median(values: &[i64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2] as f64,
        _ => (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0,
    }
}

pub fn run_signals(totals: &RunTotals, utilization: &UtilizationScore) -> Vec<RunSignal> {
    let mut signals = Vec::new();
    let input_mb = totals.avg_input_partition_mb;
    let shuffle_mb = totals.avg_shuffle_partition_mb;

    if input_mb > 0.0 && input_mb < partitions::SMALL_MB {
        signals.push(RunSignal::InputOverPartitioned);
    }
    if input_mb > partitions::LARGE_MB {
        signals.push(RunSignal::InputUnderPartitioned);
    }
    if shuffle_mb > 0.0 && shuffle_mb < partitions::SMALL_MB {
        signals.push(RunSignal::ShufflePartitionsTooHigh);
    }
    if shuffle_mb > partitions::LARGE_MB {
        signals.push(RunSignal::ShufflePartitionsTooLow);
    }
    if totals.spill_gb > partitions::SPILL_SIGNAL_GB {
        signals.push(RunSignal::SpillDetected);
    }
    if utilization.classification == UtilizationClass::UnderUtilized {
        signals.push(RunSignal::ClusterUnderUtilized);
    }
    signals
}

pub fn input_partition_suggestion(mb: f64) -> String {
    let s = if mb <= 0.0 {
        "N/A"
    } else if mb < partitions::TINY_MB {
        "coalesce ~4–8x (too many tiny input partitions)"
    } else if mb < partitions::SMALL_MB {
        "coalesce ~2–4x (input partitions small)"
    } else if mb <= partitions::HEALTHY_MAX_MB {
        "keep as-is (input partition size healthy)"
    } else if mb <= partitions::LARGE_MB {
        "consider repartition ~2x (input partitions large)"
    } else {
        "repartition ~2–4x (input partitions very large)"
    };
    s.to_string()
}

pub fn shuffle_partition_suggestion(mb: f64) -> String {
    let s = if mb <= 0.0 {
        "N/A"
    } else if mb < partitions::TINY_MB {
        "reduce shuffle partitions ~4–8x (tiny shuffle partitions / overhead)"
    } else if mb < partitions::SMALL_MB {
        "reduce shuffle partitions ~2–4x (shuffle partitions small)"
    } else if mb <= partitions::HEALTHY_MAX_MB {
        "keep as-is (shuffle partition size healthy)"
    } else if mb <= partitions::LARGE_MB {
        "increase shuffle partitions ~2x (large shuffle partitions)"
    } else {
        "increase shuffle partitions ~2–4x (very large shuffle partitions / spill risk)"
    };
    s.to_string()
}

// ============================================================================
// Hotspot Lists
// ============================================================================

fn top_stages(stages: &[StageSummary], limit: usize) -> Vec<StageHotspot> {
    let mut ranked: Vec<&StageSummary> = stages.iter().collect();
    ranked.sort_by(|a, b| b.executor_run_time_ms.cmp(&a.executor_run_time_ms));
    ranked.into_iter().take(limit).map(StageHotspot::from).collect()
}

/// Rules without an elapsed time rank as 0
fn top_rules(rules: &[RuleMetric], limit: usize) -> Vec<RuleMetric> {
    let mut ranked: Vec<&RuleMetric> = rules.iter().collect();
    ranked.sort_by(|a, b| {
        b.match_time_sec
            .unwrap_or(0.0)
            .total_cmp(&a.match_time_sec.unwrap_or(0.0))
    });
    ranked.into_iter().take(limit).cloned().collect()
}

// ============================================================================
// Formatting Helpers
// ============================================================================

/// Format bytes to human-readable string, decimal units like `spill_gb`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1000.0 && unit_index < UNITS.len() - 1 {
        size /= 1000.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Round to two decimals for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
