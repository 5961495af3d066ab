//! Insight engine for run summaries
//!
//! Evaluates a fixed set of heuristic rules against a finalized [`RunSummary`].
//! Every rule is deterministic and reads its limits from `thresholds::insights`.
//! Findings come out in rule registration order.

use super::thresholds::insights as limits;
use crate::services::run_analyzer::models::{
    Evidence, Finding, FindingKind, InsightSet, RunSummary, StageSummary, UtilizationClass,
};
use crate::services::run_analyzer::{format_bytes, round2};
use serde_json::json;

// ============================================================================
// Rule Trait
// ============================================================================

pub trait InsightRule: Send + Sync {
    /// Rule ID (e.g., "C001", "R002")
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Zero or more findings for this run
    fn evaluate(&self, run: &RunSummary) -> Vec<Finding>;
}

fn finding(kind: FindingKind, message: String, evidence: Evidence) -> Finding {
    Finding { kind, message, evidence }
}

fn evidence<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Evidence {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Slots available to the run: max(1, ceil(avg executors x cores)).
pub fn available_slots(run: &RunSummary) -> u64 {
    let executors = &run.executors;
    let avg = executors
        .avg_concurrency
        .filter(|&a| a > 0.0)
        .unwrap_or_else(|| executors.max_concurrent.max(1) as f64);
    let cores = executors.executor_cores.filter(|&c| c > 0).unwrap_or(1);
    ((avg * cores as f64).ceil() as u64).max(1)
}

// ============================================================================
// Cluster / Workload Rules
// ============================================================================

/// C001: job too small for distributed compute
pub struct OverheadBoundRule;

impl InsightRule for OverheadBoundRule {
    fn id(&self) -> &str {
        "C001"
    }

    fn name(&self) -> &str {
        "Overhead-bound job"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let Some(duration_ms) = run.duration_ms else {
            return vec![];
        };
        let totals = &run.totals;
        let utilization = run.utilization.utilization;

        let overhead_bound = duration_ms < limits::OVERHEAD_MAX_DURATION_MS
            && (totals.total_tasks < limits::OVERHEAD_MAX_TASKS
                || totals.median_stage_duration_ms < limits::OVERHEAD_MAX_MEDIAN_STAGE_MS)
            && utilization < limits::OVERHEAD_MAX_UTILIZATION;
        if !overhead_bound {
            return vec![];
        }

        let ev = evidence([
            ("durationMs", json!(duration_ms)),
            ("totalTasks", json!(totals.total_tasks)),
            ("medianStageDurationMs", json!(totals.median_stage_duration_ms)),
            ("parallelismUtil", json!(utilization)),
        ]);
        vec![
            finding(
                FindingKind::OverheadBound,
                "Job appears overhead-bound (too small for distributed compute): many tiny stages and low task count. For validation runs, scale input or run in local mode without a cluster.".to_string(),
                ev.clone(),
            ),
            finding(
                FindingKind::OverheadBound,
                "If this is a real workload path, reduce the number of Spark actions (extra counts/checkpoints) and combine rules where possible.".to_string(),
                ev,
            ),
        ]
    }
}

/// C002: under-utilized cluster, optionally with too little parallelism
pub struct UnderUtilizationRule;

impl InsightRule for UnderUtilizationRule {
    fn id(&self) -> &str {
        "C002"
    }

    fn name(&self) -> &str {
        "Cluster under-utilization"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        if run.utilization.classification != UtilizationClass::UnderUtilized {
            return vec![];
        }

        let mut findings = vec![finding(
            FindingKind::UnderUtilized,
            "Cluster under-utilized: consider lowering executor count / dynamic allocation max, or increasing parallelism only if the workload is actually large.".to_string(),
            evidence([
                ("parallelismUtil", json!(run.utilization.utilization)),
                ("utilScore", json!(run.utilization.score)),
            ]),
        )];

        let slots = available_slots(run);
        let total_tasks = run.totals.total_tasks;
        if total_tasks < limits::MIN_TASKS_PER_SLOT * slots {
            findings.push(finding(
                FindingKind::LowParallelism,
                "Parallelism too low relative to available slots: increase input partitions or tune spark.sql.shuffle.partitions for wide ops (groupBy/joins).".to_string(),
                evidence([("totalTasks", json!(total_tasks)), ("availableSlots", json!(slots))]),
            ));
        }
        findings
    }
}

/// C003: GC time above 20% of executor run time
pub struct GcPressureRule;

impl InsightRule for GcPressureRule {
    fn id(&self) -> &str {
        "C003"
    }

    fn name(&self) -> &str {
        "GC pressure"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let totals = &run.totals;
        if totals.executor_run_time_ms == 0 {
            return vec![];
        }
        let ratio = totals.gc_time_ms as f64 / totals.executor_run_time_ms as f64;
        if ratio <= limits::GC_PRESSURE_RATIO {
            return vec![];
        }

        vec![finding(
            FindingKind::GcPressure,
            format!(
                "High GC% ({:.1}% of executor time): reduce object churn (avoid UDF-heavy paths), consider larger executor memory, review join strategy & AQE settings.",
                ratio * 100.0
            ),
            evidence([
                ("gcTimeMs", json!(totals.gc_time_ms)),
                ("executorRunTimeMs", json!(totals.executor_run_time_ms)),
                ("gcRatio", json!(ratio)),
            ]),
        )]
    }
}

/// C004: total spill above 10 GB
pub struct SpillRule;

impl InsightRule for SpillRule {
    fn id(&self) -> &str {
        "C004"
    }

    fn name(&self) -> &str {
        "Significant spill"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let spill = run.totals.spill_bytes;
        if spill <= limits::SPILL_BYTES {
            return vec![];
        }

        vec![finding(
            FindingKind::Spill,
            format!(
                "Significant spill detected ({}): review aggregation/join memory usage, skew, and shuffle partitions. Consider salting skewed keys for recon groupBy.",
                format_bytes(spill)
            ),
            evidence([("totalSpillBytes", json!(spill)), ("spillGB", json!(run.totals.spill_gb))]),
        )]
    }
}

/// C005: the most skewed stage, when its max/p50 exceeds 6
pub struct SkewRule;

impl InsightRule for SkewRule {
    fn id(&self) -> &str {
        "C005"
    }

    fn name(&self) -> &str {
        "Task skew"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        // first stage wins ties
        let worst = run.stages.iter().fold(None::<&StageSummary>, |best, s| match best {
            Some(b) if b.skew_ratio >= s.skew_ratio => Some(b),
            _ => Some(s),
        });

        let Some(stage) = worst.filter(|s| s.skew_ratio > limits::SKEW_RATIO) else {
            return vec![];
        };

        vec![finding(
            FindingKind::Skew,
            format!(
                "Skew detected (maxOverP50={}) in stage {}: enable AQE skew join handling and/or salt skewed keys for grouping by match rule / recon identifiers.",
                round2(stage.skew_ratio),
                stage.stage_id
            ),
            evidence([
                ("stageId", json!(stage.stage_id)),
                ("attemptId", json!(stage.attempt_id)),
                ("maxOverP50", json!(stage.skew_ratio)),
                ("maxTaskDurationMs", json!(stage.max_task_duration_ms)),
                ("p50TaskDurationMs", json!(stage.p50_task_duration_ms)),
                ("stragglerFraction", json!(stage.straggler_fraction)),
            ]),
        )]
    }
}

/// C006: top stages by executor run time
pub struct TopStagesRule;

impl InsightRule for TopStagesRule {
    fn id(&self) -> &str {
        "C006"
    }

    fn name(&self) -> &str {
        "Top stages by executor time"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let mut ranked: Vec<&StageSummary> = run.stages.iter().collect();
        ranked.sort_by(|a, b| b.executor_run_time_ms.cmp(&a.executor_run_time_ms));

        ranked
            .into_iter()
            .take(limits::TOP_STAGES)
            .take_while(|s| s.executor_run_time_ms > 0)
            .map(|s| {
                finding(
                    FindingKind::TopStage,
                    format!(
                        "Top stage by executor time: stage {} ({}), executorRunTimeMs={}, shuffleRead={}, shuffleWrite={}, spill={}",
                        s.stage_id,
                        s.name.as_deref().unwrap_or(""),
                        s.executor_run_time_ms,
                        s.shuffle_read_bytes,
                        s.shuffle_write_bytes,
                        s.spill_bytes()
                    ),
                    evidence([
                        ("stageId", json!(s.stage_id)),
                        ("attemptId", json!(s.attempt_id)),
                        ("executorRunTimeMs", json!(s.executor_run_time_ms)),
                        ("shuffleReadBytes", json!(s.shuffle_read_bytes)),
                        ("shuffleWriteBytes", json!(s.shuffle_write_bytes)),
                        ("spillBytes", json!(s.spill_bytes())),
                    ]),
                )
            })
            .collect()
    }
}

// ============================================================================
// Rule Domain Rules
// ============================================================================

/// R001: slowest rules by elapsed time
pub struct SlowRulesRule;

impl InsightRule for SlowRulesRule {
    fn id(&self) -> &str {
        "R001"
    }

    fn name(&self) -> &str {
        "Slow rules"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let mut timed: Vec<(f64, &_)> = run
            .rules
            .iter()
            .filter_map(|r| r.match_time_sec.map(|t| (t, r)))
            .collect();
        timed.sort_by(|a, b| b.0.total_cmp(&a.0));

        timed
            .into_iter()
            .take(limits::TOP_RULES)
            .map(|(secs, r)| {
                finding(
                    FindingKind::SlowRule,
                    format!(
                        "Slow rule: [{}] matchTimeSec={}, candidates={}, matches={}, match%={}, unmatched={}",
                        r.rule,
                        secs,
                        r.match_candidates.unwrap_or(0),
                        r.matches.unwrap_or(0),
                        r.total_match_pct.map_or_else(|| "n/a".to_string(), |p| p.to_string()),
                        r.total_unmatched.unwrap_or(0)
                    ),
                    evidence([
                        ("rule", json!(r.rule)),
                        ("matchTimeSec", json!(secs)),
                        ("matchCandidates", json!(r.match_candidates)),
                        ("matches", json!(r.matches)),
                        ("totalMatchPct", json!(r.total_match_pct)),
                        ("totalUnmatched", json!(r.total_unmatched)),
                    ]),
                )
            })
            .collect()
    }
}

/// R002: first expensive rule with a very low match rate
pub struct LowYieldRule;

impl InsightRule for LowYieldRule {
    fn id(&self) -> &str {
        "R002"
    }

    fn name(&self) -> &str {
        "Low-yield rule"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let low_yield = run.rules.iter().find_map(|r| match (r.total_match_pct, r.match_candidates) {
            (Some(pct), Some(candidates))
                if pct < limits::LOW_YIELD_MATCH_PCT
                    && candidates > limits::LOW_YIELD_MIN_CANDIDATES =>
            {
                Some((r, pct, candidates))
            },
            _ => None,
        });

        let Some((rule, pct, candidates)) = low_yield else {
            return vec![];
        };

        vec![finding(
            FindingKind::LowYieldRule,
            format!(
                "Low match% with high candidates: [{}] match%={}%. Consider narrowing scope filters or ordering rules to avoid expensive low-yield rules early.",
                rule.rule, pct
            ),
            evidence([
                ("rule", json!(rule.rule)),
                ("totalMatchPct", json!(pct)),
                ("matchCandidates", json!(candidates)),
            ]),
        )]
    }
}

/// R003: strongest rule-stage overlap
pub struct RuleStageCorrelationRule;

impl InsightRule for RuleStageCorrelationRule {
    fn id(&self) -> &str {
        "R003"
    }

    fn name(&self) -> &str {
        "Rule-stage correlation"
    }

    fn evaluate(&self, run: &RunSummary) -> Vec<Finding> {
        let Some(top) = run.correlations.first() else {
            return vec![];
        };
        let Some(overlap) = top.overlaps.first() else {
            return vec![];
        };

        vec![finding(
            FindingKind::RuleStageCorrelation,
            format!(
                "Rule-stage correlation: rule [{}] overlaps most with stage {} ({}) overlapMs={} ({}% of rule time).",
                top.rule,
                overlap.stage_id,
                overlap.stage_name.as_deref().unwrap_or(""),
                overlap.overlap_ms,
                round2(overlap.overlap_fraction * 100.0)
            ),
            evidence([
                ("rule", json!(top.rule)),
                ("stageId", json!(overlap.stage_id)),
                ("attemptId", json!(overlap.attempt_id)),
                ("overlapMs", json!(overlap.overlap_ms)),
                ("overlapFraction", json!(overlap.overlap_fraction)),
            ]),
        )]
    }
}

/// All insight rules in evaluation order
pub fn get_all_rules() -> Vec<Box<dyn InsightRule>> {
    vec![
        Box::new(OverheadBoundRule),
        Box::new(UnderUtilizationRule),
        Box::new(GcPressureRule),
        Box::new(SpillRule),
        Box::new(SkewRule),
        Box::new(TopStagesRule),
        Box::new(SlowRulesRule),
        Box::new(LowYieldRule),
        Box::new(RuleStageCorrelationRule),
    ]
}

// ============================================================================
// Engine
// ============================================================================

pub struct InsightEngine {
    rules: Vec<Box<dyn InsightRule>>,
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightEngine {
    pub fn new() -> Self {
        Self { rules: get_all_rules() }
    }

    pub fn evaluate(&self, run: &RunSummary) -> InsightSet {
        let mut findings = Vec::new();
        for rule in &self.rules {
            let produced = rule.evaluate(run);
            if !produced.is_empty() {
                tracing::debug!("{} ({}) produced {} finding(s)", rule.id(), rule.name(), produced.len());
            }
            findings.extend(produced);
        }

        InsightSet { findings, evidence: Self::run_evidence(run) }
    }

    /// Run-wide evidence, independent of which rules fired
    fn run_evidence(run: &RunSummary) -> Evidence {
        let totals = &run.totals;
        let mut ev = evidence([
            ("totalTasks", json!(totals.total_tasks)),
            ("totalStages", json!(totals.total_stages)),
            ("tinyStages(<200ms)", json!(totals.tiny_stages)),
            ("medianStageDurationMs", json!(totals.median_stage_duration_ms)),
            ("totalExecutorRunTimeMs", json!(totals.executor_run_time_ms)),
            ("totalGcTimeMs", json!(totals.gc_time_ms)),
            ("totalSpillBytes", json!(totals.spill_bytes)),
            ("availableSlots", json!(available_slots(run))),
        ]);
        ev.extend(run.utilization.evidence.clone());
        ev
    }
}
