//! Baseline vs candidate run comparison
//!
//! A pure function of two [`RunSummary`] values. Percent changes whose basis is
//! zero or missing stay `None` so they never read as "no change".

use super::thresholds::diff as limits;
use crate::services::run_analyzer::models::{
    ChangeClass, ContributionImpact, DiffTag, MatchQualityDiff, MatchingTimeDiff, MetricDelta,
    PrecisionRecallDiff, PrecisionRecallPattern, RuleMatchContribution, RuleMatchPctDiff,
    RuleMetric, RuleTimeDiff, RunDiff, RunSummary,
};
use std::collections::BTreeMap;

pub const METRIC_DURATION_MS: &str = "durationMs";
pub const METRIC_SPILL_GB: &str = "spillGB";
pub const METRIC_GC_OVER_EXEC_PCT: &str = "gcOverExecPct";
pub const METRIC_AVG_INPUT_PARTITION_MB: &str = "avgInputPartitionMB";
pub const METRIC_AVG_SHUFFLE_PARTITION_MB: &str = "avgShufflePartitionMB";
pub const METRIC_UTIL_SCORE: &str = "utilScore";

pub struct DiffEngine;

impl DiffEngine {
    pub fn diff(baseline: &RunSummary, candidate: &RunSummary) -> RunDiff {
        let deltas = Self::metric_deltas(baseline, candidate);
        let (regressions, improvements) = Self::tag(&deltas);

        let (rules_only_in_baseline, rules_only_in_candidate, rule_time_diffs) =
            Self::rule_time_diffs(&baseline.rules, &candidate.rules);

        RunDiff {
            baseline_run_id: baseline.run_id.clone(),
            candidate_run_id: candidate.run_id.clone(),
            deltas,
            regressions,
            improvements,
            baseline_partition_suggestions: baseline.partition_suggestions.clone(),
            candidate_partition_suggestions: candidate.partition_suggestions.clone(),
            matching_time: Self::matching_time(&baseline.rules, &candidate.rules),
            rules_only_in_baseline,
            rules_only_in_candidate,
            rule_time_diffs,
            overall_match_quality: Self::overall_match_quality(&baseline.rules, &candidate.rules),
            rule_match_pct_diffs: Self::rule_match_pct_diffs(&baseline.rules, &candidate.rules),
            rule_match_contributions: Self::contributions(&baseline.rules, &candidate.rules),
            precision_recall: Self::precision_recall(&baseline.rules, &candidate.rules),
        }
    }

    // ========================================================================
    // Scalar metrics
    // ========================================================================

    fn metric_deltas(b: &RunSummary, c: &RunSummary) -> Vec<MetricDelta> {
        let util_score = |s: &RunSummary| Some(s.utilization.score as f64);
        vec![
            Self::delta(
                METRIC_DURATION_MS,
                b.duration_ms.map(|d| d as f64),
                c.duration_ms.map(|d| d as f64),
            ),
            Self::delta(METRIC_SPILL_GB, Some(b.totals.spill_gb), Some(c.totals.spill_gb)),
            Self::delta(METRIC_GC_OVER_EXEC_PCT, b.totals.gc_over_exec_pct, c.totals.gc_over_exec_pct),
            Self::delta(
                METRIC_AVG_INPUT_PARTITION_MB,
                Some(b.totals.avg_input_partition_mb),
                Some(c.totals.avg_input_partition_mb),
            ),
            Self::delta(
                METRIC_AVG_SHUFFLE_PARTITION_MB,
                Some(b.totals.avg_shuffle_partition_mb),
                Some(c.totals.avg_shuffle_partition_mb),
            ),
            Self::delta(METRIC_UTIL_SCORE, util_score(b), util_score(c)),
        ]
    }

    pub fn delta(metric: &str, baseline: Option<f64>, candidate: Option<f64>) -> MetricDelta {
        let (abs_delta, pct_delta) = match (baseline, candidate) {
            (Some(b), Some(c)) => (Some(c - b), Self::pct_change(b, c)),
            _ => (None, None),
        };
        MetricDelta { metric: metric.to_string(), baseline, candidate, abs_delta, pct_delta }
    }

    /// (c - b) / b x 100, `None` when |b| is ~0
    pub fn pct_change(b: f64, c: f64) -> Option<f64> {
        (b.abs() > limits::ZERO_EPSILON).then(|| (c - b) / b * 100.0)
    }

    fn tag(deltas: &[MetricDelta]) -> (Vec<DiffTag>, Vec<DiffTag>) {
        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        let find = |name: &str| deltas.iter().find(|d| d.metric == name);

        if let Some(d) = find(METRIC_DURATION_MS)
            && let (Some(pct), Some(abs)) = (d.pct_delta, d.abs_delta)
        {
            if pct > limits::DURATION_PCT && abs > limits::DURATION_ABS_MS {
                regressions.push(DiffTag::DurationRegressed);
            }
            if pct < -limits::DURATION_PCT && abs < -limits::DURATION_ABS_MS {
                improvements.push(DiffTag::DurationImproved);
            }
        }

        if let Some(abs) = find(METRIC_SPILL_GB).and_then(|d| d.abs_delta) {
            if abs > limits::SPILL_ABS_GB {
                regressions.push(DiffTag::SpillIncreased);
            }
            if abs < -limits::SPILL_ABS_GB {
                improvements.push(DiffTag::SpillReduced);
            }
        }

        if let Some(abs) = find(METRIC_UTIL_SCORE).and_then(|d| d.abs_delta) {
            if abs < -limits::UTIL_SCORE_POINTS {
                regressions.push(DiffTag::UtilizationDropped);
            }
            if abs > limits::UTIL_SCORE_POINTS {
                improvements.push(DiffTag::UtilizationImproved);
            }
        }

        (regressions, improvements)
    }

    // ========================================================================
    // Rule timing
    // ========================================================================

    fn total_rule_time(rules: &[RuleMetric]) -> f64 {
        rules.iter().filter_map(|r| r.match_time_sec).sum()
    }

    fn matching_time(b: &[RuleMetric], c: &[RuleMetric]) -> MatchingTimeDiff {
        let baseline_total_sec = Self::total_rule_time(b);
        let candidate_total_sec = Self::total_rule_time(c);
        MatchingTimeDiff {
            baseline_total_sec,
            candidate_total_sec,
            pct_change: (baseline_total_sec > 0.0)
                .then(|| (candidate_total_sec - baseline_total_sec) / baseline_total_sec * 100.0),
        }
    }

    /// name -> value for rules carrying the field; a repeated name keeps its last value
    fn rule_map<T>(rules: &[RuleMetric], field: impl Fn(&RuleMetric) -> Option<T>) -> BTreeMap<&str, T> {
        rules
            .iter()
            .filter_map(|r| field(r).map(|v| (r.rule.as_str(), v)))
            .collect()
    }

    fn classify_band(delta: f64, band: f64) -> ChangeClass {
        if delta > band {
            ChangeClass::Improved
        } else if delta < -band {
            ChangeClass::Regressed
        } else {
            ChangeClass::Unchanged
        }
    }

    fn rule_time_diffs(
        b: &[RuleMetric],
        c: &[RuleMetric],
    ) -> (Vec<String>, Vec<String>, Vec<RuleTimeDiff>) {
        let bm = Self::rule_map(b, |r| r.match_time_sec);
        let cm = Self::rule_map(c, |r| r.match_time_sec);

        // BTreeMap keys are already sorted
        let only_in_baseline = bm.keys().filter(|k| !cm.contains_key(*k)).map(|k| k.to_string()).collect();
        let only_in_candidate = cm.keys().filter(|k| !bm.contains_key(*k)).map(|k| k.to_string()).collect();

        let mut diffs: Vec<RuleTimeDiff> = bm
            .iter()
            .filter_map(|(rule, &bt)| {
                let ct = *cm.get(rule)?;
                let pct_delta = (bt > 0.0).then(|| (ct - bt) / bt * 100.0);
                // slower is a regression here, so the band is inverted
                let classification = match pct_delta {
                    Some(p) if p > limits::RULE_TIME_PCT => ChangeClass::Regressed,
                    Some(p) if p < -limits::RULE_TIME_PCT => ChangeClass::Improved,
                    _ => ChangeClass::Unchanged,
                };
                Some(RuleTimeDiff {
                    rule: rule.to_string(),
                    baseline_time_sec: bt,
                    candidate_time_sec: ct,
                    abs_delta_sec: ct - bt,
                    pct_delta,
                    classification,
                })
            })
            .collect();
        diffs.sort_by(|x, y| y.abs_delta_sec.total_cmp(&x.abs_delta_sec));

        (only_in_baseline, only_in_candidate, diffs)
    }

    // ========================================================================
    // Match quality
    // ========================================================================

    /// Σmatches / Σcandidates x 100 over rules with both counts; `None` without candidates
    pub fn overall_match_pct(rules: &[RuleMetric]) -> Option<f64> {
        let (candidates, matches) = rules
            .iter()
            .filter_map(|r| Some((r.match_candidates?, r.matches?)))
            .fold((0u64, 0u64), |(c, m), (rc, rm)| (c + rc, m + rm));
        (candidates > 0).then(|| 100.0 * matches as f64 / candidates as f64)
    }

    fn overall_match_quality(b: &[RuleMetric], c: &[RuleMetric]) -> MatchQualityDiff {
        let baseline_match_pct = Self::overall_match_pct(b);
        let candidate_match_pct = Self::overall_match_pct(c);

        match (baseline_match_pct, candidate_match_pct) {
            (Some(bp), Some(cp)) => MatchQualityDiff {
                baseline_match_pct,
                candidate_match_pct,
                abs_delta_pct: Some(cp - bp),
                pct_delta: (bp > 0.0).then(|| (cp - bp) / bp * 100.0),
                classification: Self::classify_band(cp - bp, limits::MATCH_PCT_POINTS),
            },
            _ => MatchQualityDiff {
                baseline_match_pct,
                candidate_match_pct,
                abs_delta_pct: None,
                pct_delta: None,
                classification: ChangeClass::NotAvailable,
            },
        }
    }

    fn rule_match_pct_diffs(b: &[RuleMetric], c: &[RuleMetric]) -> Vec<RuleMatchPctDiff> {
        let bm = Self::rule_map(b, |r| r.total_match_pct);
        let cm = Self::rule_map(c, |r| r.total_match_pct);

        let mut diffs: Vec<RuleMatchPctDiff> = bm
            .iter()
            .filter_map(|(rule, &bp)| {
                let cp = *cm.get(rule)?;
                Some(RuleMatchPctDiff {
                    rule: rule.to_string(),
                    baseline_match_pct: bp,
                    candidate_match_pct: cp,
                    abs_delta_pct: cp - bp,
                    pct_delta: (bp > 0.0).then(|| (cp - bp) / bp * 100.0),
                    classification: Self::classify_band(cp - bp, limits::MATCH_PCT_POINTS),
                })
            })
            .collect();
        diffs.sort_by(|x, y| x.abs_delta_pct.total_cmp(&y.abs_delta_pct));
        diffs
    }

    // ========================================================================
    // Contribution attribution
    // ========================================================================

    /// Split the overall match-rate change across shared rules, weighting each rule's
    /// own match-rate change by its share of baseline candidates.
    fn contributions(b: &[RuleMetric], c: &[RuleMetric]) -> Vec<RuleMatchContribution> {
        let baseline_total: u64 = b.iter().filter_map(|r| r.match_candidates).sum();
        if baseline_total == 0 {
            return Vec::new();
        }

        let counts = |r: &RuleMetric| Some((r.match_candidates?, r.matches?));
        let bm = Self::rule_map(b, counts);
        let cm = Self::rule_map(c, counts);

        let mut contributions: Vec<RuleMatchContribution> = bm
            .iter()
            .filter_map(|(rule, &(b_cand, b_match))| {
                let &(c_cand, c_match) = cm.get(rule)?;
                if b_cand == 0 {
                    return None;
                }

                let b_pct = 100.0 * b_match as f64 / b_cand as f64;
                let c_pct = if c_cand > 0 { 100.0 * c_match as f64 / c_cand as f64 } else { 0.0 };
                let weight = b_cand as f64 / baseline_total as f64;
                let contribution = (c_pct - b_pct) * weight;

                Some(RuleMatchContribution {
                    rule: rule.to_string(),
                    baseline_candidates: b_cand,
                    candidate_candidates: c_cand,
                    baseline_matches: b_match,
                    candidate_matches: c_match,
                    baseline_match_pct: b_pct,
                    candidate_match_pct: c_pct,
                    contribution_pct_points: contribution,
                    impact: Self::impact(contribution),
                })
            })
            .collect();

        contributions.sort_by(|x, y| {
            y.contribution_pct_points.abs().total_cmp(&x.contribution_pct_points.abs())
        });
        contributions
    }

    fn impact(contribution: f64) -> ContributionImpact {
        if contribution > limits::CONTRIBUTION_MAJOR {
            ContributionImpact::MajorPositive
        } else if contribution > limits::CONTRIBUTION_MINOR {
            ContributionImpact::MinorPositive
        } else if contribution < -limits::CONTRIBUTION_MAJOR {
            ContributionImpact::MajorNegative
        } else if contribution < -limits::CONTRIBUTION_MINOR {
            ContributionImpact::MinorNegative
        } else {
            ContributionImpact::Neutral
        }
    }

    // ========================================================================
    // Precision / recall
    // ========================================================================

    fn precision_recall(b: &[RuleMetric], c: &[RuleMetric]) -> PrecisionRecallDiff {
        let totals = |rules: &[RuleMetric]| -> (u64, u64) {
            (
                rules.iter().filter_map(|r| r.matches).sum(),
                rules.iter().filter_map(|r| r.total_unmatched).sum(),
            )
        };
        let precision = |matches: u64, unmatched: u64| {
            (matches + unmatched > 0).then(|| 100.0 * matches as f64 / (matches + unmatched) as f64)
        };

        let (b_match, b_unmatched) = totals(b);
        let (c_match, c_unmatched) = totals(c);
        let baseline_match_pct = precision(b_match, b_unmatched);
        let candidate_match_pct = precision(c_match, c_unmatched);

        let classification = match (baseline_match_pct, candidate_match_pct) {
            (Some(bp), Some(cp)) => {
                let precision_up = cp > bp + limits::MATCH_PCT_POINTS;
                let precision_down = cp < bp - limits::MATCH_PCT_POINTS;
                let recall_up = c_match > b_match;
                let recall_down = c_match < b_match;

                match (precision_up, precision_down, recall_up, recall_down) {
                    (true, _, _, true) => PrecisionRecallPattern::PrecisionUpRecallDown,
                    (_, true, true, _) => PrecisionRecallPattern::PrecisionDownRecallUp,
                    (true, _, true, _) => PrecisionRecallPattern::BothUp,
                    (_, true, _, true) => PrecisionRecallPattern::BothDown,
                    _ => PrecisionRecallPattern::NoSignificantChange,
                }
            },
            _ => PrecisionRecallPattern::NotAvailable,
        };

        PrecisionRecallDiff {
            baseline_matches: b_match,
            candidate_matches: c_match,
            baseline_unmatched: b_unmatched,
            candidate_unmatched: c_unmatched,
            baseline_match_pct,
            candidate_match_pct,
            classification,
        }
    }
}
