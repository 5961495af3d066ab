//! Rule-to-stage time correlation
//!
//! A rule's window is `[end - elapsed, end]`, derived from the driver log line that
//! reported it. Each window is intersected with every stage window. Timestamps of the
//! two logs are taken as-is: no clock skew correction.

use crate::services::run_analyzer::models::{Correlation, RuleMetric, StageOverlap, StageSummary};

pub struct CorrelationEngine;

impl CorrelationEngine {
    /// Rank overlapping stages for every rule that has both an end timestamp and an
    /// elapsed time. Rules without them are left out here but stay in the summary.
    pub fn correlate(rules: &[RuleMetric], stages: &[StageSummary]) -> Vec<Correlation> {
        let stage_windows: Vec<(&StageSummary, (i64, i64))> = stages
            .iter()
            .filter_map(|s| s.window().map(|w| (s, w)))
            .collect();

        let mut correlations: Vec<Correlation> = rules
            .iter()
            .filter_map(|rule| {
                let window = Self::rule_window(rule)?;
                Some(Self::correlate_rule(rule, window, &stage_windows))
            })
            .collect();

        correlations.sort_by(|a, b| b.window_duration_ms.cmp(&a.window_duration_ms));
        correlations
    }

    fn correlate_rule(
        rule: &RuleMetric,
        window: (i64, i64),
        stage_windows: &[(&StageSummary, (i64, i64))],
    ) -> Correlation {
        let duration = window.1 - window.0;

        let mut overlaps: Vec<StageOverlap> = stage_windows
            .iter()
            .filter_map(|(stage, stage_window)| {
                let overlap_ms = Self::overlap_ms(window, *stage_window);
                (overlap_ms > 0).then(|| StageOverlap {
                    stage_id: stage.stage_id,
                    attempt_id: stage.attempt_id,
                    stage_name: stage.name.clone(),
                    overlap_ms,
                    overlap_fraction: overlap_ms as f64 / duration as f64,
                })
            })
            .collect();
        overlaps.sort_by(|a, b| b.overlap_ms.cmp(&a.overlap_ms));

        Correlation {
            rule: rule.rule.clone(),
            window_start_ms: window.0,
            window_end_ms: window.1,
            window_duration_ms: duration,
            overlaps,
        }
    }

    /// `[end - max(1ms, elapsed), end]`
    pub fn rule_window(rule: &RuleMetric) -> Option<(i64, i64)> {
        let end = rule.end_timestamp_ms?;
        let elapsed_sec = rule.match_time_sec.filter(|s| s.is_finite() && *s >= 0.0)?;
        let elapsed_ms = ((elapsed_sec * 1000.0) as i64).max(1);
        Some((end.saturating_sub(elapsed_ms), end))
    }

    /// Length of the intersection of two closed intervals, 0 when disjoint
    pub fn overlap_ms(a: (i64, i64), b: (i64, i64)) -> i64 {
        a.1.min(b.1).saturating_sub(a.0.max(b.0)).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, end: Option<i64>, secs: Option<f64>) -> RuleMetric {
        RuleMetric {
            rule: name.to_string(),
            end_timestamp_ms: end,
            match_time_sec: secs,
            ..Default::default()
        }
    }

    fn stage(id: i32, start: i64, end: i64) -> StageSummary {
        StageSummary {
            stage_id: id,
            submission_time_ms: Some(start),
            completion_time_ms: Some(end),
            ..Default::default()
        }
    }

    #[test]
    fn test_partial_overlap() {
        let rules = [rule("R1", Some(2000), Some(1.0))];
        let stages = [stage(0, 1500, 2500)];
        let c = CorrelationEngine::correlate(&rules, &stages);
        assert_eq!(c.len(), 1);
        assert_eq!((c[0].window_start_ms, c[0].window_end_ms), (1000, 2000));
        assert_eq!(c[0].overlaps.len(), 1);
        assert_eq!(c[0].overlaps[0].overlap_ms, 500);
        assert!((c[0].overlaps[0].overlap_fraction - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_windows_excluded() {
        assert_eq!(CorrelationEngine::overlap_ms((0, 100), (200, 300)), 0);
        let rules = [rule("R1", Some(100), Some(0.1))];
        let stages = [stage(0, 200, 300)];
        let c = CorrelationEngine::correlate(&rules, &stages);
        assert_eq!(c.len(), 1);
        assert!(c[0].overlaps.is_empty());
    }

    #[test]
    fn test_touching_windows_have_no_overlap() {
        assert_eq!(CorrelationEngine::overlap_ms((0, 100), (100, 300)), 0);
    }

    #[test]
    fn test_zero_elapsed_floors_to_one_ms() {
        let r = rule("R", Some(5000), Some(0.0));
        assert_eq!(CorrelationEngine::rule_window(&r), Some((4999, 5000)));
    }

    #[test]
    fn test_extreme_bounds_saturate() {
        let r = rule("R", Some(i64::MIN + 10), Some(1.0));
        assert_eq!(CorrelationEngine::rule_window(&r), Some((i64::MIN, i64::MIN + 10)));
        assert_eq!(CorrelationEngine::overlap_ms((i64::MIN, i64::MAX), (i64::MIN, i64::MAX)), i64::MAX);
    }

    #[test]
    fn test_rules_without_time_are_skipped() {
        let rules = [
            rule("no-ts", None, Some(3.0)),
            rule("no-elapsed", Some(1000), None),
            rule("ok", Some(1000), Some(0.5)),
        ];
        let c = CorrelationEngine::correlate(&rules, &[stage(0, 0, 2000)]);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].rule, "ok");
    }

    #[test]
    fn test_ranking() {
        let rules = [rule("short", Some(10_000), Some(1.0)), rule("long", Some(10_000), Some(8.0))];
        let stages = [
            stage(0, 0, 3000),
            stage(1, 2500, 9500),
            stage(2, 9800, 12_000),
            // stage without a valid window
            StageSummary { stage_id: 3, submission_time_ms: Some(5), ..Default::default() },
        ];
        let c = CorrelationEngine::correlate(&rules, &stages);

        assert_eq!(c[0].rule, "long");
        assert_eq!(c[1].rule, "short");

        // long: [2000, 10000] -> stage1 7000, stage0 1000, stage2 200
        let ids: Vec<_> = c[0].overlaps.iter().map(|o| o.stage_id).collect();
        assert_eq!(ids, vec![1, 0, 2]);
        assert_eq!(c[0].overlaps[0].overlap_ms, 7000);

        // short: [9000, 10000] -> stage1 500, stage2 200
        let ids: Vec<_> = c[1].overlaps.iter().map(|o| o.stage_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
