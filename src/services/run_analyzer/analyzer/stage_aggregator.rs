//! Streaming per-stage aggregation
//!
//! One accumulator per `(stage id, attempt id)`, created on the first event that
//! references the key. Lifecycle per key: `Unseen -> Submitted -> Completed`; task
//! events are folded in whatever the state, so late TaskEnd events after
//! StageCompleted still count. Nothing here can fail: anomalies go to the
//! caller's `ParseDiagnostics`.

use super::order_stats::OrderStats;
use super::reservoir::{DEFAULT_CAPACITY, Reservoir, derive_seed};
use crate::services::run_analyzer::models::{ParseDiagnostics, StageKey, StageSummary};
use crate::services::run_analyzer::parser::core::{SparkEvent, StageInfo, TaskEnd};
use std::collections::BTreeMap;

/// Stage aggregator configuration
#[derive(Debug, Clone)]
pub struct StageAggregatorConfig {
    /// Task durations kept per stage for order statistics
    pub reservoir_capacity: usize,
    /// Base seed; each stage derives its own seed from it and its key
    pub seed: u64,
}

impl Default for StageAggregatorConfig {
    fn default() -> Self {
        Self { reservoir_capacity: DEFAULT_CAPACITY, seed: 42 }
    }
}

/// Lifecycle position of a stage as seen in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageState {
    /// Only task events so far
    Unseen,
    Submitted,
    Completed,
}

#[derive(Debug)]
struct StageAccumulator {
    key: StageKey,
    state: StageState,
    name: Option<String>,
    submission_time: Option<i64>,
    completion_time: Option<i64>,
    declared_tasks: Option<u64>,
    observed_tasks: u64,
    executor_run_time_ms: u64,
    gc_time_ms: u64,
    shuffle_read_bytes: u64,
    shuffle_write_bytes: u64,
    input_bytes: u64,
    spill_memory_bytes: u64,
    spill_disk_bytes: u64,
    first_launch: Option<i64>,
    last_finish: Option<i64>,
    durations: Reservoir<i64>,
}

impl StageAccumulator {
    fn new(key: StageKey, config: &StageAggregatorConfig) -> Self {
        let stream = ((key.stage_id as u32 as u64) << 32) | key.attempt_id as u32 as u64;
        Self {
            key,
            state: StageState::Unseen,
            name: None,
            submission_time: None,
            completion_time: None,
            declared_tasks: None,
            observed_tasks: 0,
            executor_run_time_ms: 0,
            gc_time_ms: 0,
            shuffle_read_bytes: 0,
            shuffle_write_bytes: 0,
            input_bytes: 0,
            spill_memory_bytes: 0,
            spill_disk_bytes: 0,
            first_launch: None,
            last_finish: None,
            durations: Reservoir::new(config.reservoir_capacity, derive_seed(config.seed, stream)),
        }
    }

    /// Fields present on the event overwrite, absent ones leave the old value.
    fn merge_info(&mut self, info: &StageInfo) {
        if info.name.is_some() {
            self.name.clone_from(&info.name);
        }
        if info.submission_time.is_some() {
            self.submission_time = info.submission_time;
        }
        if info.num_tasks.is_some() {
            self.declared_tasks = info.num_tasks;
        }
    }

    fn fold_task(&mut self, task: &TaskEnd, diagnostics: &mut ParseDiagnostics) {
        self.observed_tasks += 1;

        if let Some(duration) = task.duration_ms() {
            self.durations.add(duration);
        }
        if let Some(launch) = task.launch_time.filter(|&t| t > 0) {
            self.first_launch = Some(self.first_launch.map_or(launch, |t| t.min(launch)));
        }
        if let Some(finish) = task.finish_time.filter(|&t| t > 0) {
            self.last_finish = Some(self.last_finish.map_or(finish, |t| t.max(finish)));
        }

        let Some(m) = &task.metrics else {
            diagnostics.task_ends_without_metrics += 1;
            return;
        };

        self.executor_run_time_ms += m.executor_run_time_ms;
        self.gc_time_ms += m.gc_time_ms;
        self.shuffle_read_bytes += m.shuffle_read_bytes;
        self.shuffle_write_bytes += m.shuffle_write_bytes;
        self.input_bytes += m.input_bytes;
        self.spill_memory_bytes += m.memory_spilled_bytes;
        self.spill_disk_bytes += m.disk_spilled_bytes;
    }

    fn finalize(self) -> StageSummary {
        let stats = OrderStats::from_values(self.durations.values());

        let mut times_inferred = false;
        let submission_time = self.submission_time.or_else(|| {
            times_inferred |= self.first_launch.is_some();
            self.first_launch
        });
        let completion_time = self.completion_time.or_else(|| {
            times_inferred |= self.last_finish.is_some();
            self.last_finish
        });
        let duration_ms = match (submission_time, completion_time) {
            (Some(start), Some(end)) if end >= start => Some(end.saturating_sub(start)),
            _ => None,
        };

        StageSummary {
            stage_id: self.key.stage_id,
            attempt_id: self.key.attempt_id,
            name: self.name,
            submission_time_ms: submission_time,
            completion_time_ms: completion_time,
            duration_ms,
            times_inferred,
            num_tasks: self.declared_tasks.unwrap_or(self.observed_tasks),
            executor_run_time_ms: self.executor_run_time_ms,
            gc_time_ms: self.gc_time_ms,
            shuffle_read_bytes: self.shuffle_read_bytes,
            shuffle_write_bytes: self.shuffle_write_bytes,
            input_bytes: self.input_bytes,
            spill_memory_bytes: self.spill_memory_bytes,
            spill_disk_bytes: self.spill_disk_bytes,
            max_task_duration_ms: stats.max,
            p50_task_duration_ms: stats.p50,
            p95_task_duration_ms: stats.p95,
            skew_ratio: stats.skew_ratio,
            straggler_fraction: stats.straggler_fraction,
            sampled_tasks: stats.count,
        }
    }
}

/// Folds stage and task events into per-stage accumulators
#[derive(Debug, Default)]
pub struct StageAggregator {
    config: StageAggregatorConfig,
    stages: BTreeMap<StageKey, StageAccumulator>,
}

impl StageAggregator {
    pub fn new(config: StageAggregatorConfig) -> Self {
        Self { config, stages: BTreeMap::new() }
    }

    /// Apply one event. Events that are not about stages or tasks are ignored.
    pub fn apply(&mut self, event: &SparkEvent, diagnostics: &mut ParseDiagnostics) {
        match event {
            SparkEvent::StageSubmitted(info) => self.on_stage_submitted(info),
            SparkEvent::StageCompleted(info) => self.on_stage_completed(info),
            SparkEvent::TaskEnd(task) => self.on_task_end(task, diagnostics),
            _ => {},
        }
    }

    fn accumulator(&mut self, key: StageKey) -> &mut StageAccumulator {
        let config = &self.config;
        self.stages
            .entry(key)
            .or_insert_with(|| StageAccumulator::new(key, config))
    }

    fn on_stage_submitted(&mut self, info: &StageInfo) {
        let Some(key) = info.key else {
            tracing::debug!("StageSubmitted without a stage id, skipped");
            return;
        };
        let acc = self.accumulator(key);
        acc.merge_info(info);
        acc.state = acc.state.max(StageState::Submitted);
    }

    fn on_stage_completed(&mut self, info: &StageInfo) {
        let Some(key) = info.key else {
            tracing::debug!("StageCompleted without a stage id, skipped");
            return;
        };
        let acc = self.accumulator(key);
        acc.merge_info(info);
        if info.completion_time.is_some() {
            acc.completion_time = info.completion_time;
        }
        acc.state = StageState::Completed;
    }

    fn on_task_end(&mut self, task: &TaskEnd, diagnostics: &mut ParseDiagnostics) {
        diagnostics.task_end_events += 1;

        let Some(key) = task.stage else {
            diagnostics.orphaned_task_ends += 1;
            return;
        };
        self.accumulator(key).fold_task(task, diagnostics);
    }

    pub fn state(&self, key: StageKey) -> Option<StageState> {
        self.stages.get(&key).map(|acc| acc.state)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Convert every accumulator into a summary, sorted by (stage id, attempt id).
    pub fn finalize(self) -> Vec<StageSummary> {
        self.stages.into_values().map(StageAccumulator::finalize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::run_analyzer::parser::core::TaskMetrics;

    fn stage_info(stage: i32, attempt: i32) -> StageInfo {
        StageInfo { key: Some(StageKey::new(stage, attempt)), ..Default::default() }
    }

    fn task(stage: i32, attempt: i32, launch: i64, finish: i64, run_time: u64) -> SparkEvent {
        SparkEvent::TaskEnd(TaskEnd {
            stage: Some(StageKey::new(stage, attempt)),
            launch_time: Some(launch),
            finish_time: Some(finish),
            metrics: Some(TaskMetrics { executor_run_time_ms: run_time, ..Default::default() }),
        })
    }

    #[test]
    fn test_lifecycle_states() {
        let mut agg = StageAggregator::default();
        let mut diag = ParseDiagnostics::default();
        let key = StageKey::new(1, 0);

        agg.apply(&task(1, 0, 100, 200, 90), &mut diag);
        assert_eq!(agg.state(key), Some(StageState::Unseen));

        agg.apply(&SparkEvent::StageSubmitted(stage_info(1, 0)), &mut diag);
        assert_eq!(agg.state(key), Some(StageState::Submitted));

        agg.apply(&SparkEvent::StageCompleted(stage_info(1, 0)), &mut diag);
        assert_eq!(agg.state(key), Some(StageState::Completed));

        // a late submitted event must not move the stage backwards
        agg.apply(&SparkEvent::StageSubmitted(stage_info(1, 0)), &mut diag);
        assert_eq!(agg.state(key), Some(StageState::Completed));
    }

    #[test]
    fn test_late_tasks_are_folded() {
        let mut agg = StageAggregator::default();
        let mut diag = ParseDiagnostics::default();

        let mut info = stage_info(3, 0);
        info.submission_time = Some(1000);
        info.completion_time = Some(5000);
        info.num_tasks = Some(2);
        agg.apply(&SparkEvent::StageSubmitted(info.clone()), &mut diag);
        agg.apply(&task(3, 0, 1000, 2000, 900), &mut diag);
        agg.apply(&SparkEvent::StageCompleted(info), &mut diag);
        agg.apply(&task(3, 0, 1500, 4000, 2400), &mut diag);

        let stages = agg.finalize();
        assert_eq!(stages.len(), 1);
        let s = &stages[0];
        assert_eq!(s.executor_run_time_ms, 3300);
        assert_eq!(s.num_tasks, 2);
        assert_eq!(s.duration_ms, Some(4000));
        assert_eq!(s.max_task_duration_ms, 2500);
        assert_eq!(s.p50_task_duration_ms, 1000);
        assert!(!s.times_inferred);
        assert_eq!(diag.task_end_events, 2);
    }

    #[test]
    fn test_task_count_falls_back_to_observed() {
        let mut agg = StageAggregator::default();
        let mut diag = ParseDiagnostics::default();
        for i in 0..5 {
            agg.apply(&task(0, 0, 10 + i, 20 + i, 5), &mut diag);
        }
        agg.apply(&SparkEvent::StageCompleted(stage_info(0, 0)), &mut diag);

        let stages = agg.finalize();
        assert_eq!(stages[0].num_tasks, 5);
    }

    #[test]
    fn test_orphaned_and_metricless_tasks() {
        let mut agg = StageAggregator::default();
        let mut diag = ParseDiagnostics::default();

        let orphan = SparkEvent::TaskEnd(TaskEnd { stage: None, ..Default::default() });
        agg.apply(&orphan, &mut diag);

        let failed = SparkEvent::TaskEnd(TaskEnd {
            stage: Some(StageKey::new(7, 0)),
            launch_time: Some(100),
            finish_time: Some(400),
            metrics: None,
        });
        agg.apply(&failed, &mut diag);

        assert_eq!(diag.task_end_events, 2);
        assert_eq!(diag.orphaned_task_ends, 1);
        assert_eq!(diag.task_ends_without_metrics, 1);

        let stages = agg.finalize();
        assert_eq!(stages.len(), 1);
        // duration still counts, run time does not
        assert_eq!(stages[0].sampled_tasks, 1);
        assert_eq!(stages[0].max_task_duration_ms, 300);
        assert_eq!(stages[0].executor_run_time_ms, 0);
    }

    #[test]
    fn test_finalize_sorted_by_stage_then_attempt() {
        let mut agg = StageAggregator::default();
        let mut diag = ParseDiagnostics::default();
        for (stage, attempt) in [(2, 1), (10, 0), (2, 0), (0, 3)] {
            agg.apply(&SparkEvent::StageSubmitted(stage_info(stage, attempt)), &mut diag);
        }
        let keys: Vec<_> = agg.finalize().iter().map(|s| (s.stage_id, s.attempt_id)).collect();
        assert_eq!(keys, vec![(0, 3), (2, 0), (2, 1), (10, 0)]);
    }

    #[test]
    fn test_times_inferred_from_tasks() {
        let mut agg = StageAggregator::default();
        let mut diag = ParseDiagnostics::default();
        agg.apply(&task(4, 0, 300, 900, 1), &mut diag);
        agg.apply(&task(4, 0, 200, 700, 1), &mut diag);

        let s = &agg.finalize()[0];
        assert!(s.times_inferred);
        assert_eq!(s.submission_time_ms, Some(200));
        assert_eq!(s.completion_time_ms, Some(900));
        assert_eq!(s.duration_ms, Some(700));
    }

    #[test]
    fn test_reservoir_bounds_memory() {
        let config = StageAggregatorConfig { reservoir_capacity: 32, seed: 9 };
        let mut agg = StageAggregator::new(config);
        let mut diag = ParseDiagnostics::default();
        for i in 0..1000 {
            agg.apply(&task(0, 0, 1, 2 + i, 1), &mut diag);
        }
        let s = &agg.finalize()[0];
        assert_eq!(s.sampled_tasks, 32);
        assert_eq!(s.num_tasks, 1000);
        assert_eq!(s.executor_run_time_ms, 1000);
    }

    #[test]
    fn test_identical_input_identical_summary() {
        let run = || {
            let config = StageAggregatorConfig { reservoir_capacity: 16, seed: 5 };
            let mut agg = StageAggregator::new(config);
            let mut diag = ParseDiagnostics::default();
            for i in 0..500 {
                agg.apply(&task(i % 3, 0, 1, 2 + (i as i64 * 37) % 1000, 1), &mut diag);
            }
            agg.finalize()
        };
        assert_eq!(run(), run());
    }
}
