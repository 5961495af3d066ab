//! Executor concurrency as a step function over time
//!
//! Each add/remove event records the concurrent executor count right after it at
//! the event's timestamp. Integrating the step function over a window gives the
//! time-weighted average concurrency used for slot-time utilization.

use crate::services::run_analyzer::models::ExecutorSummary;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};

#[derive(Debug, Clone, Default)]
pub struct ExecutorTimeline {
    /// timestamp -> executor count after the last event at that timestamp
    breakpoints: BTreeMap<i64, u32>,
    current: u32,
    max_concurrent: u32,
    total_added: u32,
    total_removed: u32,
}

impl ExecutorTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event without a timestamp still changes the count, it just adds no breakpoint.
    pub fn executor_added(&mut self, timestamp: Option<i64>) {
        self.current += 1;
        self.total_added += 1;
        self.max_concurrent = self.max_concurrent.max(self.current);
        self.record(timestamp);
    }

    pub fn executor_removed(&mut self, timestamp: Option<i64>) {
        self.current = self.current.saturating_sub(1);
        self.total_removed += 1;
        self.record(timestamp);
    }

    fn record(&mut self, timestamp: Option<i64>) {
        if let Some(ts) = timestamp {
            self.breakpoints.insert(ts, self.current);
        }
    }

    /// True once any executor event was seen
    pub fn has_events(&self) -> bool {
        self.total_added > 0 || self.total_removed > 0
    }

    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent
    }

    /// Count in effect at `t`: the last breakpoint at or before `t`, else 0.
    pub fn count_at(&self, t: i64) -> u32 {
        self.breakpoints
            .range(..=t)
            .next_back()
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Time-weighted average executor count over `[start, end]`.
    ///
    /// Returns `None` unless `end > start`.
    pub fn average_concurrency(&self, start: i64, end: i64) -> Option<f64> {
        if end <= start {
            return None;
        }

        // Widened so spans between extreme timestamps cannot overflow
        let span = |from: i64, to: i64| i128::from(to) - i128::from(from);

        let mut area: i128 = 0;
        let mut last_t = start;
        let mut last_count = self.count_at(start);

        for (&t, &count) in self.breakpoints.range((Excluded(start), Included(end))) {
            area += span(last_t, t) * i128::from(last_count);
            last_t = t;
            last_count = count;
        }
        area += span(last_t, end) * i128::from(last_count);

        Some(area as f64 / span(start, end) as f64)
    }

    /// Freeze into the summary model; `window` is the run's `[start, end]` if known.
    pub fn summarize(&self, window: Option<(i64, i64)>, executor_cores: Option<u32>) -> ExecutorSummary {
        ExecutorSummary {
            max_concurrent: self.max_concurrent,
            total_added: self.total_added,
            total_removed: self.total_removed,
            avg_concurrency: window.and_then(|(start, end)| self.average_concurrency(start, end)),
            executor_cores,
        }
    }
}
