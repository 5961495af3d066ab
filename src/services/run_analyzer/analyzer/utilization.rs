//! Cluster utilization scoring
//!
//! `utilization = min(1, executor_run_time / (avg_concurrency x cores x duration))`
//!
//! The slot-time ratio is the only signal used whenever the log contains executor
//! events. A task-count proxy exists for logs without any executor events (local
//! mode, trimmed logs) and is labelled as such in `basis`. The proxy is reduced when
//! the average input or shuffle partition is tiny, since such runs are overhead-bound.

use super::thresholds::utilization as limits;
use crate::services::run_analyzer::models::{
    Evidence, UtilizationBasis, UtilizationClass, UtilizationScore,
};
use serde_json::json;

/// Raw inputs, all taken from the aggregated run
#[derive(Debug, Clone, Default)]
pub struct UtilizationInputs {
    pub executor_run_time_ms: u64,
    pub duration_ms: Option<i64>,
    /// Time-weighted average from the executor timeline
    pub avg_concurrency: Option<f64>,
    pub max_executors: u32,
    pub executor_cores: Option<u32>,
    /// Whether any executor add/remove event was seen
    pub has_executor_events: bool,
    pub total_tasks: u64,
    pub avg_input_partition_mb: f64,
    pub avg_shuffle_partition_mb: f64,
}

pub struct UtilizationScorer;

impl UtilizationScorer {
    pub fn score(inputs: &UtilizationInputs) -> UtilizationScore {
        let mut evidence = Evidence::new();
        evidence.insert("executorRunTimeMs".into(), json!(inputs.executor_run_time_ms));
        evidence.insert("durationMs".into(), json!(inputs.duration_ms));
        evidence.insert("totalTasks".into(), json!(inputs.total_tasks));
        evidence.insert("maxExecutors".into(), json!(inputs.max_executors));
        evidence.insert("avgExecutors".into(), json!(inputs.avg_concurrency));
        evidence.insert("executorCores".into(), json!(inputs.executor_cores));

        if !inputs.has_executor_events {
            let penalty = Self::partition_penalty(
                inputs.avg_input_partition_mb,
                inputs.avg_shuffle_partition_mb,
            );
            evidence.insert("partitionPenalty".into(), json!(penalty));
            let utilization = (Self::task_count_proxy(inputs.total_tasks) - penalty).max(0.0);
            return Self::finish(utilization, UtilizationBasis::TaskCountProxy, evidence);
        }

        let Some(duration_ms) = inputs.duration_ms.filter(|&d| d > 0) else {
            return UtilizationScore {
                utilization: 0.0,
                score: 0,
                classification: UtilizationClass::Unknown,
                basis: UtilizationBasis::Unavailable,
                evidence,
            };
        };

        // Average over an undefined or empty window falls back to the peak count
        let (concurrency, source) = match inputs.avg_concurrency.filter(|&a| a > 0.0) {
            Some(avg) => (avg, "timeline"),
            None => (inputs.max_executors as f64, "maxExecutors"),
        };
        let cores = inputs.executor_cores.filter(|&c| c > 0).unwrap_or(1);
        let slot_time_ms = concurrency * cores as f64 * duration_ms as f64;

        evidence.insert("concurrencySource".into(), json!(source));
        evidence.insert("coresUsed".into(), json!(cores));
        evidence.insert("slotTimeMs".into(), json!(slot_time_ms));

        let utilization = Self::slot_time_ratio(inputs.executor_run_time_ms as f64, slot_time_ms);
        Self::finish(utilization, UtilizationBasis::SlotTime, evidence)
    }

    /// Busy time over available slot time, bounded to [0, 1]; 0 without slot time.
    pub fn slot_time_ratio(executor_run_time_ms: f64, slot_time_ms: f64) -> f64 {
        if slot_time_ms <= 0.0 {
            return 0.0;
        }
        (executor_run_time_ms / slot_time_ms).clamp(0.0, 1.0)
    }

    pub fn task_count_proxy(total_tasks: u64) -> f64 {
        (total_tasks as f64 / limits::PROXY_SATURATION_TASKS).min(1.0)
    }

    /// Overhead penalty for tiny average partitions; a size of 0 means no such data.
    pub fn partition_penalty(avg_input_mb: f64, avg_shuffle_mb: f64) -> f64 {
        let tiny = |mb: f64| mb > 0.0 && mb < limits::PROXY_TINY_PARTITION_MB;
        let mut penalty = 0.0;
        if tiny(avg_input_mb) {
            penalty += limits::PROXY_INPUT_PENALTY;
        }
        if tiny(avg_shuffle_mb) {
            penalty += limits::PROXY_SHUFFLE_PENALTY;
        }
        penalty
    }

    pub fn classify(utilization: f64) -> UtilizationClass {
        if utilization < limits::UNDER_UTILIZED_BELOW {
            UtilizationClass::UnderUtilized
        } else if utilization > limits::OVER_UTILIZED_ABOVE {
            UtilizationClass::OverUtilized
        } else {
            UtilizationClass::Balanced
        }
    }

    fn finish(utilization: f64, basis: UtilizationBasis, mut evidence: Evidence) -> UtilizationScore {
        let classification = Self::classify(utilization);
        evidence.insert("parallelismUtil".into(), json!(utilization));
        evidence.insert("classification".into(), json!(classification.as_str()));
        UtilizationScore {
            utilization,
            score: (utilization * 100.0).round() as u32,
            classification,
            basis,
            evidence,
        }
    }
}
