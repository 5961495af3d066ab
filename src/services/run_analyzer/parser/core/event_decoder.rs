//! Event decoder for Spark listener event logs
//!
//! Turns one JSON line into a typed [`SparkEvent`]. Decoding is a pure function:
//! counting skipped lines is the caller's job (see `EventLogParser`).

use super::json_fields::JsonFields;
use crate::services::run_analyzer::models::StageKey;
use serde_json::Value;

// ============================================================================
// Event Types
// ============================================================================

/// A decoded listener event.
///
/// Only the kinds the analyzer folds into its state carry a payload; every other
/// listener event is kept as `Other` with its tag so callers can count it.
#[derive(Debug, Clone, PartialEq)]
pub enum SparkEvent {
    AppStart {
        app_id: Option<String>,
        app_name: Option<String>,
        timestamp: Option<i64>,
    },
    AppEnd {
        timestamp: Option<i64>,
    },
    EnvUpdate {
        spark_properties: Vec<(String, String)>,
    },
    ExecutorAdded {
        timestamp: Option<i64>,
        executor_id: Option<String>,
        total_cores: Option<u32>,
    },
    ExecutorRemoved {
        timestamp: Option<i64>,
        executor_id: Option<String>,
        reason: Option<String>,
    },
    StageSubmitted(StageInfo),
    StageCompleted(StageInfo),
    TaskEnd(TaskEnd),
    Other(String),
}

/// Payload of `"Stage Info"` on stage submitted/completed events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInfo {
    pub key: Option<StageKey>,
    pub name: Option<String>,
    pub num_tasks: Option<u64>,
    pub submission_time: Option<i64>,
    pub completion_time: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskEnd {
    pub stage: Option<StageKey>,
    pub launch_time: Option<i64>,
    pub finish_time: Option<i64>,
    /// `None` when the event has no `"Task Metrics"` object (failed or killed tasks)
    pub metrics: Option<TaskMetrics>,
}

impl TaskEnd {
    /// Wall-clock duration, only when both ends are known and ordered.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.launch_time, self.finish_time) {
            (Some(launch), Some(finish)) if launch > 0 && finish > launch => Some(finish.saturating_sub(launch)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskMetrics {
    pub executor_run_time_ms: u64,
    pub gc_time_ms: u64,
    pub memory_spilled_bytes: u64,
    pub disk_spilled_bytes: u64,
    pub shuffle_read_bytes: u64,
    pub shuffle_write_bytes: u64,
    pub input_bytes: u64,
}

/// Outcome of decoding a single line
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(SparkEvent),
    Blank,
    /// Not JSON, not an object, or no string `"Event"` tag
    Malformed,
}

// ============================================================================
// Decoder
// ============================================================================

pub struct EventDecoder;

impl EventDecoder {
    pub fn decode(line: &str) -> Decoded {
        let line = line.trim();
        if line.is_empty() {
            return Decoded::Blank;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Decoded::Malformed,
        };

        let Some(tag) = JsonFields::str_at(&value, "Event") else {
            return Decoded::Malformed;
        };

        Decoded::Event(Self::decode_tagged(tag, &value))
    }

    fn decode_tagged(tag: &str, e: &Value) -> SparkEvent {
        match tag {
            "SparkListenerApplicationStart" => SparkEvent::AppStart {
                app_id: JsonFields::str_at(e, "App ID").map(str::to_string),
                app_name: JsonFields::str_at(e, "App Name").map(str::to_string),
                timestamp: JsonFields::i64_at(e, "Timestamp"),
            },
            "SparkListenerApplicationEnd" => {
                SparkEvent::AppEnd { timestamp: JsonFields::i64_at(e, "Timestamp") }
            },
            "SparkListenerEnvironmentUpdate" => {
                SparkEvent::EnvUpdate { spark_properties: Self::spark_properties(e) }
            },
            "SparkListenerExecutorAdded" => SparkEvent::ExecutorAdded {
                timestamp: JsonFields::i64_at(e, "Timestamp"),
                executor_id: JsonFields::str_at(e, "Executor ID").map(str::to_string),
                total_cores: JsonFields::object_at(e, "Executor Info")
                    .and_then(|info| JsonFields::u32_at(info, "Total Cores")),
            },
            "SparkListenerExecutorRemoved" => SparkEvent::ExecutorRemoved {
                timestamp: JsonFields::i64_at(e, "Timestamp"),
                executor_id: JsonFields::str_at(e, "Executor ID").map(str::to_string),
                reason: JsonFields::str_at(e, "Removed Reason").map(str::to_string),
            },
            "SparkListenerStageSubmitted" => SparkEvent::StageSubmitted(Self::stage_info(e)),
            "SparkListenerStageCompleted" => SparkEvent::StageCompleted(Self::stage_info(e)),
            "SparkListenerTaskEnd" => SparkEvent::TaskEnd(Self::task_end(e)),
            other => SparkEvent::Other(other.to_string()),
        }
    }

    /// `"Spark Properties"` is an object in current Spark versions and an array of
    /// `[key, value]` pairs in older ones.
    fn spark_properties(e: &Value) -> Vec<(String, String)> {
        match e.get("Spark Properties") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), Self::scalar_to_string(v)))
                .collect(),
            Some(Value::Array(pairs)) => pairs
                .iter()
                .filter_map(|pair| match pair.as_array().map(Vec::as_slice) {
                    Some([k, v]) => k.as_str().map(|k| (k.to_string(), Self::scalar_to_string(v))),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn scalar_to_string(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn stage_info(e: &Value) -> StageInfo {
        let Some(info) = JsonFields::object_at(e, "Stage Info") else {
            return StageInfo::default();
        };

        StageInfo {
            key: Self::stage_key(info),
            name: JsonFields::str_at(info, "Stage Name").map(str::to_string),
            num_tasks: JsonFields::i64_at(info, "Number of Tasks").and_then(|n| u64::try_from(n).ok()),
            submission_time: JsonFields::i64_at(info, "Submission Time"),
            completion_time: JsonFields::i64_at(info, "Completion Time"),
        }
    }

    /// Stage id is required, a missing attempt id means the first attempt.
    fn stage_key(v: &Value) -> Option<StageKey> {
        let stage_id = JsonFields::i32_at(v, "Stage ID")?;
        let attempt_id = JsonFields::i32_at(v, "Stage Attempt ID").unwrap_or(0);
        Some(StageKey::new(stage_id, attempt_id))
    }

    fn task_end(e: &Value) -> TaskEnd {
        // Spark 3.x puts the stage reference at the top level; older writers nest it
        let stage = Self::stage_key(e).or_else(|| {
            JsonFields::object_at(e, "Stage Info").and_then(Self::stage_key)
        });

        TaskEnd {
            stage,
            launch_time: JsonFields::i64_at_path(e, "Task Info", "Launch Time"),
            finish_time: JsonFields::i64_at_path(e, "Task Info", "Finish Time"),
            metrics: JsonFields::object_at(e, "Task Metrics").map(Self::task_metrics),
        }
    }

    fn task_metrics(tm: &Value) -> TaskMetrics {
        let shuffle_read_bytes = JsonFields::object_at(tm, "Shuffle Read Metrics")
            .map(|sr| {
                JsonFields::counter_at(sr, "Remote Bytes Read")
                    + JsonFields::counter_at(sr, "Local Bytes Read")
            })
            .unwrap_or(0);

        TaskMetrics {
            executor_run_time_ms: JsonFields::counter_at(tm, "Executor Run Time"),
            gc_time_ms: JsonFields::counter_at(tm, "JVM GC Time"),
            memory_spilled_bytes: JsonFields::counter_at(tm, "Memory Bytes Spilled"),
            disk_spilled_bytes: JsonFields::counter_at(tm, "Disk Bytes Spilled"),
            shuffle_read_bytes,
            shuffle_write_bytes: JsonFields::object_at(tm, "Shuffle Write Metrics")
                .map(|sw| JsonFields::counter_at(sw, "Shuffle Bytes Written"))
                .unwrap_or(0),
            input_bytes: JsonFields::object_at(tm, "Input Metrics")
                .map(|im| JsonFields::counter_at(im, "Bytes Read"))
                .unwrap_or(0),
        }
    }
}
