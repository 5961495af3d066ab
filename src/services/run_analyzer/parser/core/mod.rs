//! Core decoding components for Spark event logs

pub mod event_decoder;
pub mod json_fields;

pub use event_decoder::{Decoded, EventDecoder, SparkEvent, StageInfo, TaskEnd, TaskMetrics};
pub use json_fields::JsonFields;
