//! Log parser module
//!
//! Streams Spark event logs (plain or gzip) and reconciliation rule logs into
//! structured run data.

pub mod core;
pub mod error;
pub mod event_log;
pub mod rule_log;

// Re-export commonly used items
pub use error::{ParseError, ParseResult};
pub use event_log::{EventLogParser, ParsedRun};
pub use rule_log::{LogTimezone, RuleLogParser, parse_timezone};
