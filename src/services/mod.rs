pub mod report_writer;
pub mod run_analyzer;

pub use report_writer::ReportWriter;
pub use run_analyzer::{AnalysisContext, DiffEngine, EventLogParser, InsightEngine, RuleLogParser};
