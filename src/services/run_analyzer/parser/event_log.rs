//! Event log parser - streaming entry point for Spark event logs
//!
//! Reads the log line by line (plain or gzip), decodes each line and routes the
//! event: run header and executor events are kept here, stage and task events go
//! to the [`StageAggregator`]. Memory is bounded by the number of stages and the
//! reservoir capacity, never by the number of tasks.

use crate::services::run_analyzer::analyzer::executor_timeline::ExecutorTimeline;
use crate::services::run_analyzer::analyzer::stage_aggregator::{
    StageAggregator, StageAggregatorConfig,
};
use crate::services::run_analyzer::models::{ParseDiagnostics, RunStatus, StageSummary};
use crate::services::run_analyzer::parser::core::{Decoded, EventDecoder, SparkEvent};
use crate::services::run_analyzer::parser::error::{ParseError, ParseResult};
use flate2::read::MultiGzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Spark properties kept in the summary (exact keys or key prefixes)
pub const CONF_PREFIXES: &[&str] = &[
    "spark.sql.adaptive.",
    "spark.sql.shuffle.partitions",
    "spark.sql.autoBroadcastJoinThreshold",
    "spark.sql.files.maxPartitionBytes",
    "spark.sql.join.preferSortMergeJoin",
    "spark.dynamicAllocation.",
    "spark.executor.",
    "spark.sql.parquet.",
    "spark.sql.catalog.",
    "spark.sql.iceberg.",
];

const EXECUTOR_CORES_KEY: &str = "spark.executor.cores";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Everything one pass over an event log produces, before analysis
#[derive(Debug, Clone, Default)]
pub struct ParsedRun {
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub app_ended: bool,
    pub spark_conf: BTreeMap<String, String>,
    /// `spark.executor.cores`, else the first executor's total cores
    pub executor_cores: Option<u32>,
    pub executors: ExecutorTimeline,
    pub stages: Vec<StageSummary>,
    pub diagnostics: ParseDiagnostics,
}

impl ParsedRun {
    /// Present only when both ends are known and ordered
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time_ms, self.end_time_ms) {
            (Some(start), Some(end)) if end >= start => Some(end.saturating_sub(start)),
            _ => None,
        }
    }

    pub fn window(&self) -> Option<(i64, i64)> {
        match (self.start_time_ms, self.end_time_ms) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.app_ended { RunStatus::Succeeded } else { RunStatus::Unknown }
    }
}

/// Mutable state of a parse in progress
#[derive(Debug, Default)]
struct RunBuilder {
    run: ParsedRun,
    first_executor_cores: Option<u32>,
    stages: StageAggregator,
}

impl RunBuilder {
    fn new(config: StageAggregatorConfig) -> Self {
        Self { stages: StageAggregator::new(config), ..Default::default() }
    }

    fn consume_line(&mut self, raw: &[u8]) {
        let diagnostics = &mut self.run.diagnostics;
        diagnostics.lines_read += 1;

        let Ok(line) = std::str::from_utf8(raw) else {
            diagnostics.malformed_lines += 1;
            return;
        };

        match EventDecoder::decode(line) {
            Decoded::Blank => diagnostics.blank_lines += 1,
            Decoded::Malformed => diagnostics.malformed_lines += 1,
            Decoded::Event(event) => self.apply(event),
        }
    }

    fn apply(&mut self, event: SparkEvent) {
        let run = &mut self.run;
        match event {
            SparkEvent::AppStart { app_id, app_name, timestamp } => {
                run.app_id = app_id.or(run.app_id.take());
                run.app_name = app_name.or(run.app_name.take());
                run.start_time_ms = timestamp.or(run.start_time_ms);
            },
            SparkEvent::AppEnd { timestamp } => {
                run.app_ended = true;
                run.end_time_ms = timestamp.or(run.end_time_ms);
            },
            SparkEvent::EnvUpdate { spark_properties } => {
                run.spark_conf.extend(
                    spark_properties
                        .into_iter()
                        .filter(|(key, _)| CONF_PREFIXES.iter().any(|p| key.starts_with(p))),
                );
            },
            SparkEvent::ExecutorAdded { timestamp, total_cores, .. } => {
                run.executors.executor_added(timestamp);
                if self.first_executor_cores.is_none() {
                    self.first_executor_cores = total_cores.filter(|&c| c > 0);
                }
            },
            SparkEvent::ExecutorRemoved { timestamp, .. } => {
                run.executors.executor_removed(timestamp);
            },
            SparkEvent::Other(_) => run.diagnostics.ignored_events += 1,
            stage_or_task => self.stages.apply(&stage_or_task, &mut run.diagnostics),
        }
    }

    fn finish(self) -> ParsedRun {
        let mut run = self.run;
        run.executor_cores = run
            .spark_conf
            .get(EXECUTOR_CORES_KEY)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|&c| c > 0)
            .or(self.first_executor_cores);
        run.stages = self.stages.finalize();

        let d = &run.diagnostics;
        tracing::info!(
            "Parsed event log: {} lines, {} malformed, {} TaskEnd ({} orphaned, {} without metrics), {} stages",
            d.lines_read,
            d.malformed_lines,
            d.task_end_events,
            d.orphaned_task_ends,
            d.task_ends_without_metrics,
            run.stages.len()
        );
        run
    }
}

/// Streaming Spark event log parser
#[derive(Debug, Clone, Default)]
pub struct EventLogParser {
    config: StageAggregatorConfig,
}

impl EventLogParser {
    pub fn new(config: StageAggregatorConfig) -> Self {
        Self { config }
    }

    /// Parse an event log file, gzip-compressed when named `*.gz` or when it starts
    /// with the gzip magic bytes.
    pub fn parse_path(&self, path: &Path) -> ParseResult<ParsedRun> {
        let open_err = |source| ParseError::Open { path: path.to_path_buf(), source };

        let file = File::open(path).map_err(open_err)?;
        let mut reader = BufReader::new(file);
        let gzip = Self::is_gzip(path, &mut reader).map_err(open_err)?;

        tracing::debug!("Reading event log {} (gzip: {})", path.display(), gzip);

        if gzip {
            self.parse_reader(BufReader::new(MultiGzDecoder::new(reader)))
                .map_err(|source| ParseError::Decompress { path: path.to_path_buf(), source })
        } else {
            self.parse_reader(reader)
                .map_err(|source| ParseError::Read { path: path.to_path_buf(), source })
        }
    }

    /// Parse an already-open stream of newline-delimited events.
    ///
    /// An I/O error before the first line is returned; after that it is treated as
    /// the end of a truncated log.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> io::Result<ParsedRun> {
        let mut builder = RunBuilder::new(self.config.clone());
        let mut buf = Vec::with_capacity(4096);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => builder.consume_line(&buf),
                Err(e) if builder.run.diagnostics.lines_read > 0 => {
                    tracing::warn!(
                        "Event log read failed after {} lines, treating as truncated: {}",
                        builder.run.diagnostics.lines_read,
                        e
                    );
                    builder.run.diagnostics.truncated = true;
                    break;
                },
                Err(e) => return Err(e),
            }
        }

        Ok(builder.finish())
    }

    fn is_gzip<R: BufRead>(path: &Path, reader: &mut R) -> io::Result<bool> {
        let by_name = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        Ok(by_name || reader.fill_buf()?.starts_with(&GZIP_MAGIC))
    }
}
