use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runscope::config::{Command, CommandLineArgs, Config, LoggingConfig};
use runscope::services::ReportWriter;
use runscope::services::run_analyzer::prompt::build_diff_prompt;
use runscope::services::run_analyzer::{
    AnalysisContext, DiffReport, RunSummary, compare_runs, summarize_event_log,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommandLineArgs::parse();

    // Load configuration first
    let config = Config::load_with_args(&args)?;

    // The guard flushes the file appender on drop, so it lives as long as main
    let _log_guard = init_logging(&config.logging);
    tracing::info!("Runscope starting up");
    tracing::info!("Configuration loaded successfully");

    let ctx = config.analysis_context()?;

    let written = match args.command {
        Command::Summarize { event_log, out_dir, rule_log } => {
            let writer = ReportWriter::new(out_dir, config.output.pretty)?;
            let summary = summarize_blocking(event_log, rule_log, ctx).await?;

            vec![
                writer.write_json("summary.json", &summary)?,
                writer.write_json("utilization.json", &summary.utilization)?,
            ]
        },
        Command::Diff { baseline, candidate, out_dir, baseline_rule_log, candidate_rule_log } => {
            let writer = ReportWriter::new(out_dir, config.output.pretty)?;

            // Both runs are parsed in parallel and joined before diffing
            let (baseline, candidate) = tokio::try_join!(
                summarize_blocking(baseline, baseline_rule_log, ctx.clone()),
                summarize_blocking(candidate, candidate_rule_log, ctx.clone()),
            )?;

            let diff = compare_runs(&baseline, &candidate);
            tracing::info!(
                "Diff {} -> {}: {} regressions",
                display_run_id(&baseline),
                display_run_id(&candidate),
                diff.regressions.len()
            );

            let report = DiffReport { baseline: &baseline, candidate: &candidate, diff: &diff };
            vec![
                writer.write_json("diff.json", &report)?,
                writer.write_text("llm_prompt.txt", &build_diff_prompt(&diff)?)?,
            ]
        },
    };

    for path in written {
        println!("Wrote: {}", path.display());
    }

    Ok(())
}

/// Run the blocking parse and summarize pipeline off the async workers.
async fn summarize_blocking(
    event_log: PathBuf,
    rule_log: Option<PathBuf>,
    ctx: AnalysisContext,
) -> anyhow::Result<RunSummary> {
    let summary = tokio::task::spawn_blocking(move || {
        summarize_event_log(&event_log, rule_log.as_deref(), &ctx)
    })
    .await??;
    Ok(summary)
}

fn display_run_id(summary: &RunSummary) -> &str {
    summary.run_id.as_deref().unwrap_or("<unknown>")
}

type BoxedSubscriber = Box<dyn tracing::Subscriber + Send + Sync + 'static>;

fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let (subscriber, guard) = build_subscriber(logging);
    subscriber.init();
    guard
}

/// Console logs go to stderr; stdout only carries the written paths.
fn build_subscriber(logging: &LoggingConfig) -> (BoxedSubscriber, Option<WorkerGuard>) {
    let log_filter = tracing_subscriber::EnvFilter::new(&logging.level);

    let registry = tracing_subscriber::registry().with(log_filter);

    // Add file logging if configured
    if let Some(log_file) = &logging.file {
        // Ensure log directory exists
        let log_path = Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        // Extract directory and filename prefix from config
        let log_dir = log_path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runscope.log");
        // Remove .log extension if present (rolling appender adds date suffix)
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let subscriber = registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        (Box::new(subscriber), Some(guard))
    } else {
        let subscriber = registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        (Box::new(subscriber), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_only_subscriber() {
        let logging = LoggingConfig { level: "debug".to_string(), file: None };
        let (subscriber, guard) = build_subscriber(&logging);
        assert!(guard.is_none());
        tracing::subscriber::with_default(subscriber, || tracing::debug!("console only"));
    }

    #[test]
    fn test_file_subscriber_creates_log_dir() {
        let dir = std::env::temp_dir().join(format!("runscope-logs-{}", std::process::id()));
        let logging = LoggingConfig {
            level: "info,runscope=debug".to_string(),
            file: Some(dir.join("runscope.log").to_string_lossy().into_owned()),
        };

        let (subscriber, guard) = build_subscriber(&logging);
        assert!(guard.is_some());
        assert!(dir.is_dir());
        tracing::subscriber::with_default(subscriber, || tracing::info!("to file and console"));

        drop(guard);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
