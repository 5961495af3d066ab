use crate::services::run_analyzer::AnalysisContext;
use crate::services::run_analyzer::parser::parse_timezone;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Analysis settings (loaded from conf/config.toml)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Task durations sampled per stage (default: 15000, accepts "15k")
    #[serde(deserialize_with = "deserialize_capacity")]
    pub reservoir_capacity: usize,
    /// Base seed for the per-stage samplers (default: 42)
    pub reservoir_seed: u64,
    /// Zone of rule log timestamps, IANA name or fixed offset (default: Asia/Kolkata)
    pub timezone: String,
    /// Length of the top stages list (default: 10)
    pub top_stages: usize,
    /// Length of the top rules list (default: 50)
    pub top_rules: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pretty-print JSON artifacts (default: true)
    pub pretty: bool,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "runscope")]
#[command(version, about = "Runscope - Spark run analytics for reconciliation jobs")]
pub struct CommandLineArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<String>,

    /// Logging level (overrides config file, e.g., "info,runscope=debug")
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Rule log timezone (overrides config file, e.g., "Asia/Kolkata", "+05:30", "UTC")
    #[arg(long, value_name = "ZONE", global = true, allow_hyphen_values = true)]
    pub timezone: Option<String>,

    /// Reservoir capacity per stage (overrides config file, e.g., "15000", "20k")
    #[arg(long, value_name = "N", global = true)]
    pub reservoir_capacity: Option<String>,

    /// Reservoir base seed (overrides config file)
    #[arg(long, value_name = "SEED", global = true)]
    pub reservoir_seed: Option<u64>,

    /// Write compact JSON instead of pretty-printed
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Summarize one event log into summary.json and utilization.json
    Summarize {
        /// Spark event log (plain or .gz)
        event_log: PathBuf,
        /// Output directory
        out_dir: PathBuf,
        /// Reconciliation driver log with rule metrics
        #[arg(long, value_name = "PATH")]
        rule_log: Option<PathBuf>,
    },
    /// Compare two runs into diff.json and llm_prompt.txt
    Diff {
        baseline: PathBuf,
        candidate: PathBuf,
        out_dir: PathBuf,
        #[arg(long, value_name = "PATH")]
        baseline_rule_log: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        candidate_rule_log: Option<PathBuf>,
    },
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        // 1. Load from config file (use CLI --config if provided, otherwise find default)
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Override with command line arguments (highest priority)
        config.apply_cli_overrides(cli_args);

        // 4. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,runscope=debug")
    /// - APP_LOG_FILE: Log file path (e.g., "logs/runscope.log")
    /// - APP_RESERVOIR_CAPACITY: Samples per stage (accepts "15000", "15k")
    /// - APP_RESERVOIR_SEED: Base sampler seed
    /// - APP_TIMEZONE: Rule log timezone (e.g., "Asia/Kolkata", "+05:30")
    /// - APP_TOP_STAGES / APP_TOP_RULES: Hotspot list lengths
    /// - APP_OUTPUT_PRETTY: Pretty JSON output (true/false)
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(file) = std::env::var("APP_LOG_FILE") {
            tracing::info!("Override logging.file from env: {}", file);
            self.logging.file = Some(file);
        }

        if let Ok(capacity) = std::env::var("APP_RESERVOIR_CAPACITY") {
            match parse_capacity(&capacity) {
                Ok(val) => {
                    self.analysis.reservoir_capacity = val;
                    tracing::info!(
                        "Override analysis.reservoir_capacity from env: {}",
                        self.analysis.reservoir_capacity
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_RESERVOIR_CAPACITY '{}': {} (keep {})",
                    capacity,
                    e,
                    self.analysis.reservoir_capacity
                ),
            }
        }

        if let Ok(seed) = std::env::var("APP_RESERVOIR_SEED")
            && let Ok(seed) = seed.parse()
        {
            self.analysis.reservoir_seed = seed;
            tracing::info!("Override analysis.reservoir_seed from env: {}", self.analysis.reservoir_seed);
        }

        if let Ok(tz) = std::env::var("APP_TIMEZONE") {
            self.analysis.timezone = tz;
            tracing::info!("Override analysis.timezone from env: {}", self.analysis.timezone);
        }

        if let Ok(n) = std::env::var("APP_TOP_STAGES")
            && let Ok(n) = n.parse()
        {
            self.analysis.top_stages = n;
            tracing::info!("Override analysis.top_stages from env: {}", self.analysis.top_stages);
        }

        if let Ok(n) = std::env::var("APP_TOP_RULES")
            && let Ok(n) = n.parse()
        {
            self.analysis.top_rules = n;
            tracing::info!("Override analysis.top_rules from env: {}", self.analysis.top_rules);
        }

        if let Ok(pretty) = std::env::var("APP_OUTPUT_PRETTY")
            && let Ok(val) = pretty.parse()
        {
            self.output.pretty = val;
            tracing::info!("Override output.pretty from env: {}", self.output.pretty);
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(tz) = &args.timezone {
            self.analysis.timezone = tz.clone();
            tracing::info!("Override analysis.timezone from CLI: {}", self.analysis.timezone);
        }

        if let Some(capacity) = &args.reservoir_capacity {
            match parse_capacity(capacity) {
                Ok(val) => {
                    self.analysis.reservoir_capacity = val;
                    tracing::info!(
                        "Override analysis.reservoir_capacity from CLI: {}",
                        self.analysis.reservoir_capacity
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid --reservoir-capacity '{}': {} (keep {})",
                    capacity,
                    e,
                    self.analysis.reservoir_capacity
                ),
            }
        }

        if let Some(seed) = args.reservoir_seed {
            self.analysis.reservoir_seed = seed;
            tracing::info!("Override analysis.reservoir_seed from CLI: {}", seed);
        }

        if args.compact {
            self.output.pretty = false;
            tracing::info!("Override output.pretty from CLI: false");
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.analysis.reservoir_capacity == 0 {
            anyhow::bail!("analysis.reservoir_capacity must be > 0");
        }
        if self.analysis.top_stages == 0 {
            anyhow::bail!("analysis.top_stages must be > 0");
        }
        if self.analysis.top_rules == 0 {
            anyhow::bail!("analysis.top_rules must be > 0");
        }
        if let Err(e) = parse_timezone(&self.analysis.timezone) {
            anyhow::bail!("analysis.timezone: {}", e);
        }

        Ok(())
    }

    /// Settings handed to the analyzer
    pub fn analysis_context(&self) -> Result<AnalysisContext, anyhow::Error> {
        Ok(AnalysisContext {
            reservoir_capacity: self.analysis.reservoir_capacity,
            reservoir_seed: self.analysis.reservoir_seed,
            timezone: parse_timezone(&self.analysis.timezone)?,
            top_stages: self.analysis.top_stages,
            top_rules: self.analysis.top_rules,
        })
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,runscope=debug".to_string(),
            file: Some("logs/runscope.log".to_string()),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reservoir_capacity: 15_000,
            reservoir_seed: 42,
            timezone: "Asia/Kolkata".to_string(),
            top_stages: 10,
            top_rules: 50,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_capacity(input: &str) -> Result<usize, String> {
    // Accept plain numbers
    if let Ok(val) = input.parse::<usize>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: usize = num_str.parse().map_err(|_| "invalid number".to_string())?;
    let scale = match unit {
        "k" => 1_000,
        "m" => 1_000_000,
        _ => return Err(format!("unsupported unit: {}", unit)),
    };
    n.checked_mul(scale).ok_or_else(|| "value too large".to_string())
}

// Custom serde deserializer to support numeric or "15k"-style string values
fn deserialize_capacity<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = usize;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a sample count or a string like '15k'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            usize::try_from(v).map_err(E::custom)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            usize::try_from(v).map_err(|_| E::custom("negative not allowed"))
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_capacity(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_capacity(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::run_analyzer::parser::LogTimezone;
    use chrono::FixedOffset;

    #[test]
    fn test_parse_capacity() {
        assert_eq!(parse_capacity("15000"), Ok(15_000));
        assert_eq!(parse_capacity("15k"), Ok(15_000));
        assert_eq!(parse_capacity("2M"), Ok(2_000_000));
        assert!(parse_capacity("k").is_err());
        assert!(parse_capacity("15x").is_err());
    }

    #[test]
    fn test_toml_sections() {
        let config: Config = toml::from_str(
            r#"
            [logging]
            level = "warn"

            [analysis]
            reservoir_capacity = "20k"
            timezone = "UTC"

            [output]
            pretty = false
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.file.as_deref(), Some("logs/runscope.log"));
        assert_eq!(config.analysis.reservoir_capacity, 20_000);
        assert_eq!(config.analysis.reservoir_seed, 42);
        assert_eq!(config.analysis.top_rules, 50);
        assert!(!config.output.pretty);
        assert!(config.validate().is_ok());

        let numeric: Config = toml::from_str("[analysis]\nreservoir_capacity = 500\n").unwrap();
        assert_eq!(numeric.analysis.reservoir_capacity, 500);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.analysis.reservoir_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.top_stages = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analysis.timezone = "America/New_York".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let args = CommandLineArgs::try_parse_from([
            "runscope",
            "summarize",
            "app.json",
            "out",
            "--timezone",
            "-08:00",
            "--reservoir-capacity",
            "1k",
            "--reservoir-seed",
            "7",
            "--compact",
        ])
        .unwrap();

        let mut config = Config::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.analysis.timezone, "-08:00");
        assert_eq!(config.analysis.reservoir_capacity, 1_000);
        assert_eq!(config.analysis.reservoir_seed, 7);
        assert!(!config.output.pretty);

        let ctx = config.analysis_context().unwrap();
        assert_eq!(ctx.timezone, LogTimezone::Fixed(FixedOffset::west_opt(28_800).unwrap()));
        assert_eq!(ctx.reservoir_capacity, 1_000);

        assert!(matches!(args.command, Command::Summarize { rule_log: None, .. }));
    }

    #[test]
    fn test_diff_command() {
        let args = CommandLineArgs::try_parse_from([
            "runscope",
            "diff",
            "a.json",
            "b.json.gz",
            "out",
            "--candidate-rule-log",
            "b.log",
        ])
        .unwrap();

        let Command::Diff { baseline, candidate_rule_log, baseline_rule_log, .. } = args.command else {
            panic!("expected diff command");
        };
        assert_eq!(baseline, PathBuf::from("a.json"));
        assert_eq!(candidate_rule_log, Some(PathBuf::from("b.log")));
        assert_eq!(baseline_rule_log, None);
    }
}
