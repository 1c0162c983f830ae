use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::alerts::DEFAULT_THRESHOLDS;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::projection::{ProjectionParams, RegressionAxis};
use crate::retry::RetryPolicy;
use crate::store::DataFile;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Track Claude usage caps and project when they run out")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the usage data file
    #[arg(long, global = true)]
    pub data_file: Option<PathBuf>,

    /// Polling interval in seconds
    #[arg(short = 'i', long, global = true)]
    pub poll_interval: Option<u64>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Record cap percentages entered by hand
    Record(RecordArgs),
    /// Parse captured `/usage` output (file or stdin) and record it
    Ingest {
        /// File with the captured screen; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Recompute projections for the stored history
    Project,
    /// Print current usage and projections
    Show {
        /// Print the stored document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reload, recompute and print on every poll interval
    Watch,
}

/// Arguments of `record`
#[derive(Args, Debug, Clone, Default)]
pub struct RecordArgs {
    /// Session cap used percentage
    #[arg(long)]
    pub session: Option<f64>,

    /// Weekly cap used percentage
    #[arg(long)]
    pub week: Option<f64>,

    /// Weekly model cap used percentage
    #[arg(long)]
    pub model_week: Option<f64>,

    /// Session reset time (RFC 3339)
    #[arg(long)]
    pub session_reset: Option<String>,

    /// Weekly reset time (RFC 3339)
    #[arg(long)]
    pub week_reset: Option<String>,

    /// Weekly model reset time (RFC 3339)
    #[arg(long)]
    pub model_week_reset: Option<String>,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Nominal polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Usage document location (defaults to the platform data directory)
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// History retention
    #[serde(default)]
    pub history: HistorySettings,

    /// Projection tuning
    #[serde(default)]
    pub projection: ProjectionSettings,

    /// Threshold alerts
    #[serde(default)]
    pub alerts: AlertSettings,

    /// Retry policy for reading the data file while watching
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_poll_interval() -> u64 {
    300
}

/// History retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Maximum retained samples (default: one week at 5-minute polls)
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Projection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionSettings {
    /// Samples in the smoothed value (default: 12 = one hour at 5-minute polls)
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    /// Regression axis: "sample_index" or "elapsed_time"
    #[serde(default)]
    pub regression: RegressionAxis,

    /// Regress only over samples after the last drop of more than this many
    /// percentage points (unset: use the whole history)
    #[serde(default)]
    pub reset_drop_threshold: Option<f64>,
}

fn default_smoothing_window() -> usize {
    12
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            smoothing_window: default_smoothing_window(),
            regression: RegressionAxis::default(),
            reset_drop_threshold: None,
        }
    }
}

/// Alert settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Log threshold crossings
    #[serde(default = "default_alerts_enabled")]
    pub enabled: bool,

    /// Thresholds in percent
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u8>,
}

fn default_alerts_enabled() -> bool {
    true
}

fn default_thresholds() -> Vec<u8> {
    DEFAULT_THRESHOLDS.to_vec()
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: default_alerts_enabled(),
            thresholds: default_thresholds(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            data_file: None,
            history: HistorySettings::default(),
            projection: ProjectionSettings::default(),
            alerts: AlertSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::read(p);
            }
        }

        for path in Self::default_paths().iter() {
            if path.exists() {
                return Self::read(path);
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Default config locations, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("quotacast/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/quotacast/config.toml")),
            dirs::home_dir().map(|p| p.join(".quotacast.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(poll_interval) = cli.poll_interval {
            self.poll_interval_secs = poll_interval;
        }
        if let Some(data_file) = &cli.data_file {
            self.data_file = Some(data_file.clone());
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        const MIN_POLL_INTERVAL: u64 = 1;

        if self.poll_interval_secs < MIN_POLL_INTERVAL {
            self.poll_interval_secs = MIN_POLL_INTERVAL;
        }
        if self.history.capacity == 0 {
            self.history.capacity = 1;
        }
        if self.projection.smoothing_window == 0 {
            self.projection.smoothing_window = default_smoothing_window();
        }
        if let Some(threshold) = self.projection.reset_drop_threshold {
            if threshold.is_nan() || threshold <= 0.0 {
                self.projection.reset_drop_threshold = None;
            }
        }
        self.alerts.thresholds.retain(|&t| t <= 100);
        self.alerts.thresholds.sort_unstable();
        self.alerts.thresholds.dedup();
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
    }

    /// Projection parameters for the configured cadence
    pub fn projection_params(&self) -> ProjectionParams {
        ProjectionParams {
            smoothing_window: self.projection.smoothing_window,
            regression: self.projection.regression,
            reset_drop_threshold: self.projection.reset_drop_threshold,
            ..ProjectionParams::from_poll_interval(self.poll_interval_secs)
        }
    }

    /// The usage data file
    pub fn data_file(&self) -> DataFile {
        DataFile::new(self.data_file.clone().unwrap_or_else(DataFile::default_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval_secs, 300);
        assert_eq!(settings.history.capacity, 2016);
        assert_eq!(settings.projection.smoothing_window, 12);
        assert_eq!(settings.projection.regression, RegressionAxis::SampleIndex);
        assert_eq!(settings.alerts.thresholds, vec![80, 90, 100]);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            poll_interval_secs = 600
            data_file = "/var/lib/quotacast/usage.json"

            [projection]
            regression = "elapsed_time"
            reset_drop_threshold = 25.0

            [alerts]
            thresholds = [50, 75]

            [retry]
            max_attempts = 2
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.poll_interval_secs, 600);
        assert_eq!(
            settings.data_file,
            Some(PathBuf::from("/var/lib/quotacast/usage.json"))
        );
        assert_eq!(settings.projection.regression, RegressionAxis::ElapsedTime);
        assert_eq!(settings.projection.smoothing_window, 12);
        assert_eq!(settings.alerts.thresholds, vec![50, 75]);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.initial_delay_ms, 1000);
        assert_eq!(settings.history.capacity, 2016);
    }

    #[test]
    fn test_projection_params_follow_cadence() {
        let mut settings = Settings::default();
        settings.poll_interval_secs = 600;
        settings.projection.smoothing_window = 6;

        let params = settings.projection_params();
        assert_eq!(params.samples_per_hour, 6.0);
        assert_eq!(params.smoothing_window, 6);
        assert_eq!(params.cap_limit, 100.0);
    }

    #[test]
    fn test_validate_normalizes() {
        let mut settings = Settings::default();
        settings.poll_interval_secs = 0;
        settings.history.capacity = 0;
        settings.projection.smoothing_window = 0;
        settings.projection.reset_drop_threshold = Some(-3.0);
        settings.alerts.thresholds = vec![100, 150, 80, 80];
        settings.retry.max_attempts = 0;

        settings.validate();
        assert_eq!(settings.poll_interval_secs, 1);
        assert_eq!(settings.history.capacity, 1);
        assert_eq!(settings.projection.smoothing_window, 12);
        assert_eq!(settings.projection.reset_drop_threshold, None);
        assert_eq!(settings.alerts.thresholds, vec![80, 100]);
        assert_eq!(settings.retry.max_attempts, 1);
    }

    #[test]
    fn test_merge_cli() {
        let cli = Config::parse_from([
            "quotacast",
            "--data-file",
            "/tmp/usage.json",
            "-i",
            "60",
            "project",
        ]);
        let mut settings = Settings::default();
        settings.merge_cli(&cli);
        assert_eq!(settings.poll_interval_secs, 60);
        assert_eq!(settings.data_file().path(), std::path::Path::new("/tmp/usage.json"));
        assert!(matches!(cli.command, Command::Project));
    }

    #[test]
    fn test_parse_record_args() {
        let cli = Config::parse_from([
            "quotacast",
            "record",
            "--session",
            "42",
            "--model-week",
            "7.5",
            "--week-reset",
            "2026-03-03T00:00:00Z",
        ]);
        let Command::Record(args) = cli.command else {
            panic!("expected record");
        };
        assert_eq!(args.session, Some(42.0));
        assert_eq!(args.week, None);
        assert_eq!(args.model_week, Some(7.5));
        assert_eq!(args.week_reset.as_deref(), Some("2026-03-03T00:00:00Z"));
    }

    #[test]
    fn test_default_paths_follow_home() {
        temp_env::with_vars(
            [
                ("HOME", Some("/home/quota")),
                ("XDG_CONFIG_HOME", None::<&str>),
            ],
            || {
                let paths = Settings::default_paths();
                assert!(paths.contains(&PathBuf::from("/home/quota/.quotacast.toml")));
                assert!(paths.contains(&PathBuf::from(
                    "/home/quota/.config/quotacast/config.toml"
                )));
            },
        );
    }

    #[test]
    fn test_load_missing_custom_path_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        temp_env::with_var("HOME", Some(dir.path()), || {
            temp_env::with_var_unset("XDG_CONFIG_HOME", || {
                let settings = Settings::load(Some(&missing)).unwrap();
                assert_eq!(settings.poll_interval_secs, 300);
            });
        });
    }

    #[test]
    fn test_load_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_secs = 120\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.poll_interval_secs, 120);
    }
}
