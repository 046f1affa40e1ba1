//! TOML-based configuration for the report tool.
//!
//! Every field has a default, so the tool runs without a config file.
//! Example `report.toml`:
//! ```toml
//! data_path = "survey_records.csv"
//! request_path = "report_request.json"
//! snapshot_path = "report_snapshot.json"
//! filtered_csv_path = "report_filtered_rows.csv"
//! preview_rows = 5
//! log_level = "info"
//!
//! [trend]
//! threshold_pct = 2.0
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "report.toml";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// CSV file the records are read from.
    pub data_path: PathBuf,
    /// JSON report-creation payload.
    pub request_path: PathBuf,
    /// Where the generated snapshot is written (and read back from).
    pub snapshot_path: PathBuf,
    /// Export of the filtered, sorted table.
    pub filtered_csv_path: PathBuf,
    pub preview_rows: usize,
    pub log_level: String,
    pub trend: TrendSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("survey_records.csv"),
            request_path: PathBuf::from("report_request.json"),
            snapshot_path: PathBuf::from("report_snapshot.json"),
            filtered_csv_path: PathBuf::from("report_filtered_rows.csv"),
            preview_rows: 5,
            log_level: "info".to_string(),
            trend: TrendSettings::default(),
        }
    }
}

/// Applied when a request's trend config leaves `thresholdPct` unset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrendSettings {
    pub threshold_pct: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            threshold_pct: crate::types::DEFAULT_THRESHOLD_PCT,
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Settings, SettingsError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Settings, SettingsError> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(path)?;
        Settings::from_toml(&text)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=100.0).contains(&self.trend.threshold_pct) {
            return Err(SettingsError::InvalidConfig(format!(
                "trend.threshold_pct must be between 0 and 100, got {}",
                self.trend.threshold_pct
            )));
        }
        if parse_level(&self.log_level).is_none() {
            return Err(SettingsError::InvalidConfig(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        parse_level(&self.log_level).unwrap_or(log::LevelFilter::Info)
    }
}

fn parse_level(s: &str) -> Option<log::LevelFilter> {
    s.trim().parse().ok()
}
