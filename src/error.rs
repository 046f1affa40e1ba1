//! Error type for the I/O edges of the crate.
//!
//! The pipeline itself is infallible; validation problems are reported
//! through `PayloadError` and `TrendConfigError`. `ReportError` covers the
//! outer layer: reading records, reading and writing snapshots, settings.

use crate::settings::SettingsError;
use crate::trend::TrendConfigError;
use crate::validation::PayloadError;
use std::io;
use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to read CSV data: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data source '{0}' has no header row")]
    MissingHeader(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("invalid report request: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("invalid trend configuration: {0}")]
    InvalidTrendConfig(#[from] TrendConfigError),

    #[error("stored snapshot is not a JSON object")]
    UnreadableSnapshot,
}
