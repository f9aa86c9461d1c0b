//! Error types for whole-upload rejection and simulation refusals.
//!
//! Single malformed rows never surface here; they are counted and dropped
//! by the normalizer. These errors mean the caller must not render a report.

use thiserror::Error;

/// An uploaded extract that cannot be turned into a table at all.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("no header row found in upload")]
    MissingHeader,

    #[error("no column in the header row matches required field '{0}'")]
    MissingColumn(String),

    #[error("delimited text could not be parsed: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet could not be read: {0}")]
    Spreadsheet(String),

    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

impl From<calamine::Error> for IngestError {
    fn from(err: calamine::Error) -> Self {
        IngestError::Spreadsheet(err.to_string())
    }
}

/// Reasons the coverage simulation declines to run. The session is left untouched.
#[derive(Error, Debug, PartialEq)]
pub enum SimulationError {
    #[error("no scheduled points match the current filters")]
    NothingScheduled,

    #[error("current coverage {current:.2}% is already at or above the {target:.2}% target")]
    AlreadyAtTarget { current: f64, target: f64 },

    #[error("target ratio must be within (0, 1], got {0}")]
    InvalidTarget(f64),
}
