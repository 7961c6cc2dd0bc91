//! Error types for the data-loader crate.
//!
//! Covers everything that can go wrong between a raw CSV export (or a
//! persisted history file) and a validated `HistoryEntry`.

use thiserror::Error;

use crate::types::MovieId;

/// Errors that can occur while importing or persisting viewing history
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// I/O error occurred while reading or writing a file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The persisted history file is not valid JSON for a `HistoryStore`
    #[error("Invalid history file: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The CSV header matched none of the supported export formats
    #[error("Unrecognized CSV format (header: {header})")]
    UnrecognizedFormat { header: String },

    /// The CSV had no header line at all
    #[error("CSV input is empty")]
    EmptyInput,

    /// Line in a CSV export couldn't be parsed
    ///
    /// Stores enough context for the caller to point at the offending row.
    #[error("Parse error at line {line} ({format}): {reason}")]
    ParseError {
        format: String,
        line: usize,
        reason: String,
    },

    /// A data field had an invalid value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Rating outside the canonical 0-10 scale
    #[error("Rating {rating} for movie {movie_id} is outside the 0-10 scale")]
    RatingOutOfRange { movie_id: MovieId, rating: f32 },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
