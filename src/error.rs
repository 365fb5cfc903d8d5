//! Error types for paired-stats.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by any stage of the analysis pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file is not valid CSV.
    #[error("Failed to parse CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from the input header.
    #[error("Column '{column}' not found. Columns found: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    /// A required column holds a cell that is not a number.
    #[error("Non-numeric value '{value}' in column '{column}' (row {row})")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    /// No complete records remain after dropping missing values.
    #[error("No complete rows remain after dropping missing values")]
    EmptySample,

    /// A statistical test was given fewer observations than it needs.
    #[error("{test} requires at least {min} observations, got {got}")]
    TooFewSamples {
        test: &'static str,
        min: usize,
        got: usize,
    },

    /// The data is degenerate for a statistical test (e.g. zero variance).
    #[error("{test}: {reason}")]
    Degenerate { test: &'static str, reason: String },

    /// Distribution parameters were rejected.
    #[error("Invalid distribution parameters: {0}")]
    Distribution(String),

    /// Drawing or encoding the figure failed.
    #[error("Failed to render figure: {0}")]
    Render(String),

    /// Configuration values are out of range.
    #[error("Invalid config: {0}")]
    Config(String),
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, AnalysisError>;
