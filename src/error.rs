//! Error types for Rusty-Pipeline
//!
//! Only structural problems are errors. A single missing data point is never an
//! error: it is carried through evaluation as a missing value instead.

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for Rusty-Pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cycle detected in term graph: {}", path.join(" -> "))]
    CycleError { path: Vec<String> },

    #[error("Data unavailable for column {column}: {reason}")]
    DataUnavailableError { column: String, reason: String },

    #[error("Type mismatch in {term}: expected {expected}, found {found}")]
    TypeMismatchError {
        term: String,
        expected: String,
        found: String,
    },

    #[error("Unknown term: {0}")]
    UnknownTerm(String),

    #[error("Invalid term: {0}")]
    InvalidTerm(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Calendar error: {0}")]
    CalendarError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Export error: {0}")]
    ExportError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl PipelineError {
    /// Whether this error was raised before any data was touched
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PipelineError::CycleError { .. }
                | PipelineError::TypeMismatchError { .. }
                | PipelineError::UnknownTerm(_)
                | PipelineError::InvalidTerm(_)
        )
    }
}

/// Result type alias for Rusty-Pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
