//! Error type shared by the table store, the filters and feed I/O.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A table the operation needs is not part of the feed.
    #[error("table '{0}' is not present in the feed")]
    MissingTable(String),

    /// A table lacks a column the operation reads.
    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    /// An update would change a table's column set without permission.
    #[error("schema of '{table}' would change from {expected:?} to {found:?}")]
    SchemaViolation {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A free-standing value (config, CLI) could not be parsed.
    #[error("'{value}' is not a valid {kind}")]
    Parse { kind: &'static str, value: String },

    /// A value stored in a table could not be parsed.
    #[error("{table}.{column} row {row}: '{value}' {reason}")]
    InvalidField {
        table: String,
        column: String,
        row: usize,
        value: String,
        reason: String,
    },

    /// Requested ranges or settings are structurally invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("impossible to process csv file '{file}'")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Network error: {0}")]
    Fetch(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn parse(kind: &'static str, value: &str) -> Self {
        Error::Parse {
            kind,
            value: value.to_string(),
        }
    }
}
