//! Error types for the benchmark tools.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for benchmark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the benchmark tools.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid column schema: {0}")]
    InvalidColumnSchema(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    // Data errors (20-29)
    #[error("no archive found at {}", path.display())]
    ArchiveNotFound { path: PathBuf },

    #[error("malformed record in {} line {line}: {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("missing column '{column}' ({context})")]
    MissingColumn { column: String, context: String },

    #[error("table error: {0}")]
    Table(String),

    // Processing errors (30-39)
    #[error("no configurations survived the divergence filter for {dataset}")]
    EmptyFilterResult { dataset: String },

    #[error("re-indexing failed: {0}")]
    Reindex(String),

    // Query errors (40-49)
    #[error("unknown benchmark: {0}")]
    UnknownBenchmark(String),

    #[error("configuration not found in table: {0}")]
    ConfigNotFound(String),

    #[error("fidelity {fidelity} outside of [{start}, {end}]")]
    FidelityOutOfRange { fidelity: i64, start: i64, end: i64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not enough results: {0}")]
    InsufficientResults(String),

    // Download errors (50-59)
    #[error("download of {source_name} failed: {reason}")]
    DownloadFailed { source_name: String, reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidColumnSchema(_) => 11,
            Error::SchemaValidation(_) => 12,
            Error::ArchiveNotFound { .. } => 20,
            Error::MalformedRecord { .. } => 21,
            Error::MissingColumn { .. } => 22,
            Error::Table(_) => 23,
            Error::EmptyFilterResult { .. } => 30,
            Error::Reindex(_) => 31,
            Error::UnknownBenchmark(_) => 40,
            Error::ConfigNotFound(_) => 41,
            Error::FidelityOutOfRange { .. } => 42,
            Error::InvalidConfig(_) => 43,
            Error::InsufficientResults(_) => 44,
            Error::DownloadFailed { .. } => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Shorthand for a missing-column error.
    pub fn missing_column(column: impl Into<String>, context: impl Into<String>) -> Self {
        Error::MissingColumn {
            column: column.into(),
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_domain() {
        assert_eq!(Error::Config("x".into()).code() / 10, 1);
        assert_eq!(
            Error::ArchiveNotFound {
                path: PathBuf::from("a.jsonl.gz")
            }
            .code()
                / 10,
            2
        );
        assert_eq!(
            Error::EmptyFilterResult {
                dataset: "d".into()
            }
            .code()
                / 10,
            3
        );
        assert_eq!(Error::ConfigNotFound("c".into()).code() / 10, 4);
    }

    #[test]
    fn archive_message_includes_path() {
        let err = Error::ArchiveNotFound {
            path: PathBuf::from("/data/raw/pd1_matched_phase0_results.jsonl.gz"),
        };
        assert!(err
            .to_string()
            .contains("pd1_matched_phase0_results.jsonl.gz"));
    }
}
