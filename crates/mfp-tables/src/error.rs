//! Error types for table operations.

use thiserror::Error;

/// Errors that can occur while building, reading, or writing tables.
#[derive(Error, Debug)]
pub enum TableError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// DataFrame operation or CSV error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Arrow conversion error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet encoding/decoding error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Column referenced but absent
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// A list cell could not be parsed back into a list
    #[error("column '{column}' row {row}: cannot parse list cell: {reason}")]
    ListCell {
        column: String,
        row: usize,
        reason: String,
    },

    /// Column holds a type the reader cannot map
    #[error("column '{column}' has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: String },
}

/// Result type alias for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

impl From<TableError> for mfp_common::Error {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Io(e) => mfp_common::Error::Io(e),
            TableError::UnknownColumn(column) => {
                mfp_common::Error::missing_column(column, "table operation")
            }
            other => mfp_common::Error::Table(other.to_string()),
        }
    }
}
