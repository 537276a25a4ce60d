//! Long-format benchmark tables on polars.
//!
//! This crate provides:
//! - DataFrame construction from JSON records, with list-valued columns
//! - The reshaping helpers the PD1 pipeline needs (sorted partitions,
//!   lockstep explosion, keep-last dedup, diagonal concatenation)
//! - CSV persistence, including list-valued cells
//! - A Parquet writer/reader with index metadata, bridged through Arrow

pub mod csv_io;
pub mod error;
pub mod frame;
pub mod json;
pub mod reader;
pub mod writer;

pub use csv_io::{read_csv, write_csv};
pub use error::TableError;
pub use frame::ExplodeStats;
pub use json::{frame_from_records, parse_list_cell, sanitize_json_tokens};
pub use reader::{read_parquet, ParquetTable};
pub use writer::{write_parquet, ParquetOptions};

/// Parquet key-value metadata entry naming the index columns.
pub const INDEX_COLUMNS_KEY: &str = "index_columns";

/// Parquet key-value metadata entry carrying the artifact schema version.
pub const SCHEMA_VERSION_KEY: &str = "mfp.schema_version";
