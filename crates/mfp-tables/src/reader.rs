//! Parquet reader for frames written by [`crate::write_parquet`].
//!
//! Record batches are concatenated and converted column by column into
//! polars series.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::DataType as ArrowType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use polars::prelude::{Column, DataFrame, NamedFrom, PlSmallStr, Series};
use tracing::debug;

use crate::error::{Result, TableError};
use crate::INDEX_COLUMNS_KEY;

/// A Parquet file loaded into memory.
#[derive(Debug, Clone)]
pub struct ParquetTable {
    pub frame: DataFrame,
    /// Index columns recorded in the file metadata, empty when absent.
    pub index_columns: Vec<String>,
    /// All key-value metadata entries.
    pub metadata: BTreeMap<String, String>,
}

impl ParquetTable {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, column: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| TableError::UnsupportedType {
            column: column.to_string(),
            data_type: array.data_type().to_string(),
        })
}

fn column_series(name: &str, array: &ArrayRef) -> Result<Series> {
    let name: PlSmallStr = name.into();
    let series = match array.data_type() {
        ArrowType::Boolean => {
            let a = downcast::<BooleanArray>(array, &name)?;
            Series::new(name, a.iter().collect::<Vec<_>>())
        }
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32 => {
            let casted = cast(array, &ArrowType::Int64)?;
            let a = downcast::<Int64Array>(&casted, &name)?;
            Series::new(name, a.iter().collect::<Vec<_>>())
        }
        ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 | ArrowType::UInt64 => {
            let casted = cast(array, &ArrowType::Float64)?;
            let a = downcast::<Float64Array>(&casted, &name)?;
            let values: Vec<Option<f64>> = a.iter().map(|v| v.filter(|x| !x.is_nan())).collect();
            Series::new(name, values)
        }
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => {
            let casted = cast(array, &ArrowType::Utf8)?;
            let a = downcast::<StringArray>(&casted, &name)?;
            Series::new(name, a.iter().collect::<Vec<_>>())
        }
        other => {
            return Err(TableError::UnsupportedType {
                column: name.to_string(),
                data_type: other.to_string(),
            })
        }
    };
    Ok(series)
}

/// Read a Parquet file into a [`ParquetTable`].
pub fn read_parquet(path: &Path) -> Result<ParquetTable> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let metadata: BTreeMap<String, String> = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    let index_columns = metadata
        .get(INDEX_COLUMNS_KEY)
        .map(|s| {
            s.split(',')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let schema = builder.schema().clone();
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &batches)?;
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| Ok(column_series(field.name(), array)?.into()))
        .collect::<Result<Vec<Column>>>()?;
    let frame = DataFrame::new(columns)?;

    debug!(path = %path.display(), rows = frame.height(), "read parquet");
    Ok(ParquetTable {
        frame,
        index_columns,
        metadata,
    })
}
