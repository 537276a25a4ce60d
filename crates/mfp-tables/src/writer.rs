//! Parquet writer for frames, bridged through Arrow record batches.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType as ArrowType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use polars::prelude::{DataFrame, DataType, Series};
use tracing::debug;

use crate::error::{Result, TableError};
use crate::frame::{column_names, require_all, series};
use crate::{INDEX_COLUMNS_KEY, SCHEMA_VERSION_KEY};

/// Options for [`write_parquet`].
#[derive(Debug, Clone, Default)]
pub struct ParquetOptions {
    /// Columns forming the table index. They are declared non-nullable and
    /// recorded under [`INDEX_COLUMNS_KEY`].
    pub index_columns: Vec<String>,
    /// Extra key-value metadata.
    pub metadata: Vec<(String, String)>,
}

impl ParquetOptions {
    pub fn indexed_by<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            index_columns: columns.into_iter().map(Into::into).collect(),
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

fn writer_properties(opts: &ParquetOptions) -> WriterProperties {
    let mut kv = vec![
        KeyValue {
            key: INDEX_COLUMNS_KEY.to_string(),
            value: Some(opts.index_columns.join(",")),
        },
        KeyValue {
            key: SCHEMA_VERSION_KEY.to_string(),
            value: Some(mfp_common::SCHEMA_VERSION.to_string()),
        },
    ];
    kv.extend(opts.metadata.iter().map(|(k, v)| KeyValue {
        key: k.clone(),
        value: Some(v.clone()),
    }));
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_key_value_metadata(Some(kv))
        .build()
}

fn arrow_column(name: &str, s: &Series) -> Result<(ArrowType, ArrayRef)> {
    let dtype = s.dtype();
    let column: (ArrowType, ArrayRef) = if *dtype == DataType::Boolean {
        let values: BooleanArray = s.bool()?.into_iter().collect();
        (ArrowType::Boolean, Arc::new(values))
    } else if dtype.is_integer() {
        let cast = s.cast(&DataType::Int64)?;
        let values: Int64Array = cast.i64()?.into_iter().collect();
        (ArrowType::Int64, Arc::new(values))
    } else if dtype.is_float() || *dtype == DataType::Null {
        let cast = s.cast(&DataType::Float64)?;
        let values: Float64Array = cast.f64()?.into_iter().collect();
        (ArrowType::Float64, Arc::new(values))
    } else if *dtype == DataType::String {
        let values: StringArray = s.str()?.into_iter().collect();
        (ArrowType::Utf8, Arc::new(values))
    } else {
        return Err(TableError::UnsupportedType {
            column: name.to_string(),
            data_type: dtype.to_string(),
        });
    };
    Ok(column)
}

/// Write `df` to `path` as a single zstd-compressed row group.
///
/// Integer columns are stored as Int64 and floats as Float64. Index columns
/// must exist and hold no nulls.
pub fn write_parquet(df: &DataFrame, path: &Path, opts: &ParquetOptions) -> Result<()> {
    require_all(df, &opts.index_columns)?;

    let mut fields = Vec::with_capacity(df.width());
    let mut arrays = Vec::with_capacity(df.width());
    for name in column_names(df) {
        let (data_type, array) = arrow_column(&name, series(df, &name)?)?;
        let nullable = !opts.index_columns.contains(&name);
        fields.push(Field::new(name, data_type, nullable));
        arrays.push(array);
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new_with_options(
        schema.clone(),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(df.height())),
    )?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(writer_properties(opts)))?;
    writer.write(&batch)?;
    writer.close()?;
    debug!(path = %path.display(), rows = df.height(), "wrote parquet");
    Ok(())
}
