//! CSV persistence for frames.
//!
//! List cells are written as JSON arrays and read back through
//! [`crate::json::parse_list_cell`], which also accepts stringified Python
//! lists.

use std::fs::{self, File};
use std::path::Path;

use polars::prelude::*;
use serde_json::Value as Json;
use tracing::debug;

use crate::error::{Result, TableError};
use crate::frame::{column_names, float_list_series, series};
use crate::json::parse_list_cell;

fn list_json(inner: &Series) -> Result<String> {
    let items: Vec<Json> = match inner.dtype() {
        DataType::String => inner
            .str()?
            .into_iter()
            .map(|v| v.map_or(Json::Null, |s| Json::String(s.to_string())))
            .collect(),
        DataType::Boolean => inner
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Json::Null, Json::Bool))
            .collect(),
        _ => inner
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| {
                v.and_then(serde_json::Number::from_f64)
                    .map_or(Json::Null, Json::Number)
            })
            .collect(),
    };
    Ok(Json::Array(items).to_string())
}

/// Copy of `df` with list columns rendered as JSON text and untyped
/// all-null columns as strings, which is what the CSV writer accepts.
fn encode_for_csv(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();
    for name in column_names(df) {
        let s = series(df, &name)?;
        match s.dtype() {
            DataType::List(_) => {
                let text = s
                    .list()?
                    .into_iter()
                    .map(|cell| cell.map(|inner| list_json(&inner)).transpose())
                    .collect::<Result<Vec<Option<String>>>>()?;
                out.with_column(Series::new(name.as_str().into(), text))?;
            }
            DataType::Null => {
                out.with_column(s.cast(&DataType::String)?)?;
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Write `df` to `path` with a header row, overwriting any existing file.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    if df.width() == 0 {
        return Ok(());
    }
    let mut encoded = encode_for_csv(df)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut encoded)?;
    debug!(path = %path.display(), rows = df.height(), "wrote csv");
    Ok(())
}

/// Read a CSV written by [`write_csv`].
///
/// Column types are inferred from the whole file. Cells of columns for which
/// `is_list` returns true are parsed into `List(Float64)`.
pub fn read_csv(path: &Path, is_list: impl Fn(&str) -> bool) -> Result<DataFrame> {
    if fs::metadata(path)?.len() == 0 {
        return Ok(DataFrame::empty());
    }
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    for name in column_names(&df) {
        if !is_list(&name) {
            continue;
        }
        let text = series(&df, &name)?.cast(&DataType::String)?;
        let cells = text
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(cell) => parse_list_cell(cell).map_err(|e| TableError::ListCell {
                    column: name.clone(),
                    row,
                    reason: e.to_string(),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        df.with_column(float_list_series(&name, cells)?)?;
    }
    debug!(path = %path.display(), rows = df.height(), "read csv");
    Ok(df)
}
