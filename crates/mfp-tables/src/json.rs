//! Building frames from JSON records and parsing JSON list cells.

use std::borrow::Cow;

use polars::prelude::*;
use serde_json::{Map, Value as Json};

use crate::error::Result;
use crate::frame::float_list_series;

/// Frame from JSON objects. Columns appear in first-seen order and fields
/// absent from a record are null.
///
/// Columns for which `is_list` returns true become `List(Float64)`; a scalar
/// in such a column is kept as a one-element list. Other columns take the
/// narrowest type covering their values: booleans, integers, floats, or
/// strings. Columns mixing kinds fall back to their JSON text.
pub fn frame_from_records(
    records: &[Map<String, Json>],
    is_list: impl Fn(&str) -> bool,
) -> Result<DataFrame> {
    let mut names: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let columns = names
        .iter()
        .map(|name| {
            let values: Vec<&Json> = records
                .iter()
                .map(|r| r.get(*name).unwrap_or(&Json::Null))
                .collect();
            let series = if is_list(name) {
                list_column(name, &values)?
            } else {
                scalar_column(name, &values)
            };
            Ok(series.into())
        })
        .collect::<Result<Vec<Column>>>()?;
    Ok(DataFrame::new(columns)?)
}

fn list_column(name: &str, values: &[&Json]) -> Result<Series> {
    let cells = values
        .iter()
        .map(|v| match v {
            Json::Null => None,
            Json::Array(items) => Some(items.iter().map(Json::as_f64).collect()),
            scalar => Some(vec![scalar.as_f64()]),
        })
        .collect();
    float_list_series(name, cells)
}

fn scalar_column(name: &str, values: &[&Json]) -> Series {
    let (mut bools, mut ints, mut floats, mut strings, mut other) = (0, 0, 0, 0, 0);
    for v in values {
        match v {
            Json::Null => {}
            Json::Bool(_) => bools += 1,
            Json::Number(n) if n.as_i64().is_some() => ints += 1,
            Json::Number(_) => floats += 1,
            Json::String(_) => strings += 1,
            _ => other += 1,
        }
    }
    let name: PlSmallStr = name.into();
    let present = bools + ints + floats + strings + other;
    if present == 0 {
        Series::full_null(name, values.len(), &DataType::Null)
    } else if bools == present {
        Series::new(name, values.iter().map(|v| v.as_bool()).collect::<Vec<_>>())
    } else if ints == present {
        Series::new(name, values.iter().map(|v| v.as_i64()).collect::<Vec<_>>())
    } else if ints + floats == present {
        Series::new(name, values.iter().map(|v| v.as_f64()).collect::<Vec<_>>())
    } else {
        let text: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Json::Null => None,
                Json::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Series::new(name, text)
    }
}

/// Parse a list-valued cell such as `[0.1, None, 0.3]` into floats.
///
/// `None`, `NaN`, `nan` and infinity tokens are read as null and non-numeric
/// elements are null. An empty cell is a null list; a cell holding valid
/// JSON that is not an array becomes a one-element list.
pub fn parse_list_cell(cell: &str) -> std::result::Result<Option<Vec<Option<f64>>>, serde_json::Error> {
    if cell.is_empty() {
        return Ok(None);
    }
    let json: Json = serde_json::from_str(&sanitize_json_tokens(cell))?;
    Ok(match json {
        Json::Null => None,
        Json::Array(items) => Some(items.iter().map(Json::as_f64).collect()),
        scalar => Some(vec![scalar.as_f64()]),
    })
}

/// Bare words that producers write where JSON expects `null`. A leading `-`
/// is accepted on any of them, which covers `-Infinity`.
const NULL_TOKENS: [&str; 4] = ["NaN", "nan", "Infinity", "None"];

/// Replace non-standard JSON literals outside of strings with `null`.
///
/// Python-side producers emit `NaN`, `Infinity` and `-Infinity`, and
/// stringified Python lists carry `None`. None of these are valid JSON.
/// Any other bare word is left alone so the JSON parser rejects it.
pub fn sanitize_json_tokens(input: &str) -> Cow<'_, str> {
    let needs_work = NULL_TOKENS.iter().any(|t| input.contains(t));
    if !needs_work {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut copied_to = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        let starts_word = b.is_ascii_alphabetic()
            || (b == b'-' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_alphabetic());
        if starts_word {
            let start = i;
            let mut end = if b == b'-' { i + 1 } else { i };
            while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
                end += 1;
            }
            let word = input[start..end].trim_start_matches('-');
            if NULL_TOKENS.contains(&word) {
                out.push_str(&input[copied_to..start]);
                out.push_str("null");
                copied_to = end;
            }
            i = end;
            continue;
        }
        i += 1;
    }
    out.push_str(&input[copied_to..]);
    Cow::Owned(out)
}
