//! DataFrame helpers shared by the pipeline stages.

use polars::prelude::*;

use crate::error::{Result, TableError};

/// Bookkeeping from [`explode_lockstep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplodeStats {
    /// Source rows whose exploded lists disagreed in length.
    pub misaligned_rows: usize,
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|n| n.to_string()).collect()
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

fn strs<S: AsRef<str>>(names: &[S]) -> Vec<&str> {
    names.iter().map(|n| n.as_ref()).collect()
}

fn cols(names: &[&str]) -> Vec<Expr> {
    names.iter().map(|n| col(*n)).collect()
}

pub fn require_all<S: AsRef<str>>(df: &DataFrame, names: &[S]) -> Result<()> {
    match strs(names).into_iter().find(|n| !has_column(df, n)) {
        Some(missing) => Err(TableError::UnknownColumn(missing.to_string())),
        None => Ok(()),
    }
}

pub fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(Column::as_materialized_series)
        .map_err(|_| TableError::UnknownColumn(name.to_string()))
}

/// Column cast to floats. NaN reads as null.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let cast = series(df, name)?.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let cast = series(df, name)?.cast(&DataType::Int64)?;
    Ok(cast.i64()?.into_iter().collect())
}

pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let cast = series(df, name)?.cast(&DataType::String)?;
    Ok(cast.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// `List(Float64)` series from per-row cells; `None` is a null list.
pub fn float_list_series(name: &str, cells: Vec<Option<Vec<Option<f64>>>>) -> Result<Series> {
    let list: ListChunked = cells
        .into_iter()
        .map(|cell| cell.map(|values| Series::new(PlSmallStr::EMPTY, values)))
        .collect();
    Ok(list
        .into_series()
        .cast(&DataType::List(Box::new(DataType::Float64)))?
        .with_name(name.into()))
}

/// Float lists of one column, row by row.
pub fn float_lists(df: &DataFrame, name: &str) -> Result<Vec<Option<Vec<Option<f64>>>>> {
    let cast = series(df, name)?.cast(&DataType::List(Box::new(DataType::Float64)))?;
    cast.list()?
        .into_iter()
        .map(|cell| {
            cell.map(|s| -> Result<Vec<Option<f64>>> { Ok(s.f64()?.into_iter().collect()) })
                .transpose()
        })
        .collect()
}

/// Replace each list of a float-list column with `f` of its elements.
pub fn map_float_lists(
    mut df: DataFrame,
    name: &str,
    f: impl Fn(&[Option<f64>]) -> Vec<Option<f64>>,
) -> Result<DataFrame> {
    let mapped = float_lists(&df, name)?
        .into_iter()
        .map(|cell| cell.map(|values| f(&values)))
        .collect();
    df.with_column(float_list_series(name, mapped)?)?;
    Ok(df)
}

/// Copy of `df` without `names`; names that are absent are ignored.
pub fn without<S: AsRef<str>>(df: &DataFrame, names: &[S]) -> Result<DataFrame> {
    let names = strs(names);
    let keep: Vec<String> = column_names(df)
        .into_iter()
        .filter(|c| !names.contains(&c.as_str()))
        .collect();
    Ok(df.select(keep)?)
}

/// Copy of `df` with `first` moved to the front, in that order.
pub fn front<S: AsRef<str>>(df: &DataFrame, first: &[S]) -> Result<DataFrame> {
    require_all(df, first)?;
    let first = strs(first);
    let order: Vec<String> = first
        .iter()
        .map(|c| c.to_string())
        .chain(
            column_names(df)
                .into_iter()
                .filter(|c| !first.contains(&c.as_str())),
        )
        .collect();
    Ok(df.select(order)?)
}

/// Stack frames, unioning their columns in first-seen order. Columns a
/// frame lacks are null in its rows and mismatched types are widened.
pub fn concat_diagonal(frames: Vec<DataFrame>) -> Result<DataFrame> {
    if frames.is_empty() {
        return Ok(DataFrame::empty());
    }
    let lazy: Vec<LazyFrame> = frames.into_iter().map(|df| df.lazy()).collect();
    let args = UnionArgs {
        to_supertypes: true,
        ..Default::default()
    };
    Ok(concat_lf_diagonal(lazy, args)?.collect()?)
}

/// Rows of `df` where none of `keys` is null or NaN.
pub fn drop_missing<S: AsRef<str>>(df: DataFrame, keys: &[S]) -> Result<DataFrame> {
    require_all(&df, keys)?;
    let mut predicate: Option<Expr> = None;
    for key in strs(keys) {
        let mut present = col(key).is_not_null();
        if series(&df, key)?.dtype().is_float() {
            present = present.and(col(key).is_not_nan());
        }
        predicate = Some(match predicate {
            Some(p) => p.and(present),
            None => present,
        });
    }
    match predicate {
        Some(p) => Ok(df.lazy().filter(p).collect()?),
        None => Ok(df),
    }
}

/// Split `df` into one frame per distinct value of `keys`, in ascending key
/// order. Rows keep their relative order within a partition.
pub fn partition_sorted<S: AsRef<str>>(df: &DataFrame, keys: &[S]) -> Result<Vec<DataFrame>> {
    require_all(df, keys)?;
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    let keys = strs(keys);
    let sorted = df
        .clone()
        .lazy()
        .sort_by_exprs(cols(&keys), SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;
    Ok(sorted.partition_by_stable(keys, true)?)
}

/// Keep the last row of every distinct `keys` combination, in the order
/// those last rows appear.
pub fn dedup_keep_last<S: AsRef<str>>(df: DataFrame, keys: &[S]) -> Result<DataFrame> {
    require_all(&df, keys)?;
    Ok(df
        .lazy()
        .unique_stable_generic(Some(cols(&strs(keys))), UniqueKeepStrategy::Last)
        .collect()?)
}

/// Explode list columns in lockstep.
///
/// Every row becomes one row per list element, with the other columns
/// repeated. Within a row, lists shorter than the longest are padded with
/// nulls and counted in [`ExplodeStats::misaligned_rows`]; a null list next
/// to non-empty ones is padded the same way. Rows whose lists are all empty
/// or null become a single row of nulls.
pub fn explode_lockstep<S: AsRef<str>>(
    mut df: DataFrame,
    names: &[S],
) -> Result<(DataFrame, ExplodeStats)> {
    require_all(&df, names)?;
    let names = strs(names);
    let lists = names
        .iter()
        .map(|n| Ok(series(&df, n)?.list()?.clone()))
        .collect::<Result<Vec<ListChunked>>>()?;
    let cells: Vec<Vec<Option<Series>>> = lists.iter().map(|l| l.into_iter().collect()).collect();

    let mut stats = ExplodeStats::default();
    let mut padded: Vec<Vec<Option<Series>>> = vec![Vec::with_capacity(df.height()); names.len()];
    for row in 0..df.height() {
        let lengths: Vec<usize> = cells
            .iter()
            .filter_map(|c| c[row].as_ref().map(|s| s.len()))
            .collect();
        let n = lengths.iter().copied().max().unwrap_or(0);
        if lengths.iter().any(|&l| l != n) {
            stats.misaligned_rows += 1;
        }
        for (idx, column) in cells.iter().enumerate() {
            let cell = match &column[row] {
                Some(s) if s.len() < n => Some(s.extend_constant(AnyValue::Null, n - s.len())?),
                Some(s) => Some(s.clone()),
                None if n > 0 => {
                    let inner = lists[idx].inner_dtype().clone();
                    Some(Series::full_null(PlSmallStr::EMPTY, n, &inner))
                }
                None => None,
            };
            padded[idx].push(cell);
        }
    }

    for ((name, list), cells) in names.iter().zip(&lists).zip(padded) {
        let dtype = DataType::List(Box::new(list.inner_dtype().clone()));
        let rebuilt: ListChunked = cells.into_iter().collect();
        df.with_column(rebuilt.into_series().cast(&dtype)?.with_name((*name).into()))?;
    }

    Ok((df.lazy().explode(cols(&names)).collect()?, stats))
}
