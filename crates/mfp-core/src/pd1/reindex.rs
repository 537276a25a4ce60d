//! Re-index tabular tables by `(id, step)` and persist them as Parquet.
//!
//! Epoch-level tables get one file, `{stem}.parquet`. Sub-epoch tables are
//! renumbered per configuration and written once per stride as
//! `{stem}-{k}.parquet`, keeping `n / k` evenly spaced steps.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mfp_common::{Error, Result};
use mfp_config::PipelineConfig;
use mfp_tables::frame::{front, i64_values, require_all, without};
use mfp_tables::{read_csv, write_parquet, ParquetOptions, TableError};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Synthesized configuration id column.
pub const ID_COLUMN: &str = "id";
/// Copy of the step values before re-indexing.
pub const ORIGINAL_STEPS_COLUMN: &str = "original_steps";

const TABULAR_SUFFIX: &str = "_tabular.csv";

/// What re-indexing one tabular table produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub source: PathBuf,
    pub configs: usize,
    /// Configurations dropped for not having the modal number of steps.
    pub dropped_configs: usize,
    pub sub_epoch: bool,
    pub written: Vec<PathBuf>,
}

/// Re-index the tabular CSV at `path`.
///
/// Returns `Ok(None)` when `path` is not a tabular table or when no
/// configuration survives indexing; the latter is logged and skipped.
pub fn reindex_tabular(path: &Path, config: &PipelineConfig) -> Result<Option<ReindexReport>> {
    let Some(stem) = tabular_stem(path) else {
        debug!(path = %path.display(), "not a tabular table, skipping");
        return Ok(None);
    };

    match reindex(path, &stem, config) {
        Err(Error::Reindex(reason)) => {
            warn!(path = %path.display(), %reason, "skipping re-index");
            Ok(None)
        }
        other => other.map(Some),
    }
}

fn tabular_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.ends_with(TABULAR_SUFFIX)
        .then(|| name.trim_end_matches(".csv").to_string())
}

fn reindex(path: &Path, stem: &str, config: &PipelineConfig) -> Result<ReindexReport> {
    let step = config.rules.step_column.as_str();
    let hyperparameters = config.columns.hyperparameters();

    let frame = read_csv(path, |_| false)?;
    require_all(&frame, &hyperparameters)?;
    require_all(&frame, &[step])?;

    let (frame, ids) = assign_ids(frame, &hyperparameters)?;
    let frame = frame
        .lazy()
        .with_column(col(step).alias(ORIGINAL_STEPS_COLUMN))
        .collect()
        .map_err(TableError::from)?;

    let sub_epoch = config.rules.is_sub_epoch(stem);
    info!(
        table = stem,
        configs = ids.configs,
        dropped_configs = ids.dropped,
        steps = ids.steps,
        sub_epoch,
        "re-indexing tabular table"
    );

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let written = if sub_epoch {
        write_sub_epoch(frame, step, &config.rules.strides, ids.steps, dir, stem)?
    } else {
        vec![write_epoch_level(frame, step, dir, stem)?]
    };

    Ok(ReindexReport {
        source: path.to_path_buf(),
        configs: ids.configs,
        dropped_configs: ids.dropped,
        sub_epoch,
        written,
    })
}

/// Most frequent value; ties go to the smallest.
fn modal_count(counts: impl IntoIterator<Item = usize>) -> Option<usize> {
    let mut freq: BTreeMap<usize, usize> = BTreeMap::new();
    for c in counts {
        *freq.entry(c).or_default() += 1;
    }
    let best = freq.values().copied().max()?;
    freq.into_iter().find(|(_, f)| *f == best).map(|(c, _)| c)
}

/// Outcome of [`assign_ids`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdAssignment {
    configs: usize,
    dropped: usize,
    /// Rows per surviving configuration.
    steps: usize,
}

const ROW: &str = "__row";
const STEP_COUNT: &str = "__steps";
const POSITION: &str = "__position";

fn rank(expr: Expr, method: RankMethod) -> Expr {
    expr.rank(
        RankOptions {
            method,
            descending: false,
        },
        None,
    )
    .cast(DataType::Int64)
}

/// Keep configurations with the modal step count and number them `1..=n`
/// in first-occurrence order.
fn assign_ids(frame: DataFrame, hyperparameters: &[String]) -> Result<(DataFrame, IdAssignment)> {
    let by: Vec<Expr> = hyperparameters.iter().map(|h| col(h.as_str())).collect();
    let counts = frame
        .clone()
        .lazy()
        .group_by_stable(by.clone())
        .agg([len().alias(STEP_COUNT)])
        .collect()
        .map_err(TableError::from)?;
    let counts: Vec<usize> = i64_values(&counts, STEP_COUNT)?
        .into_iter()
        .flatten()
        .map(|c| c as usize)
        .collect();
    let steps = modal_count(counts.iter().copied())
        .ok_or_else(|| Error::Reindex("table has no configurations".to_string()))?;
    let configs = counts.iter().filter(|&&c| c == steps).count();
    let dropped = counts.len() - configs;
    if dropped > 0 {
        info!(dropped, steps, "dropped configurations with incomplete trajectories");
    }

    let frame = frame
        .lazy()
        .with_row_index(ROW, None)
        .filter(len().over(by.clone()).cast(DataType::Int64).eq(lit(steps as i64)))
        .with_column(rank(col(ROW).min().over(by), RankMethod::Dense).alias(ID_COLUMN))
        .collect()
        .map_err(TableError::from)?;
    Ok((
        without(&frame, &[ROW])?,
        IdAssignment {
            configs,
            dropped,
            steps,
        },
    ))
}

fn parquet_options(step: &str) -> ParquetOptions {
    ParquetOptions::indexed_by([ID_COLUMN, step])
}

/// Map every step to its 1-based position among configuration 1's steps.
fn write_epoch_level(frame: DataFrame, step: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
    let positions = frame
        .clone()
        .lazy()
        .filter(col(ID_COLUMN).eq(lit(1i64)))
        .select([col(step)])
        .unique_stable_generic(Some(vec![col(step)]), UniqueKeepStrategy::First)
        .with_row_index(POSITION, Some(1))
        .collect()
        .map_err(TableError::from)?;

    let before = frame.height();
    let mapped = frame
        .lazy()
        .with_row_index(ROW, None)
        .join(
            positions.lazy(),
            [col(step)],
            [col(step)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort_by_exprs([col(ROW)], SortMultipleOptions::default())
        .with_column(col(POSITION).cast(DataType::Int64).alias(step))
        .collect()
        .map_err(TableError::from)?;
    let unmapped = before - mapped.height();
    if unmapped > 0 {
        warn!(
            table = stem,
            rows = unmapped,
            "dropped rows whose step is not recorded for the first configuration"
        );
    }
    let table = front(&without(&mapped, &[ROW, POSITION])?, &[ID_COLUMN, step])?;

    let path = dir.join(format!("{stem}.parquet"));
    write_parquet(&table, &path, &parquet_options(step))?;
    info!(path = %path.display(), rows = table.height(), "wrote parquet");
    Ok(path)
}

/// Number each configuration's rows `1..=n` in row order.
fn renumber_per_config(frame: DataFrame, step: &str) -> Result<DataFrame> {
    let frame = frame
        .lazy()
        .with_row_index(ROW, None)
        .with_column(rank(col(ROW), RankMethod::Ordinal).over([col(ID_COLUMN)]).alias(step))
        .collect()
        .map_err(TableError::from)?;
    Ok(without(&frame, &[ROW])?)
}

/// Steps kept at stride `k` out of `n`: `num = n / k` points spaced evenly
/// over `1..=n`, truncated to integers. Both ends are kept once `num >= 2`.
fn stride_steps(n: usize, k: usize) -> Vec<i64> {
    let num = n / k.max(1);
    match num {
        0 => Vec::new(),
        1 => vec![1],
        _ => {
            let delta = (n - 1) as f64 / (num - 1) as f64;
            let mut steps: Vec<i64> = (0..num).map(|i| (1.0 + i as f64 * delta) as i64).collect();
            steps[num - 1] = n as i64;
            steps
        }
    }
}

fn write_sub_epoch(
    frame: DataFrame,
    step: &str,
    strides: &[u32],
    steps: usize,
    dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>> {
    let frame = renumber_per_config(frame, step)?;

    let mut written = Vec::with_capacity(strides.len());
    for &k in strides {
        let k = k.max(1);
        let retained = stride_steps(steps, k as usize);
        debug!(table = stem, stride = k, ?retained, "sub-epoch steps");
        let table = frame
            .clone()
            .lazy()
            .filter(col(step).is_in(lit(Series::new("retained".into(), retained))))
            .collect()
            .map_err(TableError::from)?;
        let table = renumber_per_config(table, step)?
            .lazy()
            .with_column(rank(col(ID_COLUMN), RankMethod::Dense).alias(ID_COLUMN))
            .collect()
            .map_err(TableError::from)?;
        let table = front(&table, &[ID_COLUMN, step])?;

        let path = dir.join(format!("{stem}-{k}.parquet"));
        write_parquet(&table, &path, &parquet_options(step))?;
        info!(path = %path.display(), stride = k, rows = table.height(), "wrote parquet");
        written.push(path);
    }
    Ok(written)
}
