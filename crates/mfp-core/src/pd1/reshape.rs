//! Per-dataset reshaping of the assembled table into long format.

use std::fmt;
use std::path::{Path, PathBuf};

use mfp_common::{DatasetKey, Error, Result};
use mfp_config::{CostFilterKind, PipelineConfig};
use mfp_math::running_sum;
use mfp_tables::frame::{
    dedup_keep_last, drop_missing, explode_lockstep, i64_values, map_float_lists,
    partition_sorted, require_all, series, str_values, without,
};
use mfp_tables::{write_csv, TableError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::assemble::{MATCHED_COLUMN, PHASE_COLUMN};

/// Which table family a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// Deduplicated tables mixing every matched/phase slice.
    Surrogate,
    /// One matched/phase slice per dataset, re-indexed for lookups.
    Tabular,
}

impl ProcessMode {
    pub fn from_tabular_flag(tabular: bool) -> Self {
        if tabular {
            ProcessMode::Tabular
        } else {
            ProcessMode::Surrogate
        }
    }

    /// File name of the table written for `key`.
    pub fn file_name(self, key: &DatasetKey) -> String {
        match self {
            ProcessMode::Surrogate => key.surrogate_file(),
            ProcessMode::Tabular => key.tabular_file(),
        }
    }
}

impl fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessMode::Surrogate => write!(f, "surrogate"),
            ProcessMode::Tabular => write!(f, "tabular"),
        }
    }
}

/// A per-dataset table written by [`reshape_all`].
#[derive(Debug, Clone, Serialize)]
pub struct GroupTable {
    pub key: DatasetKey,
    pub path: PathBuf,
    pub rows: usize,
}

/// Split `full` by dataset group, reshape every group and write one CSV per
/// group into `out_dir`. Groups are visited in ascending key order and
/// `on_written` runs after each table is on disk. Rows with an incomplete
/// group key belong to no group and are skipped.
pub fn reshape_all(
    full: &DataFrame,
    mode: ProcessMode,
    config: &PipelineConfig,
    out_dir: &Path,
    mut on_written: impl FnMut(&GroupTable) -> Result<()>,
) -> Result<Vec<GroupTable>> {
    let keys = &config.rules.group_columns;
    let keyed = drop_missing(full.clone(), keys)?;
    if keyed.height() < full.height() {
        warn!(
            rows = full.height() - keyed.height(),
            "rows without a complete group key skipped"
        );
    }

    let mut written = Vec::new();
    for group in partition_sorted(&keyed, keys)? {
        let key = dataset_key(&group, keys)?;
        info!(group = %key, rows = group.height(), "reshaping group");
        let table = reshape_group(&key, group, mode, config)?;

        let path = out_dir.join(mode.file_name(&key));
        write_csv(&table, &path)?;
        info!(path = %path.display(), rows = table.height(), mode = %mode, "wrote table");
        let table = GroupTable {
            key,
            path,
            rows: table.height(),
        };
        on_written(&table)?;
        written.push(table);
    }
    Ok(written)
}

/// Key of a partition, read from its first row.
fn dataset_key(group: &DataFrame, columns: &[String]) -> Result<DatasetKey> {
    let bad = || Error::Table(format!("cannot build a dataset key from columns {columns:?}"));
    let [dataset, model, batch_size] = columns else {
        return Err(bad());
    };
    let first_str = |c: &str| -> Result<String> {
        str_values(group, c)?.into_iter().next().flatten().ok_or_else(bad)
    };
    let batch_size = i64_values(group, batch_size)?
        .into_iter()
        .next()
        .flatten()
        .and_then(|b| u32::try_from(b).ok())
        .ok_or_else(bad)?;
    Ok(DatasetKey::new(
        first_str(dataset.as_str())?,
        first_str(model.as_str())?,
        batch_size,
    ))
}

/// Reshape one dataset group into its long table.
pub fn reshape_group(
    key: &DatasetKey,
    frame: DataFrame,
    mode: ProcessMode,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    let rules = &config.rules;
    let name = key.to_string();

    let mut frame = frame;
    let mut explode = config.columns.list_columns();
    if rules.is_transformer(&key.dataset) {
        explode.retain(|c| *c != rules.test_error_column);
        frame = without(&frame, &[&rules.test_error_column])?;
    }
    require_all(&frame, &explode)?;

    if mode == ProcessMode::Surrogate && rules.remaps_steps(&key.dataset) {
        frame = map_float_lists(frame, &rules.step_column, renumber_steps)?;
    }
    frame = map_float_lists(frame, &rules.cost_column, accumulate_cost)?;

    let (frame, stats) = explode_lockstep(frame, &explode)?;
    if stats.misaligned_rows > 0 {
        warn!(
            group = %name,
            rows = stats.misaligned_rows,
            "list columns differ in length, shorter ones padded with nulls"
        );
    }
    debug!(group = %name, rows = frame.height(), "exploded");

    let before = frame.height();
    let mut frame = drop_missing(frame, &[&rules.cost_column])?;
    debug!(group = %name, removed = before - frame.height(), "dropped rows without cost");

    let hyperparameters = config.columns.hyperparameters();
    if mode == ProcessMode::Surrogate {
        if let Some(filter) = rules.cost_filter(&name) {
            let before = frame.height();
            frame = apply_cost_filter(frame, filter, &hyperparameters, &rules.cost_column, &name)?;
            info!(group = %name, removed = before - frame.height(), "applied cost filter");
        }
    }

    let keeps_activation = mode == ProcessMode::Surrogate && rules.varies_activation_fn(&name);
    let mut drop = rules.group_columns.clone();
    if !keeps_activation {
        drop.push(rules.activation_column.clone());
    }
    let frame = without(&frame, &drop)?;

    let frame = match mode {
        ProcessMode::Tabular => {
            let slice = rules.tabular_slice_for(&name);
            require_all(&frame, &[MATCHED_COLUMN, PHASE_COLUMN])?;
            frame
                .lazy()
                .filter(
                    col(MATCHED_COLUMN)
                        .eq(lit(slice.matched))
                        .and(col(PHASE_COLUMN).eq(lit(slice.phase))),
                )
                .collect()
                .map_err(TableError::from)?
        }
        ProcessMode::Surrogate => {
            let mut keys = hyperparameters;
            if keeps_activation {
                keys.push(rules.activation_column.clone());
            }
            keys.push(rules.step_column.clone());
            dedup_keep_last(frame, &keys)?
        }
    };
    Ok(without(&frame, &[MATCHED_COLUMN, PHASE_COLUMN])?)
}

/// Replace each defined step of a curve with its 1-based position.
fn renumber_steps(steps: &[Option<f64>]) -> Vec<Option<f64>> {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| s.filter(|v| !v.is_nan()).map(|_| i as f64 + 1.0))
        .collect()
}

/// Running cumulative cost. A missing entry turns the rest of the curve
/// missing.
fn accumulate_cost(costs: &[Option<f64>]) -> Vec<Option<f64>> {
    running_sum(costs)
        .into_iter()
        .map(|s| (!s.is_nan()).then_some(s))
        .collect()
}

const MAX_COST: &str = "__max_cost";

fn apply_cost_filter(
    frame: DataFrame,
    filter: CostFilterKind,
    hyperparameters: &[String],
    cost_column: &str,
    name: &str,
) -> Result<DataFrame> {
    require_all(&frame, &[cost_column])?;
    match filter {
        CostFilterKind::Below { threshold } => Ok(frame
            .lazy()
            .filter(col(cost_column).lt(lit(threshold)))
            .collect()
            .map_err(TableError::from)?),
        CostFilterKind::Quantile { q } => {
            let before = frame.height();
            let frame = drop_missing(frame, hyperparameters)?;
            if frame.height() < before {
                warn!(
                    group = %name,
                    rows = before - frame.height(),
                    "rows with a missing hyperparameter excluded from the quantile filter"
                );
            }

            let by: Vec<Expr> = hyperparameters.iter().map(|h| col(h.as_str())).collect();
            let maxima = frame
                .clone()
                .lazy()
                .group_by(by.clone())
                .agg([col(cost_column).max().alias(MAX_COST)])
                .collect()
                .map_err(TableError::from)?;
            let empty = || Error::EmptyFilterResult {
                dataset: name.to_string(),
            };
            let per_config = series(&maxima, MAX_COST)?
                .f64()
                .map_err(TableError::from)?
                .clone();
            let limit = per_config
                .quantile(q, QuantileMethod::Linear)
                .map_err(TableError::from)?
                .ok_or_else(empty)?;
            let kept = per_config.into_iter().flatten().filter(|m| *m < limit).count();
            if kept == 0 {
                return Err(empty());
            }
            info!(
                group = %name,
                q,
                limit,
                kept,
                removed = maxima.height() - kept,
                "quantile filter"
            );

            Ok(frame
                .lazy()
                .filter(col(cost_column).max().over(by.clone()).lt(lit(limit)))
                .sort_by_exprs(by, SortMultipleOptions::default().with_maintain_order(true))
                .collect()
                .map_err(TableError::from)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfp_tables::frame::{column_names, f64_values, float_list_series, has_column};

    struct Run {
        dataset: &'static str,
        lr: f64,
        epochs: Vec<f64>,
        cost: Vec<f64>,
        matched: bool,
        phase: i64,
    }

    fn run(dataset: &'static str, lr: f64, epochs: &[f64], cost: &[f64], matched: bool, phase: i64) -> Run {
        Run {
            dataset,
            lr,
            epochs: epochs.to_vec(),
            cost: cost.to_vec(),
            matched,
            phase,
        }
    }

    fn group_frame(runs: &[Run]) -> DataFrame {
        let list = |name: &str, f: fn(&Run) -> Vec<f64>| -> Column {
            let cells = runs
                .iter()
                .map(|r| Some(f(r).into_iter().map(|x| (!x.is_nan()).then_some(x)).collect()))
                .collect();
            float_list_series(name, cells).unwrap().into()
        };
        let repeat = |name: &str, value: f64| -> Column {
            Series::new(name.into(), vec![value; runs.len()]).into()
        };
        DataFrame::new(vec![
            Series::new("dataset".into(), runs.iter().map(|r| r.dataset).collect::<Vec<_>>()).into(),
            Series::new("model".into(), vec!["cnn"; runs.len()]).into(),
            Series::new("batch_size".into(), vec![256i64; runs.len()]).into(),
            Series::new("activation_fn".into(), vec!["relu"; runs.len()]).into(),
            repeat("lr_decay_factor", 0.5),
            Series::new("lr_initial".into(), runs.iter().map(|r| r.lr).collect::<Vec<_>>()).into(),
            repeat("lr_power", 1.0),
            repeat("opt_momentum", 0.9),
            list("epoch", |r| r.epochs.clone()),
            list("valid_error_rate", |r| vec![0.3; r.epochs.len()]),
            list("test_error_rate", |r| vec![0.4; r.epochs.len()]),
            list("train_cost", |r| r.cost.clone()),
            Series::new(MATCHED_COLUMN.into(), runs.iter().map(|r| r.matched).collect::<Vec<_>>()).into(),
            Series::new(PHASE_COLUMN.into(), runs.iter().map(|r| r.phase).collect::<Vec<_>>()).into(),
        ])
        .unwrap()
    }

    fn values(frame: &DataFrame, column: &str) -> Vec<f64> {
        f64_values(frame, column).unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn test_accumulate_cost() {
        assert_eq!(
            accumulate_cost(&[Some(1.0), Some(2.0), None, Some(4.0)]),
            vec![Some(1.0), Some(3.0), None, None]
        );
        assert!(accumulate_cost(&[]).is_empty());
    }

    #[test]
    fn test_renumber_keeps_missing() {
        assert_eq!(
            renumber_steps(&[Some(0.0), Some(0.0), None]),
            vec![Some(1.0), Some(2.0), None]
        );
    }

    #[test]
    fn test_surrogate_dedup_keeps_last_and_drops_bookkeeping() {
        let config = PipelineConfig::default();
        let key = DatasetKey::new("mnist", "cnn", 256);
        let frame = group_frame(&[
            run("mnist", 0.1, &[1.0, 2.0], &[1.0, 1.0], true, 0),
            run("mnist", 0.1, &[1.0, 2.0], &[5.0, 5.0], false, 1),
        ]);
        let out = reshape_group(&key, frame, ProcessMode::Surrogate, &config).unwrap();
        assert_eq!(out.height(), 2);
        for dropped in ["dataset", "model", "batch_size", "activation_fn", "matched", "phase"] {
            assert!(!has_column(&out, dropped), "{dropped} should be dropped");
        }
        assert_eq!(values(&out, "train_cost"), vec![5.0, 10.0]);
    }

    #[test]
    fn test_tabular_slice_and_cost_rows() {
        let config = PipelineConfig::default();
        let key = DatasetKey::new("mnist", "cnn", 256);
        let frame = group_frame(&[
            run("mnist", 0.1, &[1.0, 2.0, 3.0], &[1.0, f64::NAN, 1.0], true, 1),
            run("mnist", 0.2, &[1.0, 2.0], &[1.0, 1.0], true, 0),
        ]);
        let out = reshape_group(&key, frame, ProcessMode::Tabular, &config).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(values(&out, "epoch"), vec![1.0]);
    }

    #[test]
    fn test_tabular_override_slice() {
        let config = PipelineConfig::default();
        let key = DatasetKey::new("imagenet", "resnet", 1024);
        let frame = group_frame(&[
            run("imagenet", 0.1, &[1.0, 2.0], &[1.0, 1.0], true, 1),
            run("imagenet", 0.2, &[1.0], &[3.0], false, 0),
            run("imagenet", 0.3, &[1.0], &[3.0], false, 1),
        ]);
        let out = reshape_group(&key, frame, ProcessMode::Tabular, &config).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(values(&out, "lr_initial"), vec![0.2]);

        let frame = group_frame(&[run("imagenet", 0.1, &[1.0], &[1.0], true, 1)]);
        let other = DatasetKey::new("imagenet", "resnet", 512);
        let out = reshape_group(&other, frame, ProcessMode::Tabular, &config).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_step_remap_only_in_surrogate_mode() {
        let config = PipelineConfig::default();
        let key = DatasetKey::new("uniref50", "transformer", 128);
        let runs = || group_frame(&[run("uniref50", 0.1, &[0.5, 0.5, 0.5], &[1.0, 1.0, 1.0], true, 1)]);

        let out = reshape_group(&key, runs(), ProcessMode::Surrogate, &config).unwrap();
        assert_eq!(values(&out, "epoch"), vec![1.0, 2.0, 3.0]);
        assert!(!has_column(&out, "test_error_rate"));

        let out = reshape_group(&key, runs(), ProcessMode::Tabular, &config).unwrap();
        assert_eq!(values(&out, "epoch"), vec![0.5, 0.5, 0.5]);
        assert_eq!(values(&out, "train_cost"), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_transformer_drops_test_error() {
        let config = PipelineConfig::default();
        let key = DatasetKey::new("lm1b", "cnn", 256);
        let frame = group_frame(&[run("lm1b", 0.1, &[1.0], &[2.0], true, 1)]);
        let out = reshape_group(&key, frame, ProcessMode::Surrogate, &config).unwrap();
        assert!(!has_column(&out, "test_error_rate"));
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_activation_kept_for_varying_groups() {
        let config = PipelineConfig::default();
        let key = DatasetKey::new("mnist", "max_pooling_cnn", 256);
        let frame = group_frame(&[run("mnist", 0.1, &[1.0], &[2.0], true, 1)]);
        let out = reshape_group(&key, frame.clone(), ProcessMode::Surrogate, &config).unwrap();
        assert!(has_column(&out, "activation_fn"));
        let out = reshape_group(&key, frame, ProcessMode::Tabular, &config).unwrap();
        assert!(!has_column(&out, "activation_fn"));
    }

    fn cost_table(lrs: Vec<Option<f64>>, costs: Vec<f64>) -> DataFrame {
        DataFrame::new(vec![
            Series::new("lr".into(), lrs).into(),
            Series::new("train_cost".into(), costs).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_quantile_filter_removes_outlier_group() {
        let mut lrs = Vec::new();
        let mut costs = Vec::new();
        for g in 0..20 {
            let max = if g == 7 { 1000.0 } else { g as f64 + 1.0 };
            lrs.extend([Some(g as f64), Some(g as f64)]);
            costs.extend([max / 2.0, max]);
        }
        let out = apply_cost_filter(
            cost_table(lrs, costs),
            CostFilterKind::Quantile { q: 0.95 },
            &["lr".to_string()],
            "train_cost",
            "imagenet-resnet-512",
        )
        .unwrap();
        assert_eq!(out.height(), 38);
        assert!(values(&out, "lr").iter().all(|lr| *lr != 7.0));
        assert!(values(&out, "lr").windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_quantile_filter_skips_rows_without_hyperparameters() {
        let out = apply_cost_filter(
            cost_table(
                vec![Some(0.1), Some(0.2), None, Some(0.3)],
                vec![1.0, 2.0, 0.5, 10.0],
            ),
            CostFilterKind::Quantile { q: 0.9 },
            &["lr".to_string()],
            "train_cost",
            "cifar100-wide_resnet-2048",
        )
        .unwrap();
        assert_eq!(values(&out, "lr"), vec![0.1, 0.2]);
        assert_eq!(column_names(&out), vec!["lr", "train_cost"]);
    }

    #[test]
    fn test_quantile_filter_with_no_survivors_fails() {
        let err = apply_cost_filter(
            cost_table(vec![Some(0.1)], vec![3.0]),
            CostFilterKind::Quantile { q: 0.5 },
            &["lr".to_string()],
            "train_cost",
            "cifar100-wide_resnet-2048",
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmptyFilterResult { .. }));
    }

    #[test]
    fn test_threshold_filter_is_row_level() {
        let out = apply_cost_filter(
            cost_table(vec![Some(0.1), Some(0.1)], vec![3_000.0, 5_000.0]),
            CostFilterKind::Below { threshold: 4_000.0 },
            &["lr".to_string()],
            "train_cost",
            "uniref50-transformer-128",
        )
        .unwrap();
        assert_eq!(out.height(), 1);
    }
}
