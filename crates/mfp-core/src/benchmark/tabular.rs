//! Lookups into re-indexed tabular Parquet files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use mfp_common::{ConfigId, Error, Result};
use mfp_tables::frame::{f64_values, has_column, i64_values};
use mfp_tables::read_parquet;
use tracing::{debug, info};

use super::{BenchResult, Benchmark, Config, FidelityRange, Objective, Pd1Spec, Prior};
use crate::pd1::reindex::{ID_COLUMN, ORIGINAL_STEPS_COLUMN};

const VALID_ERROR_COLUMN: &str = "valid_error_rate";
const TEST_ERROR_COLUMN: &str = "test_error_rate";
const COST_COLUMN: &str = "train_cost";

#[derive(Debug, Clone, Copy)]
struct Entry {
    valid_error_rate: f64,
    test_error_rate: Option<f64>,
    train_cost: f64,
    original_step: Option<f64>,
}

/// A PD1 benchmark answered from its tabular Parquet file.
#[derive(Debug, Clone)]
pub struct TabularBenchmark {
    spec: Pd1Spec,
    path: PathBuf,
    range: FidelityRange,
    configs: Vec<(ConfigId, Config)>,
    entries: HashMap<ConfigId, BTreeMap<i64, Entry>>,
    prior: Option<Config>,
}

impl TabularBenchmark {
    /// Path of the table for `spec` under `datadir`.
    ///
    /// With a stride the strided sub-epoch file is used. Without one the
    /// epoch-level file is preferred and the stride-1 file is the fallback.
    pub fn table_path(datadir: &Path, spec: &Pd1Spec, stride: Option<u32>) -> PathBuf {
        let stem = spec.key().tabular_file();
        let stem = stem.trim_end_matches(".csv");
        match stride {
            Some(k) => datadir.join(format!("{stem}-{k}.parquet")),
            None => {
                let plain = datadir.join(format!("{stem}.parquet"));
                if plain.exists() {
                    plain
                } else {
                    datadir.join(format!("{stem}-1.parquet"))
                }
            }
        }
    }

    pub fn open(datadir: &Path, spec: &Pd1Spec, stride: Option<u32>) -> Result<Self> {
        let path = Self::table_path(datadir, spec, stride);
        if !path.exists() {
            return Err(Error::ArchiveNotFound { path });
        }
        let table = read_parquet(&path)?;
        let frame = &table.frame;

        let ids = i64_values(frame, ID_COLUMN)?;
        let steps = i64_values(frame, spec.fidelity_name)?;
        let valid = f64_values(frame, VALID_ERROR_COLUMN)?;
        let cost = f64_values(frame, COST_COLUMN)?;
        let optional = |name: &str| -> Result<Option<Vec<Option<f64>>>> {
            if has_column(frame, name) {
                Ok(Some(f64_values(frame, name)?))
            } else {
                Ok(None)
            }
        };
        let test = optional(TEST_ERROR_COLUMN)?;
        let original = optional(ORIGINAL_STEPS_COLUMN)?;
        let hps: Vec<(&'static str, Vec<Option<f64>>)> = spec
            .hyperparameter_names()
            .map(|name| f64_values(frame, name).map(|v| (name, v)))
            .collect::<std::result::Result<_, _>>()?;

        let mut configs = Vec::new();
        let mut entries: HashMap<ConfigId, BTreeMap<i64, Entry>> = HashMap::new();
        let mut min_step = i64::MAX;
        let mut max_step = i64::MIN;

        for row in 0..frame.height() {
            let bad = |column: &str| {
                Error::Table(format!("{}: row {row} has no integer {column}", path.display()))
            };
            let id = ids[row]
                .and_then(|i| u32::try_from(i).ok())
                .map(ConfigId)
                .ok_or_else(|| bad(ID_COLUMN))?;
            let step = steps[row].ok_or_else(|| bad(spec.fidelity_name))?;

            if !entries.contains_key(&id) {
                let mut config = Config::new();
                for (name, values) in &hps {
                    config.insert(*name, values[row].unwrap_or(f64::NAN));
                }
                configs.push((id, config));
            }
            entries.entry(id).or_default().insert(
                step,
                Entry {
                    valid_error_rate: valid[row].unwrap_or(f64::NAN),
                    test_error_rate: test.as_ref().and_then(|t| t[row]),
                    train_cost: cost[row].unwrap_or(f64::NAN),
                    original_step: original.as_ref().and_then(|o| o[row]),
                },
            );
            min_step = min_step.min(step);
            max_step = max_step.max(step);
        }

        if configs.is_empty() {
            return Err(Error::Table(format!("{} has no rows", path.display())));
        }
        let range = FidelityRange::new(min_step, max_step, 1);
        info!(
            benchmark = spec.name,
            path = %path.display(),
            configs = configs.len(),
            fidelity = %range,
            "opened tabular benchmark"
        );

        Ok(Self {
            spec: *spec,
            path,
            range,
            configs,
            entries,
            prior: None,
        })
    }

    /// Set the prior. After any noise is applied the prior is snapped to the
    /// nearest tabulated configuration, measured in the unit space of the
    /// hyperparameter bounds, so that it can be queried.
    pub fn with_prior(mut self, prior: Prior) -> Result<Self> {
        self.spec.validate(&prior.config)?;
        let target = prior.perturbed(self.spec.hyperparameters)?;
        let distance = |config: &Config| -> f64 {
            self.spec
                .hyperparameters
                .iter()
                .map(|b| {
                    let a = b.to_unit(target.get(b.name).unwrap_or(f64::NAN));
                    let c = b.to_unit(config.get(b.name).unwrap_or(f64::NAN));
                    (a - c).powi(2)
                })
                .sum::<f64>()
        };
        let (id, nearest) = self
            .configs
            .iter()
            .map(|(id, c)| (id, c, distance(c)))
            .filter(|(_, _, d)| d.is_finite())
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(id, c, _)| (*id, c.clone()))
            .ok_or_else(|| Error::ConfigNotFound(format!("no configuration near prior {target}")))?;
        info!(benchmark = self.spec.name, id = %id, prior = %nearest, "set prior");
        self.prior = Some(nearest);
        Ok(self)
    }

    pub fn spec(&self) -> &Pd1Spec {
        &self.spec
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configurations in id order.
    pub fn configs(&self) -> impl Iterator<Item = &(ConfigId, Config)> {
        self.configs.iter()
    }

    pub fn config_by_id(&self, id: ConfigId) -> Result<Config> {
        self.configs
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| Error::ConfigNotFound(format!("id {id}")))
    }

    /// Id of the configuration whose hyperparameters equal `config`.
    pub fn resolve(&self, config: &Config) -> Result<ConfigId> {
        self.configs
            .iter()
            .find(|(_, c)| c == config)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::ConfigNotFound(config.to_string()))
    }
}

impl Benchmark for TabularBenchmark {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn fidelity_range(&self) -> FidelityRange {
        self.range
    }

    fn prior(&self) -> Option<&Config> {
        self.prior.as_ref()
    }

    fn query(&self, config: &Config, at: Option<i64>) -> Result<BenchResult> {
        let at = at.unwrap_or(self.range.end);
        self.range.check(at)?;
        let id = self.resolve(config)?;
        debug!(benchmark = self.spec.name, id = %id, at, "query");

        let entry = self
            .entries
            .get(&id)
            .and_then(|steps| steps.get(&at))
            .ok_or_else(|| {
                Error::ConfigNotFound(format!(
                    "{config} has no entry at {} {at}",
                    self.spec.fidelity_name
                ))
            })?;

        Ok(BenchResult {
            config: config.clone(),
            fidelity: at,
            valid_error_rate: entry.valid_error_rate,
            test_error_rate: entry.test_error_rate,
            train_cost: entry.train_cost,
            original_step: entry.original_step,
            objective: Objective::ErrorRate,
        })
    }
}
