//! Uniform query interface over tabular and synthetic benchmarks.

pub mod hartmann;
pub mod pd1;
pub mod prior;
pub mod tabular;

use std::collections::BTreeMap;
use std::fmt;

use mfp_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub use hartmann::{Difficulty, HartmannFunction, MfHartmann, HARTMANN3, HARTMANN6};
pub use pd1::{HyperparameterBound, Pd1Spec, PD1_BENCHMARKS};
pub use prior::{Prior, PriorNoise, PriorSource};
pub use tabular::TabularBenchmark;

/// Inclusive fidelity range with a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FidelityRange {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl FidelityRange {
    pub const fn new(start: i64, end: i64, step: i64) -> Self {
        Self { start, end, step }
    }

    pub fn contains(&self, fidelity: i64) -> bool {
        (self.start..=self.end).contains(&fidelity)
    }

    /// Error unless `fidelity` lies within the range.
    pub fn check(&self, fidelity: i64) -> Result<()> {
        if self.contains(fidelity) {
            Ok(())
        } else {
            Err(Error::FidelityOutOfRange {
                fidelity,
                start: self.start,
                end: self.end,
            })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let step = usize::try_from(self.step.max(1)).unwrap_or(1);
        (self.start..=self.end).step_by(step)
    }

    /// Fidelities from `frm` to `to` inclusive, defaulting to the range
    /// bounds and step.
    pub fn between(&self, frm: Option<i64>, to: Option<i64>, step: Option<i64>) -> Result<Vec<i64>> {
        let frm = frm.unwrap_or(self.start);
        let to = to.unwrap_or(self.end);
        let step = step.unwrap_or(self.step);
        self.check(frm)?;
        self.check(to)?;
        if frm > to {
            return Err(Error::InvalidConfig(format!(
                "fidelity range start {frm} is after end {to}"
            )));
        }
        if step < 1 {
            return Err(Error::InvalidConfig(format!("fidelity step must be positive, got {step}")));
        }
        Ok(FidelityRange::new(frm, to, step).iter().collect())
    }
}

impl fmt::Display for FidelityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] step {}", self.start, self.end, self.step)
    }
}

/// Hyperparameter assignment, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(BTreeMap<String, f64>);

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `name=value` assignments.
    pub fn parse_assignments<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut config = Config::new();
        for item in items {
            let item = item.as_ref();
            let (name, value) = item
                .split_once('=')
                .ok_or_else(|| Error::InvalidConfig(format!("expected name=value, got '{item}'")))?;
            let value: f64 = value.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("'{}' is not a number for {}", value.trim(), name.trim()))
            })?;
            config.insert(name.trim(), value);
        }
        Ok(config)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

/// How [`BenchResult::valid_error_rate`] relates to the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// An error rate; the score is its complement.
    #[default]
    ErrorRate,
    /// A negated function value; the score is the value itself.
    Value,
}

/// One looked-up evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    pub config: Config,
    pub fidelity: i64,
    pub valid_error_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_error_rate: Option<f64>,
    pub train_cost: f64,
    /// Step value recorded in the raw data before re-indexing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_step: Option<f64>,
    #[serde(default)]
    pub objective: Objective,
}

impl BenchResult {
    pub fn error(&self) -> f64 {
        self.valid_error_rate
    }

    pub fn score(&self) -> f64 {
        match self.objective {
            Objective::ErrorRate => 1.0 - self.valid_error_rate,
            Objective::Value => -self.valid_error_rate,
        }
    }

    pub fn cost(&self) -> f64 {
        self.train_cost
    }
}

/// A multi-fidelity benchmark.
pub trait Benchmark {
    fn name(&self) -> &str;

    fn fidelity_range(&self) -> FidelityRange;

    /// Prior configuration, after any prior noise was applied.
    fn prior(&self) -> Option<&Config> {
        None
    }

    /// Result of `config` at fidelity `at`, or at the maximum fidelity.
    fn query(&self, config: &Config, at: Option<i64>) -> Result<BenchResult>;

    /// Results of `config` across a fidelity range.
    fn trajectory(
        &self,
        config: &Config,
        frm: Option<i64>,
        to: Option<i64>,
        step: Option<i64>,
    ) -> Result<Vec<BenchResult>> {
        self.fidelity_range()
            .between(frm, to, step)?
            .into_iter()
            .map(|f| self.query(config, Some(f)))
            .collect()
    }

    fn iter_fidelities(&self) -> Vec<i64> {
        self.fidelity_range().iter().collect()
    }
}
