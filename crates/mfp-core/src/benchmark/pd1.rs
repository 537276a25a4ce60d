//! Registry of PD1 benchmarks.

use mfp_common::{DatasetKey, Error, Result};
use serde::Serialize;

use super::{Config, FidelityRange};

/// Closed interval a hyperparameter is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HyperparameterBound {
    pub name: &'static str,
    pub lower: f64,
    pub upper: f64,
    /// Sampled on a log scale.
    pub log: bool,
}

impl HyperparameterBound {
    pub const fn new(name: &'static str, lower: f64, upper: f64, log: bool) -> Self {
        Self {
            name,
            lower,
            upper,
            log,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Position of `value` in the bound mapped onto `[0, 1]`, on a log scale
    /// for log-sampled hyperparameters.
    pub fn to_unit(&self, value: f64) -> f64 {
        if self.log {
            (value.ln() - self.lower.ln()) / (self.upper.ln() - self.lower.ln())
        } else {
            (value - self.lower) / (self.upper - self.lower)
        }
    }

    /// Inverse of [`Self::to_unit`]. `unit` is clipped to `[0, 1]` first.
    pub fn from_unit(&self, unit: f64) -> f64 {
        let unit = unit.clamp(0.0, 1.0);
        let value = if self.log {
            (self.lower.ln() + unit * (self.upper.ln() - self.lower.ln())).exp()
        } else {
            self.lower + unit * (self.upper - self.lower)
        };
        value.clamp(self.lower, self.upper)
    }
}

/// Check that `config` sets exactly the hyperparameters in `bounds`, each
/// within its interval.
pub(crate) fn check_bounds(owner: &str, bounds: &[HyperparameterBound], config: &Config) -> Result<()> {
    let mut problems = Vec::new();
    for bound in bounds {
        match config.get(bound.name) {
            None => problems.push(format!("missing {}", bound.name)),
            Some(v) if !bound.contains(v) => problems.push(format!(
                "{}={} outside [{}, {}]",
                bound.name, v, bound.lower, bound.upper
            )),
            Some(_) => {}
        }
    }
    for (name, _) in config.iter() {
        if !bounds.iter().any(|b| b.name == name) {
            problems.push(format!("unknown hyperparameter {name}"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{owner}: {}", problems.join("; "))))
    }
}

/// Static description of one PD1 benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pd1Spec {
    pub name: &'static str,
    pub dataset: &'static str,
    pub model: &'static str,
    pub batch_size: u32,
    pub fidelity_name: &'static str,
    pub fidelity: FidelityRange,
    pub hyperparameters: &'static [HyperparameterBound],
    pub metrics: &'static [&'static str],
}

const PD1_METRICS: &[&str] = &["valid_error_rate", "train_cost"];

pub const PD1_BENCHMARKS: &[Pd1Spec] = &[
    Pd1Spec {
        name: "cifar100-wide_resnet-2048",
        dataset: "cifar100",
        model: "wide_resnet",
        batch_size: 2048,
        fidelity_name: "epoch",
        fidelity: FidelityRange::new(45, 199, 1),
        hyperparameters: &[
            HyperparameterBound::new("lr_decay_factor", 0.010093, 0.989012, false),
            HyperparameterBound::new("lr_initial", 0.000010, 9.779176, true),
            HyperparameterBound::new("lr_power", 0.100708, 1.999376, false),
            HyperparameterBound::new("opt_momentum", 0.000059, 0.998993, true),
        ],
        metrics: PD1_METRICS,
    },
    Pd1Spec {
        name: "uniref50-transformer-128",
        dataset: "uniref50",
        model: "transformer",
        batch_size: 128,
        fidelity_name: "epoch",
        fidelity: FidelityRange::new(1, 22, 1),
        hyperparameters: &[
            HyperparameterBound::new("lr_decay_factor", 0.0111588123, 0.9898713967, false),
            HyperparameterBound::new("lr_initial", 1.00564e-05, 0.4429248972, true),
            HyperparameterBound::new("lr_power", 0.1001570089, 1.9989163336, false),
            HyperparameterBound::new("opt_momentum", 5.86114e-05, 0.9989940217, true),
        ],
        metrics: PD1_METRICS,
    },
    Pd1Spec {
        name: "translate_wmt-xformer_translate-64",
        dataset: "translate_wmt",
        model: "xformer_translate",
        batch_size: 64,
        fidelity_name: "epoch",
        fidelity: FidelityRange::new(1, 19, 1),
        hyperparameters: &[
            HyperparameterBound::new("lr_decay_factor", 0.0100221257, 0.988565263, false),
            HyperparameterBound::new("lr_initial", 1.00276e-05, 9.8422475735, true),
            HyperparameterBound::new("lr_power", 0.1004250993, 1.9985927056, false),
            HyperparameterBound::new("opt_momentum", 5.86114e-05, 0.9989999746, true),
        ],
        metrics: PD1_METRICS,
    },
];

impl Pd1Spec {
    /// Registered benchmark named `name`.
    pub fn lookup(name: &str) -> Result<&'static Pd1Spec> {
        PD1_BENCHMARKS
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| Error::UnknownBenchmark(name.to_string()))
    }

    pub fn key(&self) -> DatasetKey {
        DatasetKey::new(self.dataset, self.model, self.batch_size)
    }

    pub fn hyperparameter_names(&self) -> impl Iterator<Item = &'static str> {
        self.hyperparameters.iter().map(|h| h.name)
    }

    /// Check that `config` sets exactly this benchmark's hyperparameters,
    /// each within bounds.
    pub fn validate(&self, config: &Config) -> Result<()> {
        check_bounds(self.name, self.hyperparameters, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inside() -> Config {
        Config::new()
            .with("lr_decay_factor", 0.5)
            .with("lr_initial", 0.01)
            .with("lr_power", 1.0)
            .with("opt_momentum", 0.9)
    }

    #[test]
    fn test_registry_names_match_keys() {
        for spec in PD1_BENCHMARKS {
            assert_eq!(spec.key().to_string(), spec.name);
            assert_eq!(spec.hyperparameter_names().count(), 4);
        }
    }

    #[test]
    fn test_lookup() {
        let spec = Pd1Spec::lookup("uniref50-transformer-128").unwrap();
        assert_eq!(spec.fidelity, FidelityRange::new(1, 22, 1));
        assert!(matches!(
            Pd1Spec::lookup("mnist-cnn-1"),
            Err(Error::UnknownBenchmark(_))
        ));
    }

    #[test]
    fn test_validate_bounds() {
        let spec = Pd1Spec::lookup("cifar100-wide_resnet-2048").unwrap();
        assert!(spec.validate(&inside()).is_ok());

        let err = spec.validate(&inside().with("lr_initial", 20.0)).unwrap_err();
        assert!(err.to_string().contains("lr_initial=20 outside"));

        let err = spec.validate(&inside().with("dropout", 0.1)).unwrap_err();
        assert!(err.to_string().contains("unknown hyperparameter dropout"));

        let mut partial = Config::new();
        partial.insert("lr_initial", 0.01);
        assert!(matches!(spec.validate(&partial), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unit_mapping_respects_log_scale() {
        let lin = HyperparameterBound::new("a", 0.0, 2.0, false);
        assert_eq!(lin.to_unit(0.5), 0.25);
        assert_eq!(lin.from_unit(1.5), 2.0);

        let log = HyperparameterBound::new("b", 1e-4, 1.0, true);
        assert!((log.to_unit(1e-2) - 0.5).abs() < 1e-12);
        assert!((log.from_unit(0.25) - 1e-3).abs() < 1e-12);
        assert!((log.from_unit(-3.0) - 1e-4).abs() < 1e-15);
    }
}
