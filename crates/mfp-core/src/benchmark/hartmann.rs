//! Multi-fidelity Hartmann functions.
//!
//! At the top fidelity the 3- and 6-dimensional Hartmann functions are
//! returned exactly. Lower fidelities shrink the weights of the four
//! Gaussian wells by `bias` and add normal noise scaled by `noise`, both
//! fading out with the log of the fidelity.

use mfp_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use super::pd1::check_bounds;
use super::{BenchResult, Benchmark, Config, FidelityRange, HyperparameterBound, Objective, Prior};

pub const HARTMANN_FIDELITY: FidelityRange = FidelityRange::new(3, 100, 1);
pub const HARTMANN_FIDELITY_NAME: &str = "z";
pub const DEFAULT_BIAS_NOISE: (f64, f64) = (0.5, 0.1);

const ALPHA: [f64; 4] = [1.0, 1.2, 3.0, 3.2];

/// Preset bias and noise levels. Worse presets make low fidelities less
/// informative about the top one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Terrible,
    Bad,
    Moderate,
    Good,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [Self::Terrible, Self::Bad, Self::Moderate, Self::Good];

    pub fn bias_noise(self) -> (f64, f64) {
        match self {
            Self::Terrible => (4.0, 0.8),
            Self::Bad => (2.0, 0.4),
            Self::Moderate => (1.0, 0.2),
            Self::Good => (0.5, 0.1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terrible => "terrible",
            Self::Bad => "bad",
            Self::Moderate => "moderate",
            Self::Good => "good",
        }
    }
}

/// Constants of one Hartmann function.
#[derive(Debug, PartialEq)]
pub struct HartmannFunction {
    pub name: &'static str,
    pub a: &'static [&'static [f64]],
    /// Well centres, scaled by `1e-4` when evaluated.
    pub p: &'static [&'static [f64]],
    pub optimum: &'static [f64],
    pub minimum: f64,
    pub bounds: &'static [HyperparameterBound],
    /// Named prior points, in the order presets are listed.
    pub priors: &'static [(&'static str, &'static [f64])],
}

pub static HARTMANN3: HartmannFunction = HartmannFunction {
    name: "mfh3",
    a: &[
        &[3.0, 10.0, 30.0],
        &[0.1, 10.0, 35.0],
        &[3.0, 10.0, 30.0],
        &[0.1, 10.0, 35.0],
    ],
    p: &[
        &[3689.0, 1170.0, 2673.0],
        &[4699.0, 4387.0, 7470.0],
        &[1091.0, 8732.0, 5547.0],
        &[381.0, 5743.0, 8828.0],
    ],
    optimum: &[0.114614, 0.555649, 0.852547],
    minimum: -3.86278,
    bounds: &[
        HyperparameterBound::new("X_0", 0.0, 1.0, false),
        HyperparameterBound::new("X_1", 0.0, 1.0, false),
        HyperparameterBound::new("X_2", 0.0, 1.0, false),
    ],
    priors: &[
        ("perfect", &[0.114614, 0.555649, 0.852547]),
        ("good", &[0.2, 0.6, 0.8]),
        ("bad", &[0.9, 0.1, 0.1]),
        ("default", &[0.5, 0.5, 0.5]),
    ],
};

pub static HARTMANN6: HartmannFunction = HartmannFunction {
    name: "mfh6",
    a: &[
        &[10.0, 3.0, 17.0, 3.5, 1.7, 8.0],
        &[0.05, 10.0, 17.0, 0.1, 8.0, 14.0],
        &[3.0, 3.5, 1.7, 10.0, 17.0, 8.0],
        &[17.0, 8.0, 0.05, 10.0, 0.1, 14.0],
    ],
    p: &[
        &[1312.0, 1696.0, 5569.0, 124.0, 8283.0, 5886.0],
        &[2329.0, 4135.0, 8307.0, 3736.0, 1004.0, 9991.0],
        &[2348.0, 1451.0, 3522.0, 2883.0, 3047.0, 6650.0],
        &[4047.0, 8828.0, 8732.0, 5743.0, 1091.0, 381.0],
    ],
    optimum: &[0.20169, 0.150011, 0.476874, 0.275332, 0.311652, 0.6573],
    minimum: -3.32237,
    bounds: &[
        HyperparameterBound::new("X_0", 0.0, 1.0, false),
        HyperparameterBound::new("X_1", 0.0, 1.0, false),
        HyperparameterBound::new("X_2", 0.0, 1.0, false),
        HyperparameterBound::new("X_3", 0.0, 1.0, false),
        HyperparameterBound::new("X_4", 0.0, 1.0, false),
        HyperparameterBound::new("X_5", 0.0, 1.0, false),
    ],
    priors: &[
        ("perfect", &[0.20169, 0.150011, 0.476874, 0.275332, 0.311652, 0.6573]),
        ("good", &[0.25, 0.2, 0.45, 0.3, 0.35, 0.6]),
        ("bad", &[0.9, 0.9, 0.1, 0.9, 0.9, 0.1]),
        ("default", &[0.5, 0.5, 0.5, 0.5, 0.5, 0.5]),
    ],
};

impl HartmannFunction {
    pub fn dims(&self) -> usize {
        self.bounds.len()
    }

    fn point(&self, xs: &[f64]) -> Config {
        self.bounds
            .iter()
            .zip(xs)
            .fold(Config::new(), |c, (b, x)| c.with(b.name, *x))
    }

    pub fn optimum_config(&self) -> Config {
        self.point(self.optimum)
    }

    pub fn preset(&self, name: &str) -> Option<Config> {
        self.priors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, xs)| self.point(xs))
    }

    /// Hartmann value at `xs` with well weights shifted by `shift`.
    fn evaluate(&self, xs: &[f64], shift: f64) -> f64 {
        -ALPHA
            .iter()
            .zip(self.a.iter().zip(self.p))
            .map(|(alpha, (a, p))| {
                let inner: f64 = xs
                    .iter()
                    .zip(a.iter().zip(p.iter()))
                    .map(|(x, (a, p))| a * (x - 1e-4 * p).powi(2))
                    .sum();
                (alpha - shift) * (-inner).exp()
            })
            .sum::<f64>()
    }
}

/// A multi-fidelity Hartmann benchmark.
#[derive(Debug, Clone)]
pub struct MfHartmann {
    function: &'static HartmannFunction,
    name: String,
    pub bias: f64,
    pub noise: f64,
    pub seed: u64,
    prior: Option<Config>,
}

impl MfHartmann {
    pub fn new(function: &'static HartmannFunction, bias_noise: (f64, f64), seed: u64) -> Self {
        Self {
            function,
            name: function.name.to_string(),
            bias: bias_noise.0,
            noise: bias_noise.1,
            seed,
            prior: None,
        }
    }

    pub fn with_difficulty(function: &'static HartmannFunction, difficulty: Difficulty, seed: u64) -> Self {
        let mut bench = Self::new(function, difficulty.bias_noise(), seed);
        bench.name = format!("{}_{}", function.name, difficulty.as_str());
        bench
    }

    /// Registered names: `mfh3`, `mfh6`, and each with a `_<difficulty>`
    /// suffix.
    pub fn names() -> Vec<String> {
        [&HARTMANN3, &HARTMANN6]
            .iter()
            .flat_map(|f| {
                let name = f.name;
                std::iter::once(name.to_string())
                    .chain(Difficulty::ALL.into_iter().map(move |d| format!("{name}_{}", d.as_str())))
            })
            .collect()
    }

    pub fn lookup(name: &str, seed: u64) -> Result<Self> {
        for function in [&HARTMANN3, &HARTMANN6] {
            if name == function.name {
                return Ok(Self::new(function, DEFAULT_BIAS_NOISE, seed));
            }
            let Some(rest) = name.strip_prefix(function.name).and_then(|r| r.strip_prefix('_')) else {
                continue;
            };
            if let Some(d) = Difficulty::ALL.into_iter().find(|d| d.as_str() == rest) {
                return Ok(Self::with_difficulty(function, d, seed));
            }
        }
        Err(Error::UnknownBenchmark(name.to_string()))
    }

    /// Override the bias and noise of the preset.
    pub fn with_bias_noise(mut self, bias: Option<f64>, noise: Option<f64>) -> Self {
        self.bias = bias.unwrap_or(self.bias);
        self.noise = noise.unwrap_or(self.noise);
        self
    }

    /// Set the prior, applying its noise if any.
    pub fn with_prior(mut self, prior: Prior) -> Result<Self> {
        let config = prior.perturbed(self.function.bounds)?;
        check_bounds(&self.name, self.function.bounds, &config)?;
        info!(benchmark = %self.name, prior = %config, "set prior");
        self.prior = Some(config);
        Ok(self)
    }

    pub fn function(&self) -> &'static HartmannFunction {
        self.function
    }

    fn fidelity_cost(at: i64) -> f64 {
        0.05 + (1.0 - 0.05) * (at as f64 / HARTMANN_FIDELITY.end as f64).powi(2)
    }

    /// Seed for the noise of one evaluation, so repeated queries agree.
    fn noise_seed(&self, z: i64, xs: &[f64]) -> u64 {
        xs.iter()
            .map(|x| x.to_bits())
            .chain(std::iter::once(z as u64))
            .fold(self.seed ^ 0x9e37_79b9_7f4a_7c15, |h, v| {
                (h ^ v).wrapping_mul(0x0000_0100_0000_01b3).rotate_left(31)
            })
    }

    /// Function value at fidelity `z`.
    pub fn value(&self, z: i64, xs: &[f64]) -> f64 {
        let scaled = (z as f64).ln() / (HARTMANN_FIDELITY.end as f64).ln();
        let fade = 1.0 - scaled;
        let h = self.function.evaluate(xs, self.bias * fade);

        let mut rng = StdRng::seed_from_u64(self.noise_seed(z, xs));
        let u1 = 1.0 - rng.random::<f64>();
        let u2 = rng.random::<f64>();
        let normal = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        h + normal * self.noise * fade
    }
}

impl Benchmark for MfHartmann {
    fn name(&self) -> &str {
        &self.name
    }

    fn fidelity_range(&self) -> FidelityRange {
        HARTMANN_FIDELITY
    }

    fn prior(&self) -> Option<&Config> {
        self.prior.as_ref()
    }

    fn query(&self, config: &Config, at: Option<i64>) -> Result<BenchResult> {
        let at = at.unwrap_or(HARTMANN_FIDELITY.end);
        HARTMANN_FIDELITY.check(at)?;
        check_bounds(&self.name, self.function.bounds, config)?;

        let xs: Vec<f64> = self
            .function
            .bounds
            .iter()
            .map(|b| config.get(b.name).unwrap_or(f64::NAN))
            .collect();
        let value = self.value(at, &xs);
        debug!(benchmark = %self.name, z = at, value, "query");

        Ok(BenchResult {
            config: config.clone(),
            fidelity: at,
            valid_error_rate: -value,
            test_error_rate: None,
            train_cost: Self::fidelity_cost(at),
            original_step: None,
            objective: Objective::Value,
        })
    }
}
