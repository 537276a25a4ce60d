//! Prior configurations, optionally perturbed with seeded noise.

use std::fs;
use std::path::{Path, PathBuf};

use mfp_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Config, HyperparameterBound};

pub const DEFAULT_PRIOR_NOISE_SCALE: f64 = 0.125;

/// Where a prior configuration comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorSource {
    /// A named preset of the benchmark.
    Preset(String),
    /// A JSON object mapping hyperparameter names to values.
    File(PathBuf),
    Config(Config),
}

impl PriorSource {
    /// Command-line form: arguments ending in `.json` or naming an existing
    /// file are files, anything else is a preset name.
    pub fn parse(arg: &str) -> Self {
        let path = Path::new(arg);
        if arg.ends_with(".json") || path.is_file() {
            Self::File(path.to_path_buf())
        } else {
            Self::Preset(arg.to_string())
        }
    }
}

/// Seeded uniform noise added to a prior in the unit space of each bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorNoise {
    pub seed: u64,
    pub scale: f64,
}

impl PriorNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            scale: DEFAULT_PRIOR_NOISE_SCALE,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// A prior configuration for a benchmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prior {
    pub config: Config,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise: Option<PriorNoise>,
}

impl Prior {
    pub fn new(config: Config) -> Self {
        Self { config, noise: None }
    }

    pub fn with_noise(mut self, noise: PriorNoise) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Resolve `source`, looking preset names up with `preset`.
    pub fn load(source: PriorSource, preset: impl Fn(&str) -> Option<Config>) -> Result<Self> {
        let config = match source {
            PriorSource::Config(config) => config,
            PriorSource::Preset(name) => preset(&name)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown prior preset '{name}'")))?,
            PriorSource::File(path) => {
                if !path.is_file() {
                    return Err(Error::InvalidConfig(format!(
                        "prior file {} does not exist",
                        path.display()
                    )));
                }
                let text = fs::read_to_string(&path)?;
                serde_json::from_str(&text)?
            }
        };
        Ok(Self::new(config))
    }

    /// The prior with its noise applied.
    ///
    /// Each value is mapped onto the unit interval of its bound, offset by
    /// `scale * U(-1, 1)` and clipped back into the bound. Offsets are drawn
    /// in the order of `bounds`. Without noise the configuration is returned
    /// unchanged.
    pub fn perturbed(&self, bounds: &[HyperparameterBound]) -> Result<Config> {
        let Some(noise) = self.noise else {
            return Ok(self.config.clone());
        };
        let mut rng = StdRng::seed_from_u64(noise.seed);
        let mut out = self.config.clone();
        for bound in bounds {
            let value = self.config.get(bound.name).ok_or_else(|| {
                Error::InvalidConfig(format!("prior does not set {}", bound.name))
            })?;
            let offset = noise.scale * rng.random_range(-1.0..1.0);
            out.insert(bound.name, bound.from_unit(bound.to_unit(value) + offset));
        }
        debug!(seed = noise.seed, scale = noise.scale, prior = %out, "perturbed prior");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &[HyperparameterBound] = &[
        HyperparameterBound::new("X_0", 0.0, 1.0, false),
        HyperparameterBound::new("X_1", 0.0, 1.0, false),
    ];

    fn centre() -> Config {
        Config::new().with("X_0", 0.5).with("X_1", 0.999)
    }

    #[test]
    fn test_load_sources() {
        let presets = |name: &str| (name == "centre").then(centre);
        let from_preset = Prior::load(PriorSource::Preset("centre".into()), presets).unwrap();
        assert_eq!(from_preset.config, centre());
        assert!(Prior::load(PriorSource::Preset("nope".into()), presets).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prior.json");
        fs::write(&path, r#"{"X_0": 0.25, "X_1": 0.75}"#).unwrap();
        let from_file = Prior::load(PriorSource::parse(path.to_str().unwrap()), presets).unwrap();
        assert_eq!(from_file.config, Config::new().with("X_0", 0.25).with("X_1", 0.75));

        assert!(matches!(
            Prior::load(PriorSource::File(dir.path().join("gone.json")), presets),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_noise_is_seeded_and_clipped() {
        let prior = Prior::new(centre()).with_noise(PriorNoise::new(7));
        let a = prior.perturbed(UNIT).unwrap();
        let b = prior.perturbed(UNIT).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, centre());

        for (name, value) in a.iter() {
            assert!((0.0..=1.0).contains(&value), "{name}={value}");
            let original = centre().get(name).unwrap();
            assert!((value - original).abs() <= DEFAULT_PRIOR_NOISE_SCALE + 1e-12);
        }

        let other = Prior::new(centre()).with_noise(PriorNoise::new(8)).perturbed(UNIT).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_no_noise_keeps_config() {
        assert_eq!(Prior::new(centre()).perturbed(UNIT).unwrap(), centre());
        let partial = Prior::new(Config::new().with("X_0", 0.5)).with_noise(PriorNoise::new(1));
        assert!(partial.perturbed(UNIT).is_err());
    }
}
