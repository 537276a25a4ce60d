//! Configuration file resolution.
//!
//! Precedence: explicit CLI path → `MFP_CONFIG` → XDG config dir → built-in
//! defaults. An explicit path that does not exist is an error; the XDG file
//! is optional.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{ConfigError, PipelineConfig};

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "MFP_CONFIG";

const CONFIG_DIR_NAME: &str = "mfpbench";
const CONFIG_FILE_NAME: &str = "pipeline.json";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Xdg(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Cli(p) => write!(f, "cli:{}", p.display()),
            ConfigSource::Env(p) => write!(f, "env:{}", p.display()),
            ConfigSource::Xdg(p) => write!(f, "xdg:{}", p.display()),
            ConfigSource::Defaults => write!(f, "defaults"),
        }
    }
}

/// Candidate configuration locations.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub cli: Option<PathBuf>,
    pub env: Option<PathBuf>,
    pub xdg: Option<PathBuf>,
}

impl ConfigPaths {
    /// Collect candidates from the process environment.
    pub fn discover(cli: Option<&Path>) -> Self {
        Self {
            cli: cli.map(Path::to_path_buf),
            env: std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
            xdg: dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)),
        }
    }
}

/// Resolve the effective pipeline configuration.
pub fn resolve_config(paths: &ConfigPaths) -> Result<(PipelineConfig, ConfigSource), ConfigError> {
    if let Some(path) = &paths.cli {
        let config = load(path)?;
        info!(path = %path.display(), "loaded config from command line");
        return Ok((config, ConfigSource::Cli(path.clone())));
    }
    if let Some(path) = &paths.env {
        let config = load(path)?;
        info!(path = %path.display(), "loaded config from {}", CONFIG_ENV_VAR);
        return Ok((config, ConfigSource::Env(path.clone())));
    }
    if let Some(path) = paths.xdg.as_ref().filter(|p| p.is_file()) {
        let config = load(path)?;
        info!(path = %path.display(), "loaded config from user config dir");
        return Ok((config, ConfigSource::Xdg(path.clone())));
    }
    debug!("no config file found, using built-in defaults");
    Ok((PipelineConfig::default(), ConfigSource::Defaults))
}

fn load(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = PipelineConfig::from_json(&content)?;
    if !mfp_common::schema::is_compatible(&config.schema_version) {
        return Err(ConfigError::UnsupportedVersion(config.schema_version));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths {
            cli: None,
            env: None,
            xdg: Some(dir.path().join("missing.json")),
        };
        let (config, source) = resolve_config(&paths).unwrap();
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_cli_beats_env() {
        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("cli.json");
        let env = dir.path().join("env.json");
        fs::write(&cli, r#"{"rules": {"strides": [3]}}"#).unwrap();
        fs::write(&env, r#"{"rules": {"strides": [7]}}"#).unwrap();

        let paths = ConfigPaths {
            cli: Some(cli.clone()),
            env: Some(env),
            xdg: None,
        };
        let (config, source) = resolve_config(&paths).unwrap();
        assert_eq!(source, ConfigSource::Cli(cli));
        assert_eq!(config.rules.strides, vec![3]);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths {
            cli: None,
            env: Some(dir.path().join("gone.json")),
            xdg: None,
        };
        assert!(matches!(
            resolve_config(&paths),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_xdg_file_is_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let xdg = dir.path().join("pipeline.json");
        fs::write(&xdg, r#"{"rules": {"sub_epoch_markers": ["cifar"]}}"#).unwrap();
        let paths = ConfigPaths {
            cli: None,
            env: None,
            xdg: Some(xdg.clone()),
        };
        let (config, source) = resolve_config(&paths).unwrap();
        assert_eq!(source, ConfigSource::Xdg(xdg));
        assert!(config.rules.is_sub_epoch("cifar100-wide_resnet-2048"));
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("v2.json");
        fs::write(&cli, r#"{"schema_version": "2.0.0"}"#).unwrap();
        let paths = ConfigPaths {
            cli: Some(cli),
            ..Default::default()
        };
        assert!(resolve_config(&paths).is_err());
    }
}
