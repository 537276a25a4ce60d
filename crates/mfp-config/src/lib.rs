//! Configuration for the PD1 processing pipeline.
//!
//! This crate provides:
//! - The PD1 column schema (keep/rename/kind/role per raw column)
//! - Per-dataset processing rules (filters, slices, sub-epoch markers)
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation and JSON schema emission

pub mod columns;
pub mod resolve;
pub mod rules;
pub mod validate;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use columns::{ColumnKind, ColumnRole, ColumnSchema, ColumnSpec};
pub use resolve::{resolve_config, ConfigPaths, ConfigSource, CONFIG_ENV_VAR};
pub use rules::{CostFilter, CostFilterKind, DatasetRules, Slice};
pub use validate::{validate, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub columns: ColumnSchema,

    #[serde(default)]
    pub rules: DatasetRules,
}

fn default_schema_version() -> String {
    CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            columns: ColumnSchema::default(),
            rules: DatasetRules::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Run semantic validation, failing on the first batch of errors.
    pub fn check(&self) -> Result<(), ConfigError> {
        let result = validate(self);
        if result.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(result))
        }
    }

    /// JSON schema for configuration files.
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(PipelineConfig);
        serde_json::to_value(&schema).unwrap_or(serde_json::Value::Null)
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(ValidationResult),

    #[error("unsupported config schema version: {0}")]
    UnsupportedVersion(String),
}

impl From<ConfigError> for mfp_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(result) => mfp_common::Error::SchemaValidation(result.to_string()),
            other => mfp_common::Error::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().check().is_ok());
    }

    #[test]
    fn empty_object_uses_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn schema_mentions_rules() {
        let schema = PipelineConfig::json_schema().to_string();
        assert!(schema.contains("rules"));
        assert!(schema.contains("columns"));
    }

    #[test]
    fn invalid_config_maps_to_schema_validation() {
        let mut config = PipelineConfig::default();
        config.rules.strides.clear();
        let err: mfp_common::Error = config.check().unwrap_err().into();
        assert_eq!(err.code(), 12);
    }
}
