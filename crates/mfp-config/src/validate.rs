//! Semantic validation of pipeline configuration.
//!
//! Serde only guarantees shape; these checks catch configurations that parse
//! but would make the pipeline misbehave (a missing cost column, a quantile
//! of 1.5, a zero stride).

use std::collections::HashSet;
use std::fmt;

use crate::columns::ColumnKind;
use crate::rules::CostFilterKind;
use crate::PipelineConfig;

/// One validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating a configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msgs: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", msgs.join("; "))
    }
}

/// Validate a pipeline configuration.
pub fn validate(config: &PipelineConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !mfp_common::schema::is_compatible(&config.schema_version) {
        result.error(
            "schema_version",
            format!("incompatible version {}", config.schema_version),
        );
    }

    let columns = &config.columns;
    let rules = &config.rules;

    let mut raw_names = HashSet::new();
    let mut output_names = HashSet::new();
    for spec in columns.specs() {
        if !raw_names.insert(spec.name.as_str()) {
            result.error("columns", format!("duplicate raw column '{}'", spec.name));
        }
        if spec.keep && !output_names.insert(spec.output_name()) {
            result.error(
                "columns",
                format!("duplicate output column '{}'", spec.output_name()),
            );
        }
    }

    if columns.hyperparameters().is_empty() {
        result.error("columns", "no hyperparameter columns are kept");
    }

    for col in &rules.group_columns {
        if !columns.has_output(col) {
            result.error("rules.group_columns", format!("'{col}' is not a kept column"));
        }
    }
    if rules.group_columns.len() != 3 {
        result.error(
            "rules.group_columns",
            "expected exactly (dataset, model, batch_size)",
        );
    }

    for (field, col) in [
        ("rules.step_column", &rules.step_column),
        ("rules.cost_column", &rules.cost_column),
    ] {
        let is_kept_list = columns
            .specs()
            .iter()
            .any(|c| c.keep && c.output_name() == col && c.kind == ColumnKind::List);
        if !is_kept_list {
            result.error(field, format!("'{col}' must be a kept list column"));
        }
    }

    if !columns.has_output(&rules.activation_column) {
        result
            .warnings
            .push(format!("activation column '{}' is not kept", rules.activation_column));
    }

    for filter in &rules.cost_filters {
        match filter.kind {
            CostFilterKind::Below { threshold } => {
                if !threshold.is_finite() {
                    result.error(
                        "rules.cost_filters",
                        format!("{}: threshold must be finite", filter.group),
                    );
                }
            }
            CostFilterKind::Quantile { q } => {
                if !(q > 0.0 && q < 1.0) {
                    result.error(
                        "rules.cost_filters",
                        format!("{}: quantile {q} outside (0, 1)", filter.group),
                    );
                }
            }
        }
    }

    if rules.strides.is_empty() {
        result.error("rules.strides", "at least one stride is required");
    }
    if rules.strides.iter().any(|s| *s == 0) {
        result.error("rules.strides", "strides must be positive");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::CostFilter;

    #[test]
    fn test_default_has_no_errors() {
        let result = validate(&PipelineConfig::default());
        assert!(result.is_valid(), "{result}");
    }

    #[test]
    fn test_rejects_bad_quantile() {
        let mut config = PipelineConfig::default();
        config.rules.cost_filters.push(CostFilter {
            group: "x-y-1".into(),
            kind: CostFilterKind::Quantile { q: 1.5 },
        });
        let result = validate(&config);
        assert!(!result.is_valid());
        assert!(result.to_string().contains("outside (0, 1)"));
    }

    #[test]
    fn test_rejects_zero_stride_and_missing_cost() {
        let mut config = PipelineConfig::default();
        config.rules.strides = vec![1, 0];
        config.rules.cost_column = "nope".into();
        let result = validate(&config);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_rejects_duplicate_output_names() {
        let mut config = PipelineConfig::default();
        let mut dup = config.columns.0[0].clone();
        dup.name = "dataset_name".into();
        dup.rename = Some("dataset".into());
        config.columns.0.push(dup);
        assert!(!validate(&config).is_valid());
    }
}
