//! PD1 column schema.
//!
//! Declares, for every raw column found in the PD1 `jsonl` records, whether it
//! survives assembly, what it is renamed to, whether cells hold scalars or
//! per-step lists, and what role the column plays downstream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cell shape of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Scalar,
    /// One entry per recorded training step.
    List,
}

/// Downstream role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Hyperparameter,
    Metric,
    Other,
}

/// One column schema entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    /// Raw column name as it appears in the archive.
    pub name: String,

    pub keep: bool,

    #[serde(default)]
    pub rename: Option<String>,

    pub kind: ColumnKind,

    pub role: ColumnRole,
}

impl ColumnSpec {
    fn new(name: &str, keep: bool, rename: Option<&str>, kind: ColumnKind, role: ColumnRole) -> Self {
        Self {
            name: name.to_string(),
            keep,
            rename: rename.map(str::to_string),
            kind,
            role,
        }
    }

    /// Column name after renaming.
    pub fn output_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered list of column schema entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ColumnSchema(pub Vec<ColumnSpec>);

impl ColumnSchema {
    pub fn specs(&self) -> &[ColumnSpec] {
        &self.0
    }

    /// Look up an entry by raw name.
    pub fn get(&self, raw_name: &str) -> Option<&ColumnSpec> {
        self.0.iter().find(|c| c.name == raw_name)
    }

    /// Whether a raw column holds per-step lists.
    pub fn is_list(&self, raw_name: &str) -> bool {
        self.get(raw_name)
            .map(|c| c.kind == ColumnKind::List)
            .unwrap_or(false)
    }

    /// Whether a raw column survives assembly.
    pub fn keeps(&self, raw_name: &str) -> bool {
        self.get(raw_name).map(|c| c.keep).unwrap_or(false)
    }

    /// Output names of kept list columns, in schema order.
    pub fn list_columns(&self) -> Vec<String> {
        self.kept()
            .filter(|c| c.kind == ColumnKind::List)
            .map(|c| c.output_name().to_string())
            .collect()
    }

    /// Output names of kept hyperparameter columns, in schema order.
    pub fn hyperparameters(&self) -> Vec<String> {
        self.kept()
            .filter(|c| c.role == ColumnRole::Hyperparameter)
            .map(|c| c.output_name().to_string())
            .collect()
    }

    /// Output names of kept metric columns, in schema order.
    pub fn metrics(&self) -> Vec<String> {
        self.kept()
            .filter(|c| c.role == ColumnRole::Metric)
            .map(|c| c.output_name().to_string())
            .collect()
    }

    /// Whether `output_name` names a kept column.
    pub fn has_output(&self, output_name: &str) -> bool {
        self.kept().any(|c| c.output_name() == output_name)
    }

    fn kept(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.0.iter().filter(|c| c.keep)
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        use ColumnKind::{List, Scalar};
        use ColumnRole::{Hyperparameter, Metric, Other};

        ColumnSchema(vec![
            ColumnSpec::new("dataset", true, None, Scalar, Other),
            ColumnSpec::new("model", true, None, Scalar, Other),
            ColumnSpec::new("hparams.batch_size", true, Some("batch_size"), Scalar, Other),
            ColumnSpec::new("hparams.activation_fn", true, Some("activation_fn"), Scalar, Other),
            ColumnSpec::new(
                "hparams.lr_hparams.decay_steps_factor",
                true,
                Some("lr_decay_factor"),
                Scalar,
                Hyperparameter,
            ),
            ColumnSpec::new(
                "hparams.lr_hparams.initial_value",
                true,
                Some("lr_initial"),
                Scalar,
                Hyperparameter,
            ),
            ColumnSpec::new("hparams.lr_hparams.power", true, Some("lr_power"), Scalar, Hyperparameter),
            ColumnSpec::new(
                "hparams.opt_hparams.momentum",
                true,
                Some("opt_momentum"),
                Scalar,
                Hyperparameter,
            ),
            ColumnSpec::new("epoch", true, None, List, Other),
            ColumnSpec::new("valid/error_rate", true, Some("valid_error_rate"), List, Metric),
            ColumnSpec::new("test/error_rate", true, Some("test_error_rate"), List, Metric),
            ColumnSpec::new("train_cost", true, None, List, Metric),
            ColumnSpec::new("global_step", false, None, List, Other),
            ColumnSpec::new("eval_time", false, None, List, Other),
            ColumnSpec::new("train/ce_loss", false, None, List, Metric),
            ColumnSpec::new("valid/ce_loss", false, None, List, Metric),
            ColumnSpec::new("test/ce_loss", false, None, List, Metric),
            ColumnSpec::new("hparams.opt_name", false, None, Scalar, Other),
            ColumnSpec::new("hparams.lr_hparams.schedule", false, None, Scalar, Other),
            ColumnSpec::new("hparams.total_steps", false, None, Scalar, Other),
            ColumnSpec::new("trial_dir", false, None, Scalar, Other),
            ColumnSpec::new("study_dir", false, None, Scalar, Other),
            ColumnSpec::new("status", false, None, Scalar, Other),
        ])
    }
}
