//! Per-dataset processing rules.
//!
//! The PD1 groups are not uniform: transformer groups never recorded test
//! error, a handful of groups diverge and need their cost curves clipped, and
//! some groups report progress in sub-epoch ticks. Every such special case
//! lives here as data so the pipeline itself stays generic.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A (matched, phase) slice of the assembled table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Slice {
    pub matched: bool,
    pub phase: i64,
}

/// How a cost filter decides which rows or runs to keep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostFilterKind {
    /// Keep rows whose cumulative cost is strictly below `threshold`.
    Below { threshold: f64 },
    /// Keep whole configurations whose maximum cumulative cost is strictly
    /// below the `q`-quantile of all configurations' maxima.
    Quantile { q: f64 },
}

/// A cost filter bound to one dataset group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostFilter {
    /// Group name, `{dataset}-{model}-{batch_size}`.
    pub group: String,

    #[serde(flatten)]
    pub kind: CostFilterKind,
}

/// Per-dataset processing rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DatasetRules {
    /// Output columns identifying a dataset group, in key order.
    pub group_columns: Vec<String>,

    pub step_column: String,
    pub cost_column: String,
    pub test_error_column: String,
    pub activation_column: String,

    /// Datasets without test-error curves.
    pub transformer_datasets: Vec<String>,

    /// Datasets whose step curves are degenerate and get renumbered `1..=n`.
    pub step_remap_datasets: Vec<String>,

    /// Groups that vary the activation function as a hyperparameter.
    pub activation_fn_groups: Vec<String>,

    pub cost_filters: Vec<CostFilter>,

    /// Slice kept for tabular output.
    pub tabular_slice: Slice,

    /// Per-group replacements for `tabular_slice`.
    pub tabular_overrides: BTreeMap<String, Slice>,

    /// Name fragments marking groups that report sub-epoch fidelities.
    pub sub_epoch_markers: Vec<String>,

    /// Subsampling strides for sub-epoch tabular output.
    pub strides: Vec<u32>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DatasetRules {
    fn default() -> Self {
        let mut tabular_overrides = BTreeMap::new();
        tabular_overrides.insert(
            "imagenet-resnet-1024".to_string(),
            Slice {
                matched: false,
                phase: 0,
            },
        );

        Self {
            group_columns: strings(&["dataset", "model", "batch_size"]),
            step_column: "epoch".to_string(),
            cost_column: "train_cost".to_string(),
            test_error_column: "test_error_rate".to_string(),
            activation_column: "activation_fn".to_string(),
            transformer_datasets: strings(&["uniref50", "translate_wmt", "imagenet", "lm1b"]),
            step_remap_datasets: strings(&["uniref50"]),
            activation_fn_groups: strings(&[
                "fashion_mnist-max_pooling_cnn-256",
                "fashion_mnist-max_pooling_cnn-2048",
                "mnist-max_pooling_cnn-256",
                "mnist-max_pooling_cnn-2048",
            ]),
            cost_filters: vec![
                CostFilter {
                    group: "lm1b-transformer-2048".to_string(),
                    kind: CostFilterKind::Below { threshold: 10_000.0 },
                },
                CostFilter {
                    group: "uniref50-transformer-128".to_string(),
                    kind: CostFilterKind::Below { threshold: 4_000.0 },
                },
                CostFilter {
                    group: "imagenet-resnet-512".to_string(),
                    kind: CostFilterKind::Quantile { q: 0.95 },
                },
                CostFilter {
                    group: "cifar100-wide_resnet-2048".to_string(),
                    kind: CostFilterKind::Quantile { q: 0.93 },
                },
            ],
            tabular_slice: Slice {
                matched: true,
                phase: 1,
            },
            tabular_overrides,
            sub_epoch_markers: strings(&["imagenet", "uniref", "xformer"]),
            strides: vec![1, 2, 5, 10],
        }
    }
}

impl DatasetRules {
    pub fn is_transformer(&self, dataset: &str) -> bool {
        self.transformer_datasets.iter().any(|d| d == dataset)
    }

    pub fn remaps_steps(&self, dataset: &str) -> bool {
        self.step_remap_datasets.iter().any(|d| d == dataset)
    }

    pub fn varies_activation_fn(&self, group: &str) -> bool {
        self.activation_fn_groups.iter().any(|g| g == group)
    }

    pub fn cost_filter(&self, group: &str) -> Option<CostFilterKind> {
        self.cost_filters
            .iter()
            .find(|f| f.group == group)
            .map(|f| f.kind)
    }

    pub fn tabular_slice_for(&self, group: &str) -> Slice {
        self.tabular_overrides
            .get(group)
            .copied()
            .unwrap_or(self.tabular_slice)
    }

    /// Whether a group (or any file name derived from it) reports sub-epoch steps.
    pub fn is_sub_epoch(&self, name: &str) -> bool {
        self.sub_epoch_markers.iter().any(|m| name.contains(m.as_str()))
    }
}
