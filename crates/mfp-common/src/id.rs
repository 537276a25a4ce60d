//! Dataset, configuration, and run identity types.
//!
//! A PD1 dataset group is uniquely identified by the (dataset, model,
//! batch size) triple, rendered as `{dataset}-{model}-{batch_size}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one PD1 dataset group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub dataset: String,
    pub model: String,
    pub batch_size: u32,
}

impl DatasetKey {
    pub fn new(dataset: impl Into<String>, model: impl Into<String>, batch_size: u32) -> Self {
        DatasetKey {
            dataset: dataset.into(),
            model: model.into(),
            batch_size,
        }
    }

    /// Parse a `{dataset}-{model}-{batch_size}` name.
    ///
    /// Dataset and model names use underscores, never hyphens.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let dataset = parts.next().filter(|p| !p.is_empty())?;
        let model = parts.next().filter(|p| !p.is_empty())?;
        let batch_size = parts.next()?.parse::<u32>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(DatasetKey::new(dataset, model, batch_size))
    }

    /// File name of the surrogate table for this group.
    pub fn surrogate_file(&self) -> String {
        format!("{}_surrogate.csv", self)
    }

    /// File name of the tabular table for this group.
    pub fn tabular_file(&self) -> String {
        format!("{}_tabular.csv", self)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.dataset, self.model, self.batch_size)
    }
}

/// Dense, 1-based configuration id assigned during tabular re-indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(pub u32);

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ConfigId {
    fn from(id: u32) -> Self {
        ConfigId(id)
    }
}

/// Identifier of one processing run.
///
/// Format: `run-<date>-<time>-<random>`
/// Example: `run-20260115-143022-abc123`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4()
            .to_string()
            .chars()
            .take(6)
            .collect();
        RunId(format!("run-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }

    /// Parse an existing run ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("run-") && s.len() > 19 {
            Some(RunId(s.to_string()))
        } else {
            None
        }
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
