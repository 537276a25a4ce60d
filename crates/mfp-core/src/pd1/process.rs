//! End-to-end PD1 processing: tarball → raw archives → per-dataset tables.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use mfp_common::{Error, Result, RunId, SCHEMA_VERSION};
use mfp_config::PipelineConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::assemble::assemble;
use super::reindex::{reindex_tabular, ReindexReport};
use super::reshape::{reshape_all, GroupTable, ProcessMode};

/// Folder the PD1 tarball unpacks into.
const TARBALL_ROOT: &str = "pd1";
/// Marker whose presence means `raw/` is already populated.
const RAW_MARKER: &str = "README.txt";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Options for [`process_pd1`].
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub mode: ProcessMode,
    pub config: PipelineConfig,
}

impl ProcessOptions {
    pub fn new(mode: ProcessMode) -> Self {
        Self {
            mode,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }
}

/// One output file of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the data directory.
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Record of what a processing run wrote, stored as `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    pub run_id: RunId,
    pub mode: ProcessMode,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Result of [`process_pd1`].
#[derive(Debug, Clone)]
pub struct ProcessSummary {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub tables: Vec<GroupTable>,
    pub reindexed: Vec<ReindexReport>,
}

/// Process the PD1 tarball at `tarball`.
///
/// Outputs land next to the tarball; raw archives are unpacked into `raw/`
/// unless `raw/README.txt` already exists.
pub fn process_pd1(tarball: &Path, options: &ProcessOptions) -> Result<ProcessSummary> {
    let data_dir = tarball
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let raw_dir = data_dir.join("raw");
    let run_id = RunId::new();
    let config = &options.config;
    let mode = options.mode;
    info!(run_id = %run_id, data_dir = %data_dir.display(), mode = %mode, "processing PD1");

    if !raw_dir.join(RAW_MARKER).exists() {
        if !tarball.exists() {
            return Err(Error::ArchiveNotFound {
                path: tarball.to_path_buf(),
            });
        }
        fs::create_dir_all(&raw_dir)?;
        extract_tarball(tarball, &raw_dir)?;
    }

    let full = assemble(&raw_dir, &config.columns)?;

    let mut reindexed = Vec::new();
    let tables = reshape_all(&full, mode, config, data_dir, |table| {
        if mode == ProcessMode::Tabular {
            if let Some(report) = reindex_tabular(&table.path, config)? {
                reindexed.push(report);
            }
        }
        Ok(())
    })?;

    let outputs = tables
        .iter()
        .map(|t| t.path.clone())
        .chain(reindexed.iter().flat_map(|r| r.written.iter().cloned()));
    let files = outputs
        .map(|p| manifest_entry(data_dir, &p))
        .collect::<Result<Vec<_>>>()?;

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        run_id,
        mode,
        created_at: Utc::now(),
        files,
    };
    let manifest_path = data_dir.join(MANIFEST_FILE);
    let writer = BufWriter::new(File::create(&manifest_path)?);
    serde_json::to_writer_pretty(writer, &manifest)?;
    info!(
        manifest = %manifest_path.display(),
        tables = tables.len(),
        files = manifest.files.len(),
        "processing complete"
    );

    Ok(ProcessSummary {
        manifest,
        manifest_path,
        tables,
        reindexed,
    })
}

/// Unpack a `.tar.gz` into `raw_dir`, dropping a leading `pd1/` folder.
pub fn extract_tarball(tarball: &Path, raw_dir: &Path) -> Result<usize> {
    info!(tarball = %tarball.display(), dest = %raw_dir.display(), "extracting tarball");
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(tarball)?));
    let mut extracted = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(relative) = flattened_member_path(&path) else {
            warn!(member = %path.display(), "skipping unsafe or empty tarball member");
            continue;
        };
        let dest = raw_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest)?;
        extracted += 1;
    }
    info!(members = extracted, "tarball extracted");
    Ok(extracted)
}

fn flattened_member_path(path: &Path) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.first().is_some_and(|p| *p == TARBALL_ROOT) {
        parts.remove(0);
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

fn manifest_entry(data_dir: &Path, path: &Path) -> Result<ManifestEntry> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut file, &mut hasher)?;
    let relative = path.strip_prefix(data_dir).unwrap_or(path);
    Ok(ManifestEntry {
        path: relative.display().to_string(),
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_member_path() {
        assert_eq!(
            flattened_member_path(Path::new("pd1/README.txt")),
            Some(PathBuf::from("README.txt"))
        );
        assert_eq!(
            flattened_member_path(Path::new("./pd1/a/b.jsonl.gz")),
            Some(PathBuf::from("a/b.jsonl.gz"))
        );
        assert_eq!(
            flattened_member_path(Path::new("other/x")),
            Some(PathBuf::from("other/x"))
        );
        assert_eq!(flattened_member_path(Path::new("pd1/")), None);
        assert_eq!(flattened_member_path(Path::new("../etc/passwd")), None);
    }

    #[test]
    fn test_missing_tarball_without_raw_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = process_pd1(
            &dir.path().join("data.tar.gz"),
            &ProcessOptions::new(ProcessMode::Surrogate),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound { .. }));
    }

    #[test]
    fn test_manifest_entry_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        fs::write(&path, b"abc").unwrap();
        let entry = manifest_entry(dir.path(), &path).unwrap();
        assert_eq!(entry.path, "a.csv");
        assert_eq!(entry.bytes, 3);
        assert_eq!(
            entry.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
