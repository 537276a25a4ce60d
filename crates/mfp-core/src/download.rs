//! Fetching the benchmark data sources into a data root.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use mfp_common::{Error, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::pd1::{process_pd1, ProcessMode, ProcessOptions};

pub const DEFAULT_DATA_ROOT: &str = "data";

/// A downloadable data source living at `<root>/<name>`.
pub trait Source {
    fn name(&self) -> &'static str;

    fn root(&self) -> &Path;

    /// Fetch the source into [`Source::path`], which already exists.
    fn download(&self) -> Result<()>;

    fn path(&self) -> PathBuf {
        self.root().join(self.name())
    }

    fn exists(&self) -> bool {
        self.path().exists()
    }
}

/// YAHPO Gym surrogate data, cloned from git.
#[derive(Debug, Clone)]
pub struct YahpoSource {
    pub root: PathBuf,
    pub tag: String,
    pub git_url: String,
}

impl YahpoSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tag: "v1.0".to_string(),
            git_url: "https://github.com/slds-lmu/yahpo_data".to_string(),
        }
    }

    pub fn command(&self) -> Vec<String> {
        vec![
            "git".into(),
            "clone".into(),
            "--depth".into(),
            "1".into(),
            "--branch".into(),
            self.tag.clone(),
            self.git_url.clone(),
            self.path().display().to_string(),
        ]
    }
}

impl Source for YahpoSource {
    fn name(&self) -> &'static str {
        "yahpo-gym-data"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn download(&self) -> Result<()> {
        run_command(self.name(), &self.command())
    }
}

/// JAHS-Bench-201 surrogate data, fetched by its own Python downloader.
#[derive(Debug, Clone)]
pub struct JahsBenchSource {
    pub root: PathBuf,
}

impl JahsBenchSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn command(&self) -> Vec<String> {
        vec![
            "python".into(),
            "-m".into(),
            "jahs_bench.download".into(),
            "--save_dir".into(),
            self.path().display().to_string(),
        ]
    }
}

impl Source for JahsBenchSource {
    fn name(&self) -> &'static str {
        "jahs-bench-data"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn download(&self) -> Result<()> {
        run_command(self.name(), &self.command())
    }
}

/// The PD1 tarball, downloaded and then run through the processing pipeline.
#[derive(Debug, Clone)]
pub struct Pd1Source {
    pub root: PathBuf,
    pub url: String,
    pub mode: ProcessMode,
}

impl Pd1Source {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url: "http://storage.googleapis.com/gresearch/pint/pd1.tar.gz".to_string(),
            mode: ProcessMode::Surrogate,
        }
    }

    pub fn tarball(&self) -> PathBuf {
        self.path().join("data.tar.gz")
    }

    #[cfg(feature = "fetch")]
    fn fetch(&self, dest: &Path) -> Result<()> {
        let failed = |reason: String| Error::DownloadFailed {
            source_name: self.name().to_string(),
            reason,
        };
        let response = ureq::get(&self.url)
            .call()
            .map_err(|e| failed(format!("GET {}: {e}", self.url)))?;
        let mut file = fs::File::create(dest)?;
        let bytes = std::io::copy(&mut response.into_reader(), &mut file)?;
        info!(url = %self.url, bytes, "downloaded PD1 tarball");
        Ok(())
    }

    #[cfg(not(feature = "fetch"))]
    fn fetch(&self, dest: &Path) -> Result<()> {
        Err(Error::DownloadFailed {
            source_name: self.name().to_string(),
            reason: format!(
                "built without the `fetch` feature; download {} to {} and run `mfp process`",
                self.url,
                dest.display()
            ),
        })
    }
}

impl Source for Pd1Source {
    fn name(&self) -> &'static str {
        "pd1-data"
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn download(&self) -> Result<()> {
        let tarball = self.tarball();
        info!(url = %self.url, dest = %tarball.display(), "downloading PD1");
        self.fetch(&tarball)?;
        process_pd1(&tarball, &ProcessOptions::new(self.mode))?;
        Ok(())
    }
}

/// Every known source under `root`.
pub fn default_sources(root: &Path) -> Vec<Box<dyn Source>> {
    vec![
        Box::new(YahpoSource::new(root)),
        Box::new(JahsBenchSource::new(root)),
        Box::new(Pd1Source::new(root)),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloaded,
    AlreadyPresent,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub name: String,
    pub path: PathBuf,
    pub status: DownloadStatus,
}

/// Download each source not already present under `root`.
///
/// With `force`, existing source directories are removed first. Stops at
/// the first failure.
pub fn download_all(root: &Path, force: bool, sources: &[Box<dyn Source>]) -> Result<Vec<DownloadOutcome>> {
    fs::create_dir_all(root)?;
    let mut outcomes = Vec::with_capacity(sources.len());

    for source in sources {
        let path = source.path();
        if force && source.exists() {
            warn!(source = source.name(), path = %path.display(), "removing existing data");
            fs::remove_dir_all(&path)?;
        }

        let status = if source.exists() {
            info!(source = source.name(), path = %path.display(), "already downloaded");
            DownloadStatus::AlreadyPresent
        } else {
            fs::create_dir_all(&path)?;
            info!(source = source.name(), path = %path.display(), "downloading");
            source.download()?;
            DownloadStatus::Downloaded
        };

        if !source.exists() {
            return Err(Error::DownloadFailed {
                source_name: source.name().to_string(),
                reason: format!("{} missing after download", path.display()),
            });
        }
        outcomes.push(DownloadOutcome {
            name: source.name().to_string(),
            path,
            status,
        });
    }
    Ok(outcomes)
}

fn run_command(source_name: &str, argv: &[String]) -> Result<()> {
    let failed = |reason: String| Error::DownloadFailed {
        source_name: source_name.to_string(),
        reason,
    };
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| failed("empty command".to_string()))?;
    info!(source = source_name, command = %argv.join(" "), "running");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| failed(format!("{program}: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!("{program} exited {}: {}", output.status, stderr.trim())));
    }
    Ok(())
}
