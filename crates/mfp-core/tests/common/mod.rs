//! Synthetic PD1 raw archives shared by the integration tests.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

pub const CIFAR: &str = "cifar100-wide_resnet-2048";
pub const UNIREF: &str = "uniref50-transformer-128";

/// Sub-epoch steps recorded for the uniref50 configurations.
pub const UNIREF_STEPS: usize = 12;

pub struct Run<'a> {
    pub dataset: &'a str,
    pub model: &'a str,
    pub batch_size: u32,
    pub lr: f64,
    pub momentum: f64,
    pub epochs: Vec<f64>,
    pub step_costs: Vec<f64>,
}

impl Run<'_> {
    pub fn record(&self) -> Value {
        let errors: Vec<f64> = (0..self.epochs.len())
            .map(|i| 0.9 - 0.05 * i as f64 - self.lr)
            .collect();
        json!({
            "dataset": self.dataset,
            "model": self.model,
            "hparams": {
                "batch_size": self.batch_size,
                "activation_fn": "relu",
                "opt_name": "nesterov",
                "total_steps": 1000,
                "lr_hparams": {
                    "decay_steps_factor": 0.5,
                    "initial_value": self.lr,
                    "power": 1.0,
                    "schedule": "polynomial"
                },
                "opt_hparams": { "momentum": self.momentum }
            },
            "epoch": self.epochs,
            "global_step": (1..=self.epochs.len()).map(|i| i * 100).collect::<Vec<_>>(),
            "valid/error_rate": errors,
            "test/error_rate": errors,
            "train_cost": self.step_costs,
            "status": "done",
            "trial_dir": "/tmp/trial"
        })
    }
}

pub fn cifar(lr: f64, per_step: f64, steps: usize) -> Run<'static> {
    Run {
        dataset: "cifar100",
        model: "wide_resnet",
        batch_size: 2048,
        lr,
        momentum: 0.9,
        epochs: (1..=steps).map(|e| e as f64).collect(),
        step_costs: vec![per_step; steps],
    }
}

pub fn uniref(lr: f64) -> Run<'static> {
    Run {
        dataset: "uniref50",
        model: "transformer",
        batch_size: 128,
        lr,
        momentum: 0.5,
        epochs: (1..=UNIREF_STEPS).map(|i| i as f64 / 10.0).collect(),
        step_costs: vec![10.0; UNIREF_STEPS],
    }
}

pub fn write_archive(path: &Path, lines: &[String]) {
    let mut gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    for line in lines {
        writeln!(gz, "{line}").unwrap();
    }
    gz.finish().unwrap();
}

fn lines(runs: &[Run<'_>]) -> Vec<String> {
    runs.iter().map(|r| r.record().to_string()).collect()
}

/// Populate `raw_dir` with the four PD1 archives and the README marker.
///
/// The tabular slice (matched, phase 1) holds cifar100 configurations at
/// learning rates 0.01 and 0.02 with three epochs, one at 0.03 with only two
/// epochs, and two uniref50 configurations. The cifar100 configuration at
/// 0.05 appears in two slices.
pub fn write_raw_dir(raw_dir: &Path) {
    fs::create_dir_all(raw_dir).unwrap();
    fs::write(raw_dir.join("README.txt"), "synthetic PD1 fixture\n").unwrap();

    write_archive(
        &raw_dir.join("pd1_matched_phase0_results.jsonl.gz"),
        &lines(&[cifar(0.05, 1.0, 3), uniref(0.001)]),
    );
    write_archive(
        &raw_dir.join("pd1_matched_phase1_results.jsonl.gz"),
        &lines(&[
            cifar(0.01, 2.0, 3),
            cifar(0.02, 3.0, 3),
            cifar(0.03, 4.0, 2),
            uniref(0.002),
            uniref(0.003),
        ]),
    );
    write_archive(
        &raw_dir.join("pd1_unmatched_phase0_results.jsonl.gz"),
        &lines(&[cifar(0.05, 1.5, 3)]),
    );
    write_archive(
        &raw_dir.join("pd1_unmatched_phase1_results.jsonl.gz"),
        &lines(&[cifar(0.04, 0.5, 3)]),
    );
}

/// Write the fixture as a `pd1/`-rooted tarball at `tarball`.
pub fn write_tarball(tarball: &Path) {
    let staging = tempfile::tempdir().unwrap();
    write_raw_dir(staging.path());

    let gz = GzEncoder::new(File::create(tarball).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(gz);
    let mut names: Vec<PathBuf> = fs::read_dir(staging.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    names.sort();
    for path in names {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        builder
            .append_path_with_name(&path, format!("pd1/{name}"))
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Fresh data directory with the fixture tarball at `data.tar.gz`.
pub fn data_dir_with_tarball() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let tarball = dir.path().join("data.tar.gz");
    write_tarball(&tarball);
    (dir, tarball)
}
