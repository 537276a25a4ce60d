//! End-to-end runs of the PD1 pipeline over synthetic archives.

mod common;

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use common::{CIFAR, UNIREF, UNIREF_STEPS};
use mfp_common::{ConfigId, Error};
use mfp_core::benchmark::{Benchmark, Config, Pd1Spec, TabularBenchmark};
use mfp_core::pd1::{process_pd1, Manifest, ProcessMode, ProcessOptions};
use mfp_core::ResultFrame;
use mfp_math::is_non_decreasing;
use mfp_tables::frame::{f64_values, has_column, i64_values, str_values};
use mfp_tables::{read_csv, read_parquet, INDEX_COLUMNS_KEY};
use polars::prelude::DataFrame;

const HPS: [&str; 4] = ["lr_decay_factor", "lr_initial", "lr_power", "opt_momentum"];

fn hp_keys(frame: &DataFrame) -> Vec<String> {
    let columns: Vec<Vec<Option<String>>> =
        HPS.iter().map(|h| str_values(frame, h).unwrap()).collect();
    (0..frame.height())
        .map(|row| {
            columns
                .iter()
                .map(|c| c[row].clone().unwrap_or_default())
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect()
}

fn ints(frame: &DataFrame, column: &str) -> Vec<i64> {
    i64_values(frame, column).unwrap().into_iter().map(Option::unwrap).collect()
}

fn floats(frame: &DataFrame, column: &str) -> Vec<f64> {
    f64_values(frame, column).unwrap().into_iter().map(Option::unwrap).collect()
}

fn run(tarball: &Path, mode: ProcessMode) -> mfp_core::pd1::ProcessSummary {
    process_pd1(tarball, &ProcessOptions::new(mode)).unwrap()
}

#[test]
fn surrogate_tables_are_deduplicated_with_cumulative_cost() {
    let (dir, tarball) = common::data_dir_with_tarball();
    let summary = run(&tarball, ProcessMode::Surrogate);
    assert_eq!(summary.tables.len(), 2);
    assert!(summary.reindexed.is_empty());
    assert!(dir.path().join("raw/README.txt").exists());

    for name in [CIFAR, UNIREF] {
        let path = dir.path().join(format!("{name}_surrogate.csv"));
        let frame = read_csv(&path, |_| false).unwrap();
        assert!(frame.height() > 0, "{name} is empty");
        assert!(!has_column(&frame, "matched"));
        assert!(!has_column(&frame, "phase"));
        assert!(!has_column(&frame, "dataset"));

        let epochs = floats(&frame, "epoch");
        let cost = floats(&frame, "train_cost");
        let mut seen = HashSet::new();
        let mut costs: std::collections::HashMap<String, Vec<f64>> = Default::default();
        for (row, key) in hp_keys(&frame).into_iter().enumerate() {
            assert!(
                seen.insert(format!("{key}@{}", epochs[row])),
                "duplicate (config, epoch) in {name}"
            );
            costs.entry(key).or_default().push(cost[row]);
        }
        for series in costs.values() {
            assert!(is_non_decreasing(series), "{series:?}");
        }
    }

    // The outlier configuration (largest cumulative cost) is filtered out.
    let cifar = read_csv(&dir.path().join(format!("{CIFAR}_surrogate.csv")), |_| false).unwrap();
    let lrs = floats(&cifar, "lr_initial");
    assert!(!lrs.contains(&0.02));
    assert!(lrs.contains(&0.05));

    // Transformer tables carry no test error and renumbered steps.
    let uniref = read_csv(&dir.path().join(format!("{UNIREF}_surrogate.csv")), |_| false).unwrap();
    assert!(!has_column(&uniref, "test_error_rate"));
    let epochs: BTreeSet<i64> = floats(&uniref, "epoch").into_iter().map(|e| e as i64).collect();
    assert_eq!(epochs, (1..=UNIREF_STEPS as i64).collect());
}

#[test]
fn tabular_run_writes_indexed_parquet_and_manifest() {
    let (dir, tarball) = common::data_dir_with_tarball();
    let summary = run(&tarball, ProcessMode::Tabular);
    assert_eq!(summary.reindexed.len(), 2);

    // Epoch-level table: the two-epoch configuration is dropped.
    let table = read_parquet(&dir.path().join(format!("{CIFAR}_tabular.parquet"))).unwrap();
    assert_eq!(table.metadata_value(INDEX_COLUMNS_KEY), Some("id,epoch"));
    assert_eq!(ints(&table.frame, "id"), vec![1, 1, 1, 2, 2, 2]);
    assert_eq!(ints(&table.frame, "epoch"), vec![1, 2, 3, 1, 2, 3]);

    // Sub-epoch tables: dense ids and steps, strided subsets of stride 1.
    let stride_one = read_parquet(&dir.path().join(format!("{UNIREF}_tabular-1.parquet"))).unwrap();
    let one_original = floats(&stride_one.frame, "original_steps");
    let all_original: BTreeSet<String> = one_original.iter().map(f64::to_string).collect();
    assert_eq!(all_original.len(), UNIREF_STEPS);
    for k in [1, 2, 5, 10] {
        let path = dir.path().join(format!("{UNIREF}_tabular-{k}.parquet"));
        let frame = read_parquet(&path).unwrap().frame;
        let ids = ints(&frame, "id");
        let epochs = ints(&frame, "epoch");
        let per_config = epochs.len() / 2;
        let expected: Vec<i64> = (1..=per_config as i64).chain(1..=per_config as i64).collect();
        assert_eq!(epochs, expected, "stride {k}");
        assert_eq!(ids.iter().copied().collect::<BTreeSet<_>>(), BTreeSet::from([1, 2]));

        let original = floats(&frame, "original_steps");
        assert!(original.iter().all(|o| all_original.contains(&o.to_string())));
        assert_eq!(original[0], one_original[0]);
    }

    // Twelve steps at stride 5 keep the first and the last.
    let stride_five = read_parquet(&dir.path().join(format!("{UNIREF}_tabular-5.parquet"))).unwrap();
    assert_eq!(stride_five.frame.height(), 4);
    assert_eq!(floats(&stride_five.frame, "original_steps"), vec![0.1, 1.2, 0.1, 1.2]);

    let manifest = Manifest::load(&summary.manifest_path).unwrap();
    assert_eq!(manifest.mode, ProcessMode::Tabular);
    assert_eq!(manifest.files.len(), 2 + 1 + 4);
    for entry in &manifest.files {
        assert_eq!(entry.sha256.len(), 64);
        assert!(dir.path().join(&entry.path).exists(), "{}", entry.path);
    }
}

#[test]
fn tabular_benchmark_answers_queries() {
    let (dir, tarball) = common::data_dir_with_tarball();
    run(&tarball, ProcessMode::Tabular);

    let spec = Pd1Spec::lookup(CIFAR).unwrap();
    let bench = TabularBenchmark::open(dir.path(), spec, None).unwrap();
    let first = bench.config_by_id(ConfigId(1)).unwrap();
    assert_eq!(first.get("lr_initial"), Some(0.01));
    spec.validate(&first).unwrap();

    let last = bench.query(&first, None).unwrap();
    assert_eq!(last.fidelity, 3);
    assert!((last.train_cost - 6.0).abs() < 1e-9);
    assert!(last.test_error_rate.is_some());

    let unknown = first.clone().with("lr_initial", 0.5);
    assert!(matches!(bench.query(&unknown, None), Err(Error::ConfigNotFound(_))));
    assert!(matches!(
        bench.query(&first, Some(9)),
        Err(Error::FidelityOutOfRange { .. })
    ));

    let mut results = ResultFrame::new();
    for (_, config) in bench.configs() {
        results.extend(bench.trajectory(config, None, None, None).unwrap());
    }
    let corr = results.correlations(Some([1, 3].as_slice())).unwrap();
    assert_eq!(corr.len(), 2);

    let uniref = Pd1Spec::lookup(UNIREF).unwrap();
    let strided = TabularBenchmark::open(dir.path(), uniref, Some(5)).unwrap();
    assert_eq!(strided.iter_fidelities(), vec![1, 2]);
    let config: Config = strided.config_by_id(ConfigId(2)).unwrap();
    let r = strided.query(&config, None).unwrap();
    assert_eq!(r.original_step, Some(1.2));
    assert!(r.test_error_rate.is_none());
}

#[test]
fn rerun_reuses_unpacked_cache() {
    let (dir, tarball) = common::data_dir_with_tarball();
    run(&tarball, ProcessMode::Surrogate);

    let cache = dir.path().join("raw/pd1_matched_phase1_results_unpacked.csv");
    let before = fs::read(&cache).unwrap();
    let first = fs::read(dir.path().join(format!("{CIFAR}_surrogate.csv"))).unwrap();

    // The tarball is no longer needed once raw/ is populated.
    fs::remove_file(&tarball).unwrap();
    run(&tarball, ProcessMode::Surrogate);

    assert_eq!(fs::read(&cache).unwrap(), before);
    assert_eq!(fs::read(dir.path().join(format!("{CIFAR}_surrogate.csv"))).unwrap(), first);
}

#[test]
fn malformed_archive_line_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    common::write_raw_dir(&raw);
    common::write_archive(
        &raw.join("pd1_unmatched_phase1_results.jsonl.gz"),
        &[common::cifar(0.04, 0.5, 3).record().to_string(), "{not json".to_string()],
    );

    let err = process_pd1(
        &dir.path().join("data.tar.gz"),
        &ProcessOptions::new(ProcessMode::Surrogate),
    )
    .unwrap_err();
    match err {
        Error::MalformedRecord { line, .. } => assert_eq!(line, 2),
        other => panic!("expected a malformed record, got {other}"),
    }
}
