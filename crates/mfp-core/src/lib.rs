//! PD1 multi-fidelity benchmark data layer.
//!
//! This crate provides:
//! - The PD1 processing pipeline from raw archives to per-dataset tables
//! - Tabular benchmark lookups over the re-indexed Parquet output
//! - Multi-fidelity Hartmann functions with presets and priors
//! - Result collection with cross-fidelity rank correlation
//! - Download orchestration for the benchmark data sources
//! - The `mfp` command-line interface

pub mod benchmark;
pub mod cli;
pub mod download;
pub mod exit_codes;
pub mod logging;
pub mod pd1;
pub mod result_frame;

pub use benchmark::{
    BenchResult, Benchmark, Config, FidelityRange, MfHartmann, Objective, Pd1Spec, Prior, PriorNoise,
    PriorSource, TabularBenchmark,
};
pub use exit_codes::ExitCode;
pub use result_frame::ResultFrame;
