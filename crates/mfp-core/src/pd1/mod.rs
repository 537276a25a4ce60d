//! PD1 raw-data processing pipeline.
//!
//! Stages, in run order:
//! - [`unpack`]: decode each raw archive, caching a flattened CSV
//! - [`assemble`]: tag, prune and stack the four archives
//! - [`reshape`]: explode per-step curves into one table per dataset group
//! - [`reindex`]: `(id, step)` indexing and Parquet output for tabular tables
//! - [`process`]: tarball extraction, orchestration and the run manifest

pub mod assemble;
pub mod process;
pub mod reindex;
pub mod reshape;
pub mod unpack;

pub use assemble::{assemble, datapacks};
pub use process::{extract_tarball, process_pd1, Manifest, ManifestEntry, ProcessOptions, ProcessSummary};
pub use reindex::{reindex_tabular, ReindexReport};
pub use reshape::{reshape_all, reshape_group, GroupTable, ProcessMode};
pub use unpack::Datapack;
