//! Combine the four raw archives into one tagged table.

use std::path::Path;

use mfp_common::Result;
use mfp_config::ColumnSchema;
use mfp_tables::frame::{column_names, concat_diagonal};
use mfp_tables::TableError;
use polars::prelude::*;
use tracing::info;

use super::unpack::Datapack;

/// Column tagging the matched/unmatched source of each row.
pub const MATCHED_COLUMN: &str = "matched";
/// Column tagging the phase of each row.
pub const PHASE_COLUMN: &str = "phase";

/// Source order of the raw archives: matched outer, phase inner.
pub fn datapacks(raw_dir: &Path) -> Vec<Datapack> {
    [true, false]
        .into_iter()
        .flat_map(|matched| [0, 1].map(|phase| Datapack::new(matched, phase, raw_dir)))
        .collect()
}

/// Unpack, tag, prune and rename every archive under `raw_dir`, then stack
/// the results in source order.
pub fn assemble(raw_dir: &Path, schema: &ColumnSchema) -> Result<DataFrame> {
    let mut frames = Vec::with_capacity(4);
    for pack in datapacks(raw_dir) {
        let raw = pack.unpack(schema)?;
        let mut kept: Vec<Expr> = column_names(&raw)
            .iter()
            .filter_map(|c| schema.get(c).filter(|spec| spec.keep))
            .map(|spec| col(spec.name.as_str()).alias(spec.output_name()))
            .collect();
        kept.push(lit(pack.matched).alias(MATCHED_COLUMN));
        kept.push(lit(i64::from(pack.phase)).alias(PHASE_COLUMN));
        let frame = raw.lazy().select(kept).collect().map_err(TableError::from)?;
        info!(
            source = %pack.raw_name(),
            rows = frame.height(),
            "assembled archive"
        );
        frames.push(frame);
    }

    let full = concat_diagonal(frames)?;
    info!(rows = full.height(), columns = full.width(), "assembled full table");
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_order() {
        let packs = datapacks(Path::new("raw"));
        let order: Vec<(bool, u8)> = packs.iter().map(|p| (p.matched, p.phase)).collect();
        assert_eq!(order, vec![(true, 0), (true, 1), (false, 0), (false, 1)]);
    }

    #[test]
    fn test_assemble_tags_prunes_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        for pack in datapacks(dir.path()) {
            let line = format!(
                r#"{{"dataset": "mnist", "trial_dir": "t", "hparams": {{"batch_size": {}}}, "epoch": [1]}}"#,
                if pack.matched { 256 } else { 512 }
            );
            let mut enc = flate2::write::GzEncoder::new(
                std::fs::File::create(pack.archive_path()).unwrap(),
                flate2::Compression::default(),
            );
            std::io::Write::write_all(&mut enc, line.as_bytes()).unwrap();
            enc.finish().unwrap();
        }

        let full = assemble(dir.path(), &ColumnSchema::default()).unwrap();
        assert_eq!(full.height(), 4);
        let mut names = column_names(&full);
        assert_eq!(names.split_off(3), vec![MATCHED_COLUMN, PHASE_COLUMN]);
        names.sort();
        assert_eq!(names, vec!["batch_size", "dataset", "epoch"]);
        let phases = mfp_tables::frame::i64_values(&full, PHASE_COLUMN).unwrap();
        assert_eq!(phases, vec![Some(0), Some(1), Some(0), Some(1)]);
        let sizes = mfp_tables::frame::i64_values(&full, "batch_size").unwrap();
        assert_eq!(sizes, vec![Some(256), Some(256), Some(512), Some(512)]);
    }
}
