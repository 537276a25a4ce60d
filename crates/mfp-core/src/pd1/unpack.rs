//! Raw archive unpacking with a flattened CSV cache.
//!
//! Each `(matched, phase)` combination ships as one gzip-compressed JSON
//! lines archive. The first unpack writes `<raw>_unpacked.csv` next to the
//! archive; later runs load that cache instead of decoding the archive again.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use mfp_common::{Error, Result};
use mfp_config::ColumnSchema;
use mfp_tables::{frame_from_records, read_csv, sanitize_json_tokens, write_csv};
use polars::prelude::DataFrame;
use serde_json::{Map, Value as Json};
use tracing::{debug, info};

/// One of the four raw PD1 result archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datapack {
    pub matched: bool,
    pub phase: u8,
    pub dir: PathBuf,
}

impl Datapack {
    pub fn new(matched: bool, phase: u8, dir: impl Into<PathBuf>) -> Self {
        Self {
            matched,
            phase,
            dir: dir.into(),
        }
    }

    /// `pd1_{matched|unmatched}_phase{p}_results`
    pub fn raw_name(&self) -> String {
        let m = if self.matched { "matched" } else { "unmatched" };
        format!("pd1_{m}_phase{}_results", self.phase)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl.gz", self.raw_name()))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(format!("{}_unpacked.csv", self.raw_name()))
    }

    /// Load this archive as a frame of raw columns.
    ///
    /// The archive must exist even when a cache is present. List-kind
    /// columns of `schema` are parsed back into lists when loading the cache.
    pub fn unpack(&self, schema: &ColumnSchema) -> Result<DataFrame> {
        let archive = self.archive_path();
        if !archive.exists() {
            return Err(Error::ArchiveNotFound { path: archive });
        }

        let cache = self.cache_path();
        if cache.exists() {
            info!(cache = %cache.display(), "loading unpacked cache");
            let frame = read_csv(&cache, |c| schema.is_list(c))?;
            debug!(rows = frame.height(), columns = frame.width(), "cache loaded");
            return Ok(frame);
        }

        info!(archive = %archive.display(), "unpacking archive");
        let frame = read_archive(&archive, schema)?;
        write_csv(&frame, &cache)?;
        info!(
            cache = %cache.display(),
            rows = frame.height(),
            columns = frame.width(),
            "wrote unpacked cache"
        );
        Ok(frame)
    }
}

/// Decode a gzip JSON lines archive into a frame. Blank lines are skipped
/// and list-kind columns of `schema` become float lists.
pub fn read_archive(path: &Path, schema: &ColumnSchema) -> Result<DataFrame> {
    let reader = BufReader::new(GzDecoder::new(File::open(path)?));
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |reason: String| Error::MalformedRecord {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        };
        let json: Json =
            serde_json::from_str(&sanitize_json_tokens(&line)).map_err(|e| malformed(e.to_string()))?;
        let Json::Object(object) = json else {
            return Err(malformed("expected a JSON object".to_string()));
        };
        let mut flat = Map::new();
        flatten_into("", object, &mut flat);
        records.push(flat);
    }

    Ok(frame_from_records(&records, |c| schema.is_list(c))?)
}

/// Nested objects become dotted keys, so `{"hparams": {"batch_size": 256}}`
/// yields `hparams.batch_size`.
fn flatten_into(prefix: &str, object: Map<String, Json>, out: &mut Map<String, Json>) {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Json::Object(inner) => flatten_into(&name, inner, out),
            other => {
                out.insert(name, other);
            }
        }
    }
}
