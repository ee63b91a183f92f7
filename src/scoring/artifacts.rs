//! Files written by a scoring run.
//!
//! ```text
//! <output_dir>/
//!   run_manifest.json
//!   checkpoint
//!   partitions/batch_0000.tsv.gz          full per-track rows
//!   partitions/batch_0000.summary.tsv     per-item summaries
//!   partitions/batch_0000.failed.tsv      per-item failures
//!   predictions_summary.tsv               all summaries, by raw_max desc
//!   top_candidates.tsv
//!   failed_items.tsv
//! ```
//!
//! Every file is written atomically; batch files are written once per batch
//! attempt and only then is the checkpoint advanced.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::client::TrackScore;
use super::summary::ItemSummary;
use super::PersistError;
use crate::utils::io::{open_text, write_atomically};

pub const PARTITIONS_DIR: &str = "partitions";
pub const SUMMARY_FILE: &str = "predictions_summary.tsv";
pub const TOP_CANDIDATES_FILE: &str = "top_candidates.tsv";
pub const FAILED_FILE: &str = "failed_items.tsv";

/// One row of a batch's full result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRow {
    pub item_id: String,
    pub track: String,
    pub target: Option<String>,
    pub quantile_score: f64,
    pub raw_score: f64,
}

impl TrackRow {
    #[must_use]
    pub fn new(item_id: &str, score: &TrackScore) -> Self {
        Self {
            item_id: item_id.to_string(),
            track: score.track.clone(),
            target: score.target.clone(),
            quantile_score: score.quantile_score,
            raw_score: score.raw_score,
        }
    }
}

/// An item the service could not score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item_id: String,
    pub reason: String,
}

/// Paths of one batch's artifacts
#[derive(Debug, Clone)]
pub struct BatchFiles {
    pub rows: PathBuf,
    pub summary: PathBuf,
    pub failed: PathBuf,
}

impl BatchFiles {
    #[must_use]
    pub fn new(output_dir: &Path, index: usize) -> Self {
        let dir = output_dir.join(PARTITIONS_DIR);
        Self {
            rows: dir.join(format!("batch_{index:04}.tsv.gz")),
            summary: dir.join(format!("batch_{index:04}.summary.tsv")),
            failed: dir.join(format!("batch_{index:04}.failed.tsv")),
        }
    }
}

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer)
}

fn write_records<W: Write, T: Serialize>(writer: W, records: &[T]) -> io::Result<W> {
    let mut wtr = tsv_writer(writer);
    for record in records {
        wtr.serialize(record).map_err(io::Error::from)?;
    }
    wtr.into_inner().map_err(|e| e.into_error())
}

/// Write a headed TSV of `records` atomically. An empty slice still gets a
/// header, so readers can tell "no rows" from "never written".
///
/// # Errors
///
/// Returns `PersistError::Write` on any IO failure.
pub fn write_table<T: Serialize>(path: &Path, records: &[T], header: &[&str]) -> Result<(), PersistError> {
    write_atomically(path, |w| {
        if records.is_empty() {
            writeln!(w, "{}", header.join("\t"))
        } else {
            write_records(w, records).map(|_| ())
        }
    })
    .map_err(|source| PersistError::write(path, source))
}

/// Write a gzip-compressed TSV of `rows` atomically
///
/// # Errors
///
/// Returns `PersistError::Write` on any IO failure.
pub fn write_gz_rows(path: &Path, rows: &[TrackRow]) -> Result<(), PersistError> {
    write_atomically(path, |w| {
        let encoder = GzEncoder::new(w, Compression::default());
        let encoder = if rows.is_empty() {
            let mut encoder = encoder;
            writeln!(encoder, "{}", TRACK_ROW_HEADER.join("\t"))?;
            encoder
        } else {
            write_records(encoder, rows)?
        };
        encoder.finish().map(|_| ())
    })
    .map_err(|source| PersistError::write(path, source))
}

/// Read every record of a headed TSV
///
/// # Errors
///
/// Returns `PersistError::Read` if the file cannot be opened and
/// `PersistError::Corrupt` for malformed records.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistError> {
    let reader = open_text(path).map_err(|source| PersistError::read(path, source))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(reader);
    rdr.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| PersistError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

pub const TRACK_ROW_HEADER: &[&str] = &["item_id", "track", "target", "quantile_score", "raw_score"];

pub const SUMMARY_HEADER: &[&str] = &[
    "item_id",
    "quantile_mean",
    "quantile_max",
    "quantile_std",
    "n_tracks",
    "raw_mean",
    "raw_max",
    "focus_quantile_mean",
    "focus_quantile_max",
    "focus_raw_mean",
    "focus_raw_max",
];

pub const FAILED_HEADER: &[&str] = &["item_id", "reason"];

/// Persist one batch's rows, summaries and failures
///
/// # Errors
///
/// Returns the first `PersistError`; earlier files of the batch may exist,
/// but the checkpoint has not moved, so the batch is redone on resume.
pub fn write_batch(
    files: &BatchFiles,
    rows: &[TrackRow],
    summaries: &[ItemSummary],
    failed: &[FailedItem],
) -> Result<(), PersistError> {
    write_gz_rows(&files.rows, rows)?;
    write_table(&files.summary, summaries, SUMMARY_HEADER)?;
    write_table(&files.failed, failed, FAILED_HEADER)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, raw_max: f64) -> ItemSummary {
        ItemSummary {
            item_id: id.into(),
            quantile_mean: 0.25,
            quantile_max: 0.5,
            quantile_std: None,
            n_tracks: 2,
            raw_mean: 0.1,
            raw_max,
            focus_quantile_mean: Some(0.3),
            focus_quantile_max: None,
            focus_raw_mean: None,
            focus_raw_max: None,
        }
    }

    #[test]
    fn test_batch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PARTITIONS_DIR)).unwrap();
        let files = BatchFiles::new(dir.path(), 3);
        assert!(files.rows.ends_with("partitions/batch_0003.tsv.gz"));

        let rows = vec![TrackRow::new(
            "chr1:5:A>G",
            &TrackScore {
                track: "K562 JUND".into(),
                quantile_score: 0.9,
                raw_score: 1.25,
                target: Some("JUND".into()),
            },
        )];
        let summaries = vec![summary("chr1:5:A>G", 1.25)];
        let failed = vec![FailedItem {
            item_id: "chr1:6:C>T".into(),
            reason: "service returned 400: bad allele".into(),
        }];
        write_batch(&files, &rows, &summaries, &failed).unwrap();

        assert_eq!(read_table::<TrackRow>(&files.rows).unwrap(), rows);
        assert_eq!(read_table::<ItemSummary>(&files.summary).unwrap(), summaries);
        assert_eq!(read_table::<FailedItem>(&files.failed).unwrap(), failed);
    }

    #[test]
    fn test_empty_tables_have_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PARTITIONS_DIR)).unwrap();
        let files = BatchFiles::new(dir.path(), 0);
        write_batch(&files, &[], &[], &[]).unwrap();

        let text = std::fs::read_to_string(&files.summary).unwrap();
        assert!(text.starts_with("item_id\tquantile_mean"));
        assert!(read_table::<ItemSummary>(&files.summary).unwrap().is_empty());
        assert!(read_table::<TrackRow>(&files.rows).unwrap().is_empty());
    }
}
