//! Batched, resumable scoring against an external per-item service.
//!
//! Items are split into fixed-size batches processed strictly in index
//! order. For each batch:
//!
//! 1. items are scored concurrently, up to `max_in_flight` requests at once;
//! 2. the batch's rows, summaries and failures are written atomically;
//! 3. only then is the checkpoint advanced to the batch index.
//!
//! A crash anywhere before step 3 leaves the checkpoint on the previous
//! batch, so a resumed run redoes the interrupted batch from scratch and
//! never re-runs a committed one. Batch size bounds peak memory: full
//! per-track rows never outlive their batch.
//!
//! When the last batch commits, all batch summaries are read back in index
//! order into the final `predictions_summary.tsv`.

pub mod artifacts;
pub mod batch;
pub mod checkpoint;
pub mod client;
pub mod summary;

pub use batch::{plan_batches, Batch, BatchScorer, BatchStatus, ScoreRunReport};
pub use checkpoint::{Checkpoint, RunManifest};
pub use client::{HttpScorer, ItemScorer, ScoreError, TrackScore};
pub use summary::{summarize, ItemSummary};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to persist or read back run state. Always fatal.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

impl PersistError {
    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(
        "Existing run in {dir} does not match this input ({detail}); rerun with --clean to start over"
    )]
    ManifestMismatch { dir: PathBuf, detail: String },

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Scoring settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Service URL receiving one JSON POST per item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub batch_size: usize,

    /// Concurrent requests within a batch
    pub max_in_flight: usize,

    pub request_timeout_secs: u64,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,

    /// Sequence context requested around each item, in bases
    pub interval_width: u64,

    /// Track targets aggregated separately in the `focus_*` columns
    pub focus_targets: Vec<String>,

    /// Rows written to `top_candidates.tsv`
    pub top_n: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "SCORING_API_KEY".to_string(),
            batch_size: 500,
            max_in_flight: 4,
            request_timeout_secs: 600,
            max_retries: 3,
            retry_base_delay_ms: 500,
            interval_width: 1 << 20,
            focus_targets: Vec::new(),
            top_n: 1000,
        }
    }
}
