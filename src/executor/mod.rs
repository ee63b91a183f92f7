//! Parallel execution of external query tools.
//!
//! Each [`ExternalJob`] runs one subprocess (e.g. `bcftools query` over one
//! chromosome) with a hard timeout. Jobs run concurrently up to a worker bound
//! and are reported back one at a time, in the order they finish.
//!
//! ## Failure isolation
//!
//! A job never fails the run. Spawn errors, non-zero exits and timeouts all
//! become a [`JobFailure`] attached to that job's [`JobOutcome`]:
//!
//! | Failure       | Reason recorded                                 |
//! |---------------|-------------------------------------------------|
//! | `Spawn`       | program name and OS error                       |
//! | `Exit`        | exit status and stderr (first 500 characters)   |
//! | `Timeout`     | configured limit                                |
//! | `Scratch`     | error writing the job's scratch input file      |
//! | `Aborted`     | worker task ended without reporting             |
//!
//! ## Scratch inputs
//!
//! A job may carry text input (typically a region list). It is written to a
//! uniquely named, owner-only temporary file and substituted for the
//! `{regions}` placeholder in the job's arguments. The file is removed when
//! the job finishes, whatever the outcome.

pub mod job;
pub mod pool;

pub use job::{ExternalJob, JobFailure, JobOutcome, REGIONS_PLACEHOLDER};
pub use pool::{QueryExecutor, RunTally};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::utils::validation::MAX_STDERR_CHARS;

/// Upper bound on the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 30;

/// Default per-job timeout: six hours covers the largest chromosomes
pub const DEFAULT_TIMEOUT_SECS: u64 = 6 * 60 * 60;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Duplicate job id {0}")]
    DuplicateJob(usize),
}

/// Executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum number of concurrently running subprocesses
    pub max_workers: usize,

    /// Hard per-job timeout in seconds
    pub timeout_secs: u64,

    /// Characters of stderr kept as the failure reason
    pub stderr_limit: usize,

    /// Directory for scratch inputs (system temp dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: default_worker_count(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            stderr_limit: MAX_STDERR_CHARS,
            scratch_dir: None,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `min(30, max(1, cores - 2))`: leave two cores for the orchestrator and
/// the tools' own decompression threads.
#[must_use]
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    cores.saturating_sub(2).max(1).min(MAX_DEFAULT_WORKERS)
}
