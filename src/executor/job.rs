use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;

use crate::utils::validation::{sanitize_label, stderr_reason};

/// Argument placeholder replaced by the path of the job's scratch input
pub const REGIONS_PLACEHOLDER: &str = "{regions}";

/// Why a single job produced no result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    #[error("failed to start '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("{status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("could not write scratch input: {0}")]
    Scratch(String),

    #[error("error collecting process output: {0}")]
    Io(String),

    #[error("process output is not valid UTF-8")]
    InvalidOutput,

    #[error("worker task aborted")]
    Aborted,
}

/// One subprocess invocation
#[derive(Debug, Clone)]
pub struct ExternalJob {
    /// Caller-chosen identifier, unique within a run
    pub id: usize,

    /// Human-readable label (chromosome name) used in logs and tallies
    pub label: String,

    pub program: String,
    pub args: Vec<String>,

    /// Text written to a scratch file and passed via [`REGIONS_PLACEHOLDER`]
    pub input: Option<String>,
}

impl ExternalJob {
    pub fn new(id: usize, label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            input: None,
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: String) -> Self {
        self.input = Some(input);
        self
    }
}

/// The result of one job, delivered as soon as the job finishes
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: usize,
    pub label: String,
    pub elapsed: Duration,

    /// Captured stdout on success
    pub result: Result<String, JobFailure>,
}

/// Per-run limits shared by every job
#[derive(Debug, Clone)]
pub(crate) struct JobLimits {
    pub timeout: Duration,
    pub stderr_limit: usize,
    pub scratch_dir: Option<PathBuf>,
}

impl ExternalJob {
    pub(crate) async fn execute(self, limits: &JobLimits) -> JobOutcome {
        let started = Instant::now();
        let result = self.run_process(limits).await;
        JobOutcome {
            id: self.id,
            label: self.label,
            elapsed: started.elapsed(),
            result,
        }
    }

    async fn run_process(&self, limits: &JobLimits) -> Result<String, JobFailure> {
        // Held until the end of this function so the file outlives the child
        let scratch = match &self.input {
            Some(text) => Some(
                write_scratch(&self.label, text, limits.scratch_dir.as_deref())
                    .map_err(|e| JobFailure::Scratch(e.to_string()))?,
            ),
            None => None,
        };

        let args: Vec<String> = match &scratch {
            Some(file) => {
                let path = file.path().to_string_lossy();
                self.args
                    .iter()
                    .map(|a| a.replace(REGIONS_PLACEHOLDER, &path))
                    .collect()
            }
            None => self.args.clone(),
        };

        tracing::debug!("{}: {} {}", self.label, self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobFailure::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        // On timeout the wait future is dropped, which kills the child
        let output = match tokio::time::timeout(limits.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(JobFailure::Io(e.to_string())),
            Err(_) => {
                return Err(JobFailure::Timeout {
                    secs: limits.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(JobFailure::Exit {
                status: output.status.to_string(),
                stderr: stderr_reason(&output.stderr, limits.stderr_limit, "no stderr output"),
            });
        }

        drop(scratch);
        String::from_utf8(output.stdout).map_err(|_| JobFailure::InvalidOutput)
    }
}

/// Write `text` to an owner-only temp file named after the job label
fn write_scratch(label: &str, text: &str, dir: Option<&Path>) -> std::io::Result<NamedTempFile> {
    let prefix = format!("{}-", sanitize_label(label));
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".regions");

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}
