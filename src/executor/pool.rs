use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use super::job::{ExternalJob, JobFailure, JobLimits, JobOutcome};
use super::{ExecutorConfig, ExecutorError};

/// Succeeded/failed counts for one executor run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTally {
    pub succeeded: usize,

    /// `(label, reason)` for every failed job, in completion order
    pub failed: Vec<(String, String)>,
}

impl RunTally {
    pub fn record(&mut self, outcome: &JobOutcome) {
        match &outcome.result {
            Ok(_) => self.succeeded += 1,
            Err(failure) => self.failed.push((outcome.label.clone(), failure.to_string())),
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn failed_labels(&self) -> Vec<&str> {
        self.failed.iter().map(|(label, _)| label.as_str()).collect()
    }
}

/// Runs external jobs concurrently on a bounded worker pool
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    config: ExecutorConfig,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every job to completion, calling `on_complete` as each finishes.
    ///
    /// Blocks the calling thread on a dedicated runtime. Must not be called
    /// from inside an async context; use [`QueryExecutor::run_async`] there.
    ///
    /// # Errors
    ///
    /// Only setup problems are errors (runtime creation, duplicate job ids).
    /// Individual job failures are reported through `on_complete` and the
    /// returned tally.
    pub fn run<F>(&self, jobs: Vec<ExternalJob>, mut on_complete: F) -> Result<RunTally, ExecutorError>
    where
        F: FnMut(JobOutcome),
    {
        let runtime = tokio::runtime::Runtime::new().map_err(ExecutorError::Runtime)?;
        runtime.block_on(self.run_async(jobs, &mut on_complete))
    }

    /// Async form of [`QueryExecutor::run`]
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::DuplicateJob` if two jobs share an id.
    pub async fn run_async(
        &self,
        jobs: Vec<ExternalJob>,
        on_complete: &mut dyn FnMut(JobOutcome),
    ) -> Result<RunTally, ExecutorError> {
        let mut pending: BTreeMap<usize, String> = BTreeMap::new();
        for job in &jobs {
            if pending.insert(job.id, job.label.clone()).is_some() {
                return Err(ExecutorError::DuplicateJob(job.id));
            }
        }

        let total = jobs.len();
        let workers = self.config.max_workers.max(1);
        tracing::info!("Running {} jobs on {} workers", total, workers.min(total.max(1)));

        let limits = Arc::new(JobLimits {
            timeout: self.config.timeout(),
            stderr_limit: self.config.stderr_limit,
            scratch_dir: self.config.scratch_dir.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<JobOutcome>();

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let limits = Arc::clone(&limits);
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let outcome = job.execute(&limits).await;
                // The receiver only goes away if the run itself was dropped
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut tally = RunTally::default();
        while let Some(outcome) = rx.recv().await {
            pending.remove(&outcome.id);
            log_outcome(&outcome, tally.total() + 1, total);
            tally.record(&outcome);
            on_complete(outcome);
        }

        // Tasks that panicked dropped their sender without reporting
        for (id, label) in pending {
            let outcome = JobOutcome {
                id,
                label,
                elapsed: Duration::ZERO,
                result: Err(JobFailure::Aborted),
            };
            log_outcome(&outcome, tally.total() + 1, total);
            tally.record(&outcome);
            on_complete(outcome);
        }

        tracing::info!(
            "Jobs complete: {} succeeded, {} failed",
            tally.succeeded,
            tally.failed.len()
        );
        Ok(tally)
    }
}

fn log_outcome(outcome: &JobOutcome, done: usize, total: usize) {
    match &outcome.result {
        Ok(stdout) => tracing::info!(
            "[{}/{}] {}: {} rows in {:.1}s",
            done,
            total,
            outcome.label,
            stdout.lines().count(),
            outcome.elapsed.as_secs_f64()
        ),
        Err(failure) => tracing::warn!("[{}/{}] {}: {}", done, total, outcome.label, failure),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn executor(max_workers: usize, dir: &std::path::Path) -> QueryExecutor {
        QueryExecutor::new(ExecutorConfig {
            max_workers,
            timeout_secs: 10,
            stderr_limit: 500,
            scratch_dir: Some(dir.to_path_buf()),
        })
    }

    fn sh(id: usize, label: &str, script: &str) -> ExternalJob {
        ExternalJob::new(id, label, "sh").with_args(vec!["-c".into(), script.into()])
    }

    #[test]
    fn test_failure_does_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            sh(0, "chr1", "echo one"),
            sh(1, "chr2", "echo broken >&2; exit 1"),
            sh(2, "chr3", "echo three"),
            ExternalJob::new(3, "chr4", "/nonexistent/tool"),
        ];

        let mut seen = Vec::new();
        let tally = executor(2, dir.path())
            .run(jobs, |outcome| seen.push(outcome.id))
            .unwrap();

        assert_eq!(tally.succeeded, 2);
        assert_eq!(tally.failed.len(), 2);
        let mut labels = tally.failed_labels();
        labels.sort_unstable();
        assert_eq!(labels, vec!["chr2", "chr4"]);
        assert!(tally.failed.iter().any(|(_, reason)| reason.contains("broken")));

        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_outcomes_arrive_in_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![sh(0, "slow", "sleep 1; echo slow"), sh(1, "fast", "echo fast")];

        let mut order = Vec::new();
        executor(2, dir.path())
            .run(jobs, |outcome| order.push(outcome.label))
            .unwrap();
        assert_eq!(order, vec!["fast", "slow"]);
    }

    #[test]
    fn test_single_worker_drains_all() {
        let dir = tempfile::tempdir().unwrap();
        let jobs: Vec<ExternalJob> = (0..5).map(|i| sh(i, &format!("j{i}"), "true")).collect();
        let tally = executor(1, dir.path()).run(jobs, |_| {}).unwrap();
        assert_eq!(tally.succeeded, 5);
        assert!(tally.is_complete());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![sh(7, "a", "true"), sh(7, "b", "true")];
        assert!(matches!(
            executor(2, dir.path()).run(jobs, |_| {}),
            Err(ExecutorError::DuplicateJob(7))
        ));
    }

    #[test]
    fn test_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let tally = executor(2, dir.path()).run(Vec::new(), |_| {}).unwrap();
        assert_eq!(tally.total(), 0);
    }
}
