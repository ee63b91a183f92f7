use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use super::artifacts::{
    read_table, write_batch, write_table, BatchFiles, FailedItem, TrackRow, FAILED_FILE,
    FAILED_HEADER, PARTITIONS_DIR, SUMMARY_FILE, SUMMARY_HEADER, TOP_CANDIDATES_FILE,
};
use super::checkpoint::{Checkpoint, RunManifest, CHECKPOINT_FILE, MANIFEST_FILE};
use super::client::{ItemScorer, ScoreError, TrackScore};
use super::summary::{sort_by_impact, summarize, ItemSummary};
use super::{PersistError, ScoringConfig, ScoringError};
use crate::core::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// A contiguous slice of the item list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub range: Range<usize>,
    pub status: BatchStatus,
}

/// Split `item_count` items into batches of `batch_size` (the last may be
/// shorter)
#[must_use]
pub fn plan_batches(item_count: usize, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    (0..item_count.div_ceil(batch_size))
        .map(|index| Batch {
            index,
            range: index * batch_size..((index + 1) * batch_size).min(item_count),
            status: BatchStatus::Pending,
        })
        .collect()
}

/// What one invocation of [`BatchScorer::run`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreRunReport {
    pub total_batches: usize,

    /// First batch this invocation started from
    pub resumed_from: usize,

    /// Batches committed by this invocation
    pub batches_run: Vec<usize>,

    /// Items scored and failed in this invocation
    pub scored: usize,
    pub failed: usize,

    /// Whether every batch is now committed and final outputs written
    pub complete: bool,

    /// Rows in the final summary and failure tables, once complete
    pub summary_rows: usize,
    pub failed_rows: usize,
}

impl ScoreRunReport {
    #[must_use]
    pub fn remaining_batches(&self) -> usize {
        self.total_batches - self.resumed_from - self.batches_run.len()
    }
}

/// Drives an [`ItemScorer`] over an item list in checkpointed batches
pub struct BatchScorer<S> {
    scorer: Arc<S>,
    config: ScoringConfig,
    output_dir: PathBuf,
}

impl<S: ItemScorer> BatchScorer<S> {
    pub fn new(scorer: S, config: ScoringConfig, output_dir: &Path) -> Self {
        Self {
            scorer: Arc::new(scorer),
            config,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Run from the last checkpoint, committing at most `max_batches`
    /// batches.
    ///
    /// Blocks the calling thread on a dedicated runtime.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::ManifestMismatch` when the output directory
    /// holds a run over different input, and `ScoringError::Persist` when
    /// any artifact or the checkpoint cannot be written. Item failures are
    /// not errors.
    pub fn run(&self, items: &[Position], max_batches: Option<usize>) -> Result<ScoreRunReport, ScoringError> {
        let runtime = tokio::runtime::Runtime::new().map_err(ScoringError::Runtime)?;
        runtime.block_on(self.run_async(items, max_batches))
    }

    /// Async form of [`BatchScorer::run`]
    ///
    /// # Errors
    ///
    /// See [`BatchScorer::run`].
    pub async fn run_async(
        &self,
        items: &[Position],
        max_batches: Option<usize>,
    ) -> Result<ScoreRunReport, ScoringError> {
        let mut batches = plan_batches(items.len(), self.config.batch_size);
        let checkpoint = Checkpoint::in_dir(&self.output_dir);
        let next = self.prepare(items, &checkpoint, batches.len())?;

        let mut report = ScoreRunReport {
            total_batches: batches.len(),
            resumed_from: next,
            ..ScoreRunReport::default()
        };
        if next > 0 {
            tracing::info!("Resuming from batch {} of {}", next + 1, batches.len());
        }

        for batch in &mut batches[..next] {
            batch.status = BatchStatus::Done;
        }

        let run_started = Instant::now();
        let mut items_done = 0usize;
        let budget = max_batches.unwrap_or(usize::MAX);
        for batch in batches.iter_mut().skip(next).take(budget) {
            batch.status = BatchStatus::Running;
            let slice = &items[batch.range.clone()];
            tracing::info!(
                "Batch {}/{}: items {}-{}",
                batch.index + 1,
                report.total_batches,
                batch.range.start,
                batch.range.end
            );

            let started = Instant::now();
            let results = self.score_batch(slice).await;
            let (rows, summaries, failed) = self.collect_batch(slice, results);

            let files = BatchFiles::new(&self.output_dir, batch.index);
            let committed = write_batch(&files, &rows, &summaries, &failed)
                .and_then(|()| checkpoint.commit(batch.index));
            if let Err(e) = committed {
                batch.status = BatchStatus::Failed;
                tracing::error!("Batch {} could not be persisted: {}", batch.index, e);
                return Err(e.into());
            }
            batch.status = BatchStatus::Done;

            items_done += slice.len();
            report.batches_run.push(batch.index);
            report.scored += summaries.len();
            report.failed += failed.len();

            let rate = items_done as f64 / run_started.elapsed().as_secs_f64().max(1e-9);
            tracing::info!(
                "  Scored: {}, Failed: {}, batch time {:.1}s, {:.1} items/s",
                summaries.len(),
                failed.len(),
                started.elapsed().as_secs_f64(),
                rate
            );
        }

        report.complete = batches.iter().all(|b| b.status == BatchStatus::Done);
        if report.complete {
            let (summary_rows, failed_rows) = self.finalize(report.total_batches)?;
            report.summary_rows = summary_rows;
            report.failed_rows = failed_rows;
        } else {
            tracing::info!(
                "{} batches remain; rerun to resume from batch {}",
                report.remaining_batches(),
                next + report.batches_run.len() + 1
            );
        }
        Ok(report)
    }

    /// Check or create the run manifest and return the first batch to run
    fn prepare(
        &self,
        items: &[Position],
        checkpoint: &Checkpoint,
        total_batches: usize,
    ) -> Result<usize, ScoringError> {
        let partitions = self.output_dir.join(PARTITIONS_DIR);
        std::fs::create_dir_all(&partitions).map_err(|e| PersistError::write(&partitions, e))?;

        let manifest = RunManifest::new(items, self.config.batch_size);
        match RunManifest::load(&self.output_dir)? {
            Some(existing) => {
                if let Some(detail) = existing.mismatch(&manifest) {
                    return Err(ScoringError::ManifestMismatch {
                        dir: self.output_dir.clone(),
                        detail,
                    });
                }
            }
            None => {
                if checkpoint.load()?.is_some() {
                    return Err(ScoringError::ManifestMismatch {
                        dir: self.output_dir.clone(),
                        detail: "checkpoint present without a run manifest".to_string(),
                    });
                }
                manifest.save(&self.output_dir)?;
            }
        }

        let next = checkpoint.next_batch()?;
        if next > total_batches {
            return Err(PersistError::Corrupt {
                path: checkpoint.path().to_path_buf(),
                detail: format!("checkpoint is past the last batch ({total_batches})"),
            }
            .into());
        }
        Ok(next)
    }

    /// Score every item of a batch, at most `max_in_flight` at a time.
    /// Results come back in item order.
    async fn score_batch(&self, items: &[Position]) -> Vec<Result<Vec<TrackScore>, ScoreError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let handles: Vec<_> = items
            .iter()
            .cloned()
            .map(|item| {
                let scorer = Arc::clone(&self.scorer);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| ScoreError::Aborted(e.to_string()))?;
                    scorer.score(&item).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(ScoreError::Aborted(e.to_string())),
            });
        }
        results
    }

    fn collect_batch(
        &self,
        items: &[Position],
        results: Vec<Result<Vec<TrackScore>, ScoreError>>,
    ) -> (Vec<TrackRow>, Vec<ItemSummary>, Vec<FailedItem>) {
        let mut rows = Vec::new();
        let mut summaries = Vec::with_capacity(items.len());
        let mut failed = Vec::new();

        for (item, result) in items.iter().zip(results) {
            let item_id = item.variant_id();
            let outcome = result.and_then(|scores| {
                summarize(&item_id, &scores, &self.config.focus_targets)
                    .map(|summary| (scores, summary))
                    .ok_or(ScoreError::Empty)
            });
            match outcome {
                Ok((scores, summary)) => {
                    rows.extend(scores.iter().map(|s| TrackRow::new(&item_id, s)));
                    summaries.push(summary);
                }
                Err(e) => {
                    tracing::warn!("{}: {}", item_id, e);
                    failed.push(FailedItem {
                        item_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (rows, summaries, failed)
    }

    /// Assemble the final outputs from every batch's persisted summaries
    fn finalize(&self, total_batches: usize) -> Result<(usize, usize), PersistError> {
        let mut summaries: Vec<ItemSummary> = Vec::new();
        let mut failed: Vec<FailedItem> = Vec::new();
        for index in 0..total_batches {
            let files = BatchFiles::new(&self.output_dir, index);
            summaries.extend(read_table::<ItemSummary>(&files.summary)?);
            failed.extend(read_table::<FailedItem>(&files.failed)?);
        }

        sort_by_impact(&mut summaries);
        let top = &summaries[..summaries.len().min(self.config.top_n)];

        write_table(&self.output_dir.join(SUMMARY_FILE), &summaries, SUMMARY_HEADER)?;
        write_table(&self.output_dir.join(TOP_CANDIDATES_FILE), top, SUMMARY_HEADER)?;
        write_table(&self.output_dir.join(FAILED_FILE), &failed, FAILED_HEADER)?;

        tracing::info!(
            "Final summary: {} items scored, {} failed ({})",
            summaries.len(),
            failed.len(),
            self.output_dir.join(SUMMARY_FILE).display()
        );
        Ok((summaries.len(), failed.len()))
    }
}

/// Remove all run state and outputs from `output_dir` so the next run
/// starts from batch 0
///
/// # Errors
///
/// Returns `PersistError::Write` if an existing file cannot be removed.
pub fn clean(output_dir: &Path) -> Result<(), PersistError> {
    let partitions = output_dir.join(PARTITIONS_DIR);
    match std::fs::remove_dir_all(&partitions) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PersistError::write(&partitions, e)),
    }
    for name in [
        CHECKPOINT_FILE,
        MANIFEST_FILE,
        SUMMARY_FILE,
        TOP_CANDIDATES_FILE,
        FAILED_FILE,
    ] {
        let path = output_dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PersistError::write(&path, e)),
        }
    }
    tracing::info!("Cleaned previous run state in {}", output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Scores each item deterministically from its coordinate and records
    /// what it was asked to score.
    struct RecordingScorer {
        seen: Arc<Mutex<Vec<String>>>,
        failing: HashSet<u64>,
    }

    impl ItemScorer for RecordingScorer {
        async fn score(&self, item: &Position) -> Result<Vec<TrackScore>, ScoreError> {
            self.seen.lock().unwrap().push(item.variant_id());
            if self.failing.contains(&item.pos) {
                return Err(ScoreError::Status {
                    status: 400,
                    body: "unsupported variant".into(),
                });
            }
            let x = item.pos as f64;
            Ok(vec![
                TrackScore {
                    track: "t1".into(),
                    quantile_score: x / 10.0,
                    raw_score: x,
                    target: None,
                },
                TrackScore {
                    track: "t2".into(),
                    quantile_score: -x / 10.0,
                    raw_score: (x * 7.0) % 5.0,
                    target: Some("JUND".into()),
                },
            ])
        }
    }

    fn items(n: u64) -> Vec<Position> {
        (1..=n)
            .map(|i| Position::new("chr1", i).with_alleles("A", "G"))
            .collect()
    }

    fn scorer(failing: &[u64]) -> (RecordingScorer, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            RecordingScorer {
                seen: Arc::clone(&seen),
                failing: failing.iter().copied().collect(),
            },
            seen,
        )
    }

    fn config(batch_size: usize) -> ScoringConfig {
        ScoringConfig {
            batch_size,
            max_in_flight: 2,
            ..ScoringConfig::default()
        }
    }

    #[test]
    fn test_plan_batches() {
        let batches = plan_batches(10, 3);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3].range, 9..10);
        assert!(batches.iter().all(|b| b.status == BatchStatus::Pending));
        assert!(plan_batches(0, 3).is_empty());
    }

    #[test]
    fn test_resume_only_runs_remaining_batches() {
        let dir = tempfile::tempdir().unwrap();
        let items = items(10);

        let (first, _) = scorer(&[]);
        let report = BatchScorer::new(first, config(3), dir.path())
            .run(&items, Some(2))
            .unwrap();
        assert_eq!(report.batches_run, vec![0, 1]);
        assert!(!report.complete);
        assert_eq!(report.remaining_batches(), 2);
        assert_eq!(Checkpoint::in_dir(dir.path()).load().unwrap(), Some(1));
        assert!(!dir.path().join(SUMMARY_FILE).exists());

        let (second, seen) = scorer(&[]);
        let report = BatchScorer::new(second, config(3), dir.path())
            .run(&items, None)
            .unwrap();
        assert_eq!(report.resumed_from, 2);
        assert_eq!(report.batches_run, vec![2, 3]);
        assert!(report.complete);
        assert_eq!(report.summary_rows, 10);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let mut expected: Vec<String> = items[6..].iter().map(Position::variant_id).collect();
        expected.sort();
        assert_eq!(seen, expected);

        // Identical to an uninterrupted run
        let fresh = tempfile::tempdir().unwrap();
        let (third, _) = scorer(&[]);
        BatchScorer::new(third, config(3), fresh.path())
            .run(&items, None)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap(),
            std::fs::read_to_string(fresh.path().join(SUMMARY_FILE)).unwrap()
        );
    }

    #[test]
    fn test_item_failures_do_not_fail_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (s, _) = scorer(&[2, 5]);
        let report = BatchScorer::new(s, config(4), dir.path())
            .run(&items(6), None)
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.scored, 4);
        assert_eq!(report.failed, 2);

        let failed: Vec<FailedItem> = read_table(&dir.path().join(FAILED_FILE)).unwrap();
        let ids: Vec<&str> = failed.iter().map(|f| f.item_id.as_str()).collect();
        assert_eq!(ids, vec!["chr1:2:A>G", "chr1:5:A>G"]);
        assert!(failed[0].reason.contains("400"));

        let summary: Vec<ItemSummary> = read_table(&dir.path().join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary.len(), 4);
        assert!(summary.windows(2).all(|w| w[0].raw_max >= w[1].raw_max));
        assert_eq!(summary[0].item_id, "chr1:6:A>G");
    }

    #[test]
    fn test_focus_and_top_n() {
        let dir = tempfile::tempdir().unwrap();
        let (s, _) = scorer(&[]);
        let config = ScoringConfig {
            focus_targets: vec!["jun".into()],
            top_n: 2,
            ..config(5)
        };
        BatchScorer::new(s, config, dir.path())
            .run(&items(5), None)
            .unwrap();
        let top: Vec<ItemSummary> = read_table(&dir.path().join(TOP_CANDIDATES_FILE)).unwrap();
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|s| s.focus_raw_max.is_some()));
    }

    #[test]
    fn test_mismatched_manifest_refuses_resume() {
        let dir = tempfile::tempdir().unwrap();
        let (s, _) = scorer(&[]);
        BatchScorer::new(s, config(3), dir.path())
            .run(&items(10), Some(1))
            .unwrap();

        let (s, _) = scorer(&[]);
        let err = BatchScorer::new(s, config(3), dir.path())
            .run(&items(11), None)
            .unwrap_err();
        assert!(matches!(err, ScoringError::ManifestMismatch { .. }));
        assert!(err.to_string().contains("--clean"));

        clean(dir.path()).unwrap();
        let (s, seen) = scorer(&[]);
        let report = BatchScorer::new(s, config(3), dir.path())
            .run(&items(11), None)
            .unwrap();
        assert_eq!(report.resumed_from, 0);
        assert_eq!(seen.lock().unwrap().len(), 11);
    }

    #[test]
    fn test_interrupted_batch_is_redone() {
        let dir = tempfile::tempdir().unwrap();
        let (s, _) = scorer(&[]);
        BatchScorer::new(s, config(3), dir.path())
            .run(&items(6), Some(1))
            .unwrap();

        // Artifacts of batch 1 written, then a crash before the checkpoint moved
        let stale = BatchFiles::new(dir.path(), 1);
        std::fs::write(&stale.summary, "garbage").unwrap();

        let (s, seen) = scorer(&[]);
        let report = BatchScorer::new(s, config(3), dir.path())
            .run(&items(6), None)
            .unwrap();
        assert_eq!(report.batches_run, vec![1]);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(report.summary_rows, 6);
    }

    #[test]
    fn test_persistence_failure_is_fatal_and_checkpoint_stays() {
        let dir = tempfile::tempdir().unwrap();
        let (s, _) = scorer(&[]);
        BatchScorer::new(s, config(3), dir.path())
            .run(&items(6), Some(1))
            .unwrap();

        // A directory where batch 1's summary file should go blocks the rename
        std::fs::create_dir_all(BatchFiles::new(dir.path(), 1).summary.join("blocker")).unwrap();

        let (s, _) = scorer(&[]);
        let err = BatchScorer::new(s, config(3), dir.path())
            .run(&items(6), None)
            .unwrap_err();
        assert!(matches!(err, ScoringError::Persist(_)));
        assert_eq!(Checkpoint::in_dir(dir.path()).load().unwrap(), Some(0));
    }
}
