use std::io;
use std::path::Path;

use super::{AnnotationConfig, AnnotationMerger, MergeTally, ShardError, ShardPlanner};
use crate::core::position::Position;
use crate::core::types::TierThresholds;
use crate::executor::{ExecutorConfig, QueryExecutor};
use crate::lookup::PositionLookup;
use crate::parsing::annotations::{write_annotation_rows, AnnotationRow};
use crate::parsing::positions::ParseError;
use crate::parsing::query_rows::parse_query_rows;
use crate::utils::io::write_atomically;

/// Merged table plus its tally
#[derive(Debug)]
pub struct AnnotationRun {
    pub rows: Vec<AnnotationRow>,
    pub tally: MergeTally,
}

/// Annotate by running the configured query tool once per chromosome.
///
/// # Errors
///
/// Returns `ShardError::NoSourceDir` without a source directory, and
/// executor setup errors. Failing shards are recorded in the result.
pub fn annotate_with_query(
    positions: &[Position],
    config: &AnnotationConfig,
    executor: &ExecutorConfig,
    thresholds: &TierThresholds,
) -> Result<AnnotationRun, ShardError> {
    let source_dir = config.source_dir.as_deref().ok_or(ShardError::NoSourceDir)?;
    let plan = ShardPlanner::new(config, executor.max_workers).plan(positions);
    let (jobs, missing) = plan.query_jobs(config, source_dir);

    let mut merger = AnnotationMerger::new(plan, thresholds.clone());
    for (chrom, reason) in missing {
        tracing::warn!("{}: {}", chrom, reason);
        merger.absorb_failure(&chrom, reason);
    }

    QueryExecutor::new(executor.clone()).run(jobs, |outcome| match outcome.result {
        Ok(stdout) => {
            let parsed = parse_query_rows(&stdout, &config.layout);
            if parsed.skipped > 0 {
                tracing::debug!(
                    "{}: skipped {} unparsable output lines",
                    outcome.label,
                    parsed.skipped
                );
            }
            merger.absorb_rows(&outcome.label, parsed.rows);
        }
        Err(failure) => merger.absorb_failure(&outcome.label, failure.to_string()),
    })?;

    let (rows, tally) = merger.finish();
    Ok(AnnotationRun { rows, tally })
}

/// Annotate through a lookup backend, shard by shard.
///
/// # Errors
///
/// Returns lookup errors that affect the whole reference (e.g. it cannot
/// be read). Per-shard failures are recorded in the result.
pub fn annotate_with_lookup(
    positions: &[Position],
    lookup: &dyn PositionLookup,
    config: &AnnotationConfig,
    workers: usize,
    thresholds: &TierThresholds,
) -> Result<AnnotationRun, ShardError> {
    let plan = ShardPlanner::new(config, workers).plan(positions);
    let shards = plan.shards.clone();
    tracing::info!("Resolving {} shards with {} lookup", shards.len(), lookup.strategy());

    let mut merger = AnnotationMerger::new(plan, thresholds.clone());
    lookup.lookup_shards(&shards, &mut |shard| {
        match &shard.result {
            Ok(table) => tracing::info!("{}: {} sites resolved", shard.chrom, table.len()),
            Err(reason) => tracing::warn!("{}: {}", shard.chrom, reason),
        }
        merger.absorb_lookup(shard);
    })?;

    let (rows, tally) = merger.finish();
    Ok(AnnotationRun { rows, tally })
}

/// Write the merged table atomically
///
/// # Errors
///
/// Returns `ParseError::Io` on any write failure.
pub fn write_annotations(path: &Path, rows: &[AnnotationRow]) -> Result<(), ParseError> {
    write_atomically(path, |w| write_annotation_rows(w, rows).map_err(io::Error::from))?;
    tracing::info!("Wrote {} annotated positions to {}", rows.len(), path.display());
    Ok(())
}
