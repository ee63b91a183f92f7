use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{
    complete_table, LookupError, LookupStrategy, LookupTable, PositionLookup, ShardLookup,
};
use crate::core::position::Locus;
use crate::core::shard::Shard;
use crate::parsing::reference::parse_reference_line;
use crate::utils::io::open_text;

/// Single sequential pass over the reference, testing each entry against the
/// query set held in memory.
///
/// Each reference line is read at most once per query set, and the scan stops
/// as soon as every query has been found.
#[derive(Debug, Clone)]
pub struct StreamingScan {
    path: PathBuf,
    progress_interval: u64,
}

impl StreamingScan {
    #[must_use]
    pub fn new(path: &Path, progress_interval: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            progress_interval,
        }
    }

    /// Scan `reader` for `queries`, returning the values found
    ///
    /// # Errors
    ///
    /// Returns any IO error from the reader.
    pub fn scan<R: BufRead>(
        mut reader: R,
        queries: &HashSet<Locus>,
        progress_interval: u64,
    ) -> std::io::Result<HashMap<Locus, u64>> {
        let mut by_chrom: HashMap<&str, HashSet<u64>> = HashMap::new();
        for locus in queries {
            by_chrom.entry(locus.chrom.as_str()).or_default().insert(locus.pos);
        }

        let mut found: HashMap<Locus, u64> = HashMap::with_capacity(queries.len());
        let mut line = String::new();
        let mut lines: u64 = 0;

        while found.len() < queries.len() {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            lines += 1;
            if progress_interval > 0 && lines % progress_interval == 0 {
                tracing::info!(
                    "  {} lines scanned, {}/{} found",
                    lines,
                    found.len(),
                    queries.len()
                );
            }

            let Some(record) = parse_reference_line(&line) else {
                continue;
            };
            let wanted = by_chrom
                .get(record.chrom)
                .is_some_and(|positions| positions.contains(&record.pos));
            if wanted {
                // First occurrence wins
                found
                    .entry(Locus::new(record.chrom, record.pos))
                    .or_insert(record.value);
            }
        }

        if found.len() == queries.len() && !queries.is_empty() {
            tracing::info!(
                "All {} queries found after {} lines, stopping early",
                queries.len(),
                lines
            );
        }
        Ok(found)
    }
}

impl PositionLookup for StreamingScan {
    fn strategy(&self) -> LookupStrategy {
        LookupStrategy::Stream
    }

    fn lookup(&self, queries: &HashSet<Locus>) -> Result<LookupTable, LookupError> {
        tracing::info!(
            "Streaming {} for {} queries",
            self.path.display(),
            queries.len()
        );
        let started = Instant::now();
        let reader = open_text(&self.path).map_err(|e| LookupError::io(&self.path, e))?;
        let found = Self::scan(reader, queries, self.progress_interval)
            .map_err(|e| LookupError::io(&self.path, e))?;
        tracing::info!(
            "Scan complete: {}/{} found in {:.1}s",
            found.len(),
            queries.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(complete_table(queries, found))
    }

    /// One pass for all shards together, then split per shard
    fn lookup_shards(
        &self,
        shards: &[Shard],
        on_shard: &mut dyn FnMut(ShardLookup),
    ) -> Result<(), LookupError> {
        let all: HashSet<Locus> = shards.iter().flat_map(Shard::loci).collect();
        let mut table = self.lookup(&all)?;

        for shard in shards {
            let shard_table: LookupTable = shard
                .loci()
                .into_iter()
                .filter_map(|locus| table.remove_entry(&locus))
                .collect();
            on_shard(ShardLookup {
                chrom: shard.chrom.clone(),
                result: Ok(shard_table),
            });
        }
        Ok(())
    }
}
