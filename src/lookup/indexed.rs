use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{
    complete_table, find_index, LookupError, LookupStrategy, LookupTable, PositionLookup,
    ShardLookup,
};
use crate::core::position::{Locus, Position};
use crate::core::shard::Shard;
use crate::executor::{ExecutorConfig, ExternalJob, QueryExecutor};
use crate::parsing::reference::parse_reference_line;

/// Random-access fetches through an external index tool.
///
/// Each query position becomes one `chr:pos-pos` region. Regions are grouped
/// into chunks of `positions_per_fetch` and every chunk runs as one tool
/// invocation on the executor's worker pool:
///
/// ```text
/// tabix reference.tsv.bgz chr1:100-100 chr1:250-250 ...
/// ```
#[derive(Debug, Clone)]
pub struct IndexedFetch {
    reference: PathBuf,
    program: String,
    positions_per_fetch: usize,
    executor: QueryExecutor,
}

/// Chunks still outstanding for one shard
#[derive(Debug, Default)]
struct ShardProgress {
    remaining: usize,
    queries: HashSet<Locus>,
    found: HashMap<Locus, u64>,
    failure: Option<String>,
}

impl IndexedFetch {
    /// # Errors
    ///
    /// Returns `LookupError::IndexMissing` if no `.tbi`/`.csi` index sits
    /// next to `reference`.
    pub fn new(
        reference: &Path,
        program: &str,
        positions_per_fetch: usize,
        executor: ExecutorConfig,
    ) -> Result<Self, LookupError> {
        if find_index(reference).is_none() {
            return Err(LookupError::IndexMissing(reference.to_path_buf()));
        }
        Ok(Self {
            reference: reference.to_path_buf(),
            program: program.to_string(),
            positions_per_fetch: positions_per_fetch.max(1),
            executor: QueryExecutor::new(executor),
        })
    }

    fn fetch_job(&self, id: usize, chrom: &str, positions: &[u64]) -> ExternalJob {
        let mut args = Vec::with_capacity(positions.len() + 1);
        args.push(self.reference.to_string_lossy().into_owned());
        args.extend(
            positions
                .iter()
                .map(|&pos| Locus::new(chrom, pos).region()),
        );
        ExternalJob::new(id, format!("{chrom}#{id}"), &self.program).with_args(args)
    }
}

/// Pick the queried entries out of a fetch's output; first occurrence wins
fn absorb_fetch_output(stdout: &str, progress: &mut ShardProgress) {
    for line in stdout.lines() {
        if let Some(record) = parse_reference_line(line) {
            let locus = Locus::new(record.chrom, record.pos);
            if progress.queries.contains(&locus) {
                progress.found.entry(locus).or_insert(record.value);
            }
        }
    }
}

impl PositionLookup for IndexedFetch {
    fn strategy(&self) -> LookupStrategy {
        LookupStrategy::Indexed
    }

    fn lookup(&self, queries: &HashSet<Locus>) -> Result<LookupTable, LookupError> {
        let mut by_chrom: BTreeMap<&str, Vec<Position>> = BTreeMap::new();
        for locus in queries {
            by_chrom
                .entry(locus.chrom.as_str())
                .or_default()
                .push(Position::new(locus.chrom.clone(), locus.pos));
        }
        let shards: Vec<Shard> = by_chrom
            .into_iter()
            .enumerate()
            .map(|(slot, (chrom, positions))| Shard::new(chrom, positions, slot))
            .collect();

        let mut table = LookupTable::with_capacity(queries.len());
        let mut failure = None;
        self.lookup_shards(&shards, &mut |shard| match shard.result {
            Ok(part) => table.extend(part),
            Err(reason) => {
                failure.get_or_insert(LookupError::Fetch {
                    chrom: shard.chrom,
                    reason,
                });
            }
        })?;

        match failure {
            Some(err) => Err(err),
            None => Ok(table),
        }
    }

    /// All shards' chunks share one worker pool; a shard is reported when its
    /// last chunk finishes, and fails if any of its chunks failed.
    fn lookup_shards(
        &self,
        shards: &[Shard],
        on_shard: &mut dyn FnMut(ShardLookup),
    ) -> Result<(), LookupError> {
        let mut jobs = Vec::new();
        let mut owner: HashMap<usize, usize> = HashMap::new();
        let mut progress: Vec<ShardProgress> = Vec::with_capacity(shards.len());

        for (shard_idx, shard) in shards.iter().enumerate() {
            let coords = shard.coordinates();
            let mut state = ShardProgress {
                queries: shard.loci(),
                ..ShardProgress::default()
            };
            for chunk in coords.chunks(self.positions_per_fetch) {
                let id = jobs.len();
                jobs.push(self.fetch_job(id, &shard.chrom, chunk));
                owner.insert(id, shard_idx);
                state.remaining += 1;
            }
            progress.push(state);
        }

        // Shards with nothing to fetch are complete already
        for (shard, state) in shards.iter().zip(progress.iter_mut()) {
            if state.remaining == 0 {
                on_shard(ShardLookup {
                    chrom: shard.chrom.clone(),
                    result: Ok(LookupTable::new()),
                });
            }
        }

        tracing::info!(
            "Indexed fetch: {} chunks across {} shards",
            jobs.len(),
            shards.len()
        );

        self.executor.run(jobs, |outcome| {
            let Some(&shard_idx) = owner.get(&outcome.id) else {
                return;
            };
            let state = &mut progress[shard_idx];
            match &outcome.result {
                Ok(stdout) => absorb_fetch_output(stdout, state),
                Err(failure) => {
                    state.failure.get_or_insert_with(|| failure.to_string());
                }
            }
            state.remaining -= 1;

            if state.remaining == 0 {
                let result = match state.failure.take() {
                    Some(reason) => Err(reason),
                    None => Ok(complete_table(
                        &state.queries,
                        std::mem::take(&mut state.found),
                    )),
                };
                on_shard(ShardLookup {
                    chrom: shards[shard_idx].chrom.clone(),
                    result,
                });
            }
        })?;

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::lookup::LookupValue;
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in for an index tool: prints the reference lines matching each
    /// `chr:pos-pos` region argument.
    fn fake_fetch_tool(dir: &Path) -> PathBuf {
        let script = dir.join("fake-tabix");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             ref=\"$1\"; shift\n\
             for region in \"$@\"; do\n\
               chrom=${region%%:*}; rest=${region#*:}; pos=${rest%%-*}\n\
               awk -F '\\t' -v c=\"$chrom\" -v p=\"$pos\" '$1==c && $2==p' \"$ref\"\n\
             done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn config(dir: &Path) -> ExecutorConfig {
        ExecutorConfig {
            max_workers: 2,
            timeout_secs: 30,
            stderr_limit: 500,
            scratch_dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn test_requires_index() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.tsv.bgz");
        std::fs::write(&reference, "").unwrap();
        assert!(matches!(
            IndexedFetch::new(&reference, "tabix", 10, config(dir.path())),
            Err(LookupError::IndexMissing(_))
        ));
    }

    #[test]
    fn test_chunked_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.tsv");
        std::fs::write(&reference, "chr1\t10\t5\nchr1\t11\t0\nchr1\t11\t9\nchr2\t3\t8\n").unwrap();
        std::fs::write(dir.path().join("ref.tsv.tbi"), "").unwrap();
        let tool = fake_fetch_tool(dir.path());

        let fetch = IndexedFetch::new(
            &reference,
            &tool.to_string_lossy(),
            1,
            config(dir.path()),
        )
        .unwrap();
        let queries: HashSet<Locus> = [
            Locus::new("chr1", 10),
            Locus::new("chr1", 11),
            Locus::new("chr1", 12),
            Locus::new("chr2", 3),
        ]
        .into();
        let table = fetch.lookup(&queries).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table[&Locus::new("chr1", 11)], LookupValue::Observed(0));
        assert_eq!(table[&Locus::new("chr1", 12)], LookupValue::Missing);
        assert_eq!(table[&Locus::new("chr2", 3)], LookupValue::Observed(8));
    }

    #[test]
    fn test_failed_chunk_fails_only_its_shard() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.tsv");
        std::fs::write(&reference, "chr1\t10\t5\n").unwrap();
        std::fs::write(dir.path().join("ref.tsv.csi"), "").unwrap();

        // Fails for any chr2 region
        let script = dir.path().join("flaky-tabix");
        std::fs::write(
            &script,
            "#!/bin/sh\ncase \"$2\" in chr2*) echo 'index corrupt' >&2; exit 1;; esac\n\
             printf 'chr1\\t10\\t5\\n'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fetch =
            IndexedFetch::new(&reference, &script.to_string_lossy(), 8, config(dir.path())).unwrap();
        let shards = vec![
            Shard::new("chr1", vec![Position::new("chr1", 10)], 0),
            Shard::new("chr2", vec![Position::new("chr2", 5)], 1),
        ];
        let mut results: Vec<ShardLookup> = Vec::new();
        fetch
            .lookup_shards(&shards, &mut |r| results.push(r))
            .unwrap();
        results.sort_by(|a, b| a.chrom.cmp(&b.chrom));

        assert_eq!(results.len(), 2);
        assert!(results[0].result.is_ok());
        assert!(results[1]
            .result
            .as_ref()
            .is_err_and(|reason| reason.contains("index corrupt")));
    }
}
