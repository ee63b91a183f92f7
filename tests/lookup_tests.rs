//! Lookup backend transparency.
//!
//! The in-memory index, streaming scan and indexed fetch must return the same
//! table for the same reference and query set, including absent positions
//! and observed zeros.

#![cfg(unix)]

use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use locus_annotator::core::types::TierThresholds;
use locus_annotator::executor::ExecutorConfig;
use locus_annotator::lookup::{open_lookup, LookupConfig, LookupStrategy, LookupValue};
use locus_annotator::parsing::positions::parse_positions_text;
use locus_annotator::shard::{annotate_with_lookup, AnnotationConfig};
use locus_annotator::Locus;

const REFERENCE: &str = "\
chr1\t100\t152000
chr1\t101\t0
chr1\t250\t61000
chr1\t250\t99
chr2\t7\t1200
chrX\t5000\t88000
";

/// Prints the reference lines matching each `chr:pos-pos` region argument
fn fake_tabix(dir: &Path) -> PathBuf {
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

struct Fixture {
    _dir: tempfile::TempDir,
    reference: PathBuf,
    lookup: LookupConfig,
    executor: ExecutorConfig,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("allele_number.tsv");
    std::fs::write(&reference, REFERENCE).unwrap();
    std::fs::write(dir.path().join("allele_number.tsv.tbi"), "").unwrap();

    let lookup = LookupConfig {
        index_program: fake_tabix(dir.path()).to_string_lossy().into_owned(),
        positions_per_fetch: 2,
        ..LookupConfig::default()
    };
    let executor = ExecutorConfig {
        max_workers: 3,
        timeout_secs: 30,
        scratch_dir: Some(dir.path().to_path_buf()),
        ..ExecutorConfig::default()
    };
    Fixture {
        _dir: dir,
        reference,
        lookup,
        executor,
    }
}

fn queries() -> HashSet<Locus> {
    [
        Locus::new("chr1", 100),
        Locus::new("chr1", 101),
        Locus::new("chr1", 250),
        Locus::new("chr1", 999),
        Locus::new("chr2", 7),
        Locus::new("chrX", 5000),
        Locus::new("chr3", 1),
    ]
    .into_iter()
    .collect()
}

/// Every strategy yields an identical table
#[test]
fn test_backend_transparency() {
    let f = fixture();
    let queries = queries();

    let tables: Vec<_> = [
        LookupStrategy::Memory,
        LookupStrategy::Stream,
        LookupStrategy::Indexed,
    ]
    .into_iter()
    .map(|strategy| {
        let backend = open_lookup(&f.reference, strategy, &f.lookup, &f.executor).unwrap();
        assert_eq!(backend.strategy(), strategy);
        backend.lookup(&queries).unwrap()
    })
    .collect();

    assert_eq!(tables[0].len(), queries.len());
    assert_eq!(tables[0], tables[1]);
    assert_eq!(tables[0], tables[2]);

    let memory = &tables[0];
    assert_eq!(memory[&Locus::new("chr1", 100)], LookupValue::Observed(152_000));
    // Observed zero and absent stay distinct
    assert_eq!(memory[&Locus::new("chr1", 101)], LookupValue::Observed(0));
    assert_eq!(memory[&Locus::new("chr1", 999)], LookupValue::Missing);
    assert_eq!(memory[&Locus::new("chr3", 1)], LookupValue::Missing);
    // First occurrence of a duplicated site wins
    assert_eq!(memory[&Locus::new("chr1", 250)], LookupValue::Observed(61_000));
}

/// The merged annotation table does not depend on the strategy either,
/// including inputs with bare chromosome names
#[test]
fn test_annotation_rows_identical_across_strategies() {
    let f = fixture();
    let positions =
        parse_positions_text("chr\tpos\n1\t100\n1\t101\n1\t999\nX\t5000\n2\t7\n").unwrap();

    let runs: Vec<_> = [
        LookupStrategy::Memory,
        LookupStrategy::Stream,
        LookupStrategy::Indexed,
    ]
    .into_iter()
    .map(|strategy| {
        let backend = open_lookup(&f.reference, strategy, &f.lookup, &f.executor).unwrap();
        annotate_with_lookup(
            &positions,
            backend.as_ref(),
            &AnnotationConfig::default(),
            f.executor.max_workers,
            &TierThresholds::default(),
        )
        .unwrap()
    })
    .collect();

    assert_eq!(runs[0].rows, runs[1].rows);
    assert_eq!(runs[0].rows, runs[2].rows);
    assert!(runs.iter().all(|run| run.tally.is_complete()));

    let rows = &runs[0].rows;
    assert_eq!(rows.len(), 5);
    // Output keeps the input naming
    assert_eq!(rows[0].chr, "1");
    let statuses: Vec<&str> = rows.iter().map(|r| r.status.as_str()).collect();
    assert_eq!(
        statuses,
        vec!["observed", "observed", "absent", "observed", "observed"]
    );
    assert_eq!(rows[1].value, Some(0));
    assert_eq!(rows[2].value, None);
}
