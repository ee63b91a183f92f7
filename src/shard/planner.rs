use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use super::{AnnotationConfig, CHROM_PLACEHOLDER, SOURCE_PLACEHOLDER};
use crate::core::position::{chrom_order, convert_chrom_name, detect_naming_convention, Position};
use crate::core::shard::Shard;
use crate::core::types::NamingConvention;
use crate::executor::ExternalJob;

/// An input position and the form it is queried under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPosition {
    /// As read from the position list
    pub input: Position,

    /// Renamed to the reference's naming convention
    pub query: Position,

    /// Whether the position's contig is queried at all
    pub queried: bool,
}

/// Partition of a position list into per-chromosome shards
#[derive(Debug, Clone)]
pub struct ShardPlan {
    /// Every distinct input position, in input order
    pub entries: Vec<PlannedPosition>,

    /// One shard per queried chromosome, in karyotype order
    pub shards: Vec<Shard>,

    /// Contigs outside the allowlist (reference naming)
    pub skipped_contigs: BTreeSet<String>,

    /// Naming convention detected in the input
    pub query_convention: NamingConvention,
}

impl ShardPlan {
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.queried).count()
    }

    /// Build one external query job per shard.
    ///
    /// Shards whose source file is missing get no job; they are returned as
    /// `(chrom, reason)` so the caller can fail just those shards.
    #[must_use]
    pub fn query_jobs(
        &self,
        config: &AnnotationConfig,
        source_dir: &Path,
    ) -> (Vec<ExternalJob>, Vec<(String, String)>) {
        let mut jobs = Vec::with_capacity(self.shards.len());
        let mut missing = Vec::new();

        for (id, shard) in self.shards.iter().enumerate() {
            let source = source_dir.join(config.source_pattern.replace(CHROM_PLACEHOLDER, &shard.chrom));
            if !source.exists() {
                missing.push((
                    shard.chrom.clone(),
                    format!("source not found: {}", source.display()),
                ));
                continue;
            }

            let source = source.to_string_lossy();
            let args = config
                .args
                .iter()
                .map(|a| a.replace(SOURCE_PLACEHOLDER, &source))
                .collect();
            jobs.push(
                ExternalJob::new(id, shard.chrom.clone(), config.program.clone())
                    .with_args(args)
                    .with_input(shard.regions_text()),
            );
        }

        (jobs, missing)
    }
}

/// Splits query positions into per-chromosome shards
#[derive(Debug, Clone)]
pub struct ShardPlanner {
    reference_naming: NamingConvention,
    allowlist: Option<HashSet<String>>,
    workers: usize,
}

impl ShardPlanner {
    #[must_use]
    pub fn new(config: &AnnotationConfig, workers: usize) -> Self {
        let reference_naming = config.reference_naming;
        let allowlist = config.contigs.as_ref().map(|contigs| {
            contigs
                .iter()
                .map(|c| convert_chrom_name(c, reference_naming))
                .collect()
        });
        Self {
            reference_naming,
            allowlist,
            workers: workers.max(1),
        }
    }

    /// Plan shards for `positions`. Duplicates are dropped; nothing else is.
    #[must_use]
    pub fn plan(&self, positions: &[Position]) -> ShardPlan {
        let query_convention = detect_naming_convention(positions.iter().map(|p| p.chrom.as_str()));
        if query_convention != self.reference_naming {
            tracing::info!(
                "Input uses {:?} chromosome names; querying with {:?} names",
                query_convention,
                self.reference_naming
            );
        }

        let mut seen: HashSet<&Position> = HashSet::with_capacity(positions.len());
        let mut entries = Vec::with_capacity(positions.len());
        let mut by_chrom: BTreeMap<String, Vec<Position>> = BTreeMap::new();
        let mut skipped_contigs = BTreeSet::new();

        for position in positions {
            if !seen.insert(position) {
                continue;
            }
            let query = position.renamed(self.reference_naming);
            let queried = self
                .allowlist
                .as_ref()
                .map_or(true, |allowed| allowed.contains(&query.chrom));

            if queried {
                by_chrom
                    .entry(query.chrom.clone())
                    .or_default()
                    .push(query.clone());
            } else {
                skipped_contigs.insert(query.chrom.clone());
            }
            entries.push(PlannedPosition {
                input: position.clone(),
                query,
                queried,
            });
        }

        let mut chroms: Vec<(String, Vec<Position>)> = by_chrom.into_iter().collect();
        chroms.sort_by(|a, b| chrom_order(&a.0).cmp(&chrom_order(&b.0)));
        let shards: Vec<Shard> = chroms
            .into_iter()
            .enumerate()
            .map(|(i, (chrom, positions))| Shard::new(chrom, positions, i % self.workers))
            .collect();

        if !skipped_contigs.is_empty() {
            let shown: Vec<&str> = skipped_contigs.iter().take(10).map(String::as_str).collect();
            tracing::info!(
                "Skipping {} contigs outside the allowlist: {}{}",
                skipped_contigs.len(),
                shown.join(", "),
                if skipped_contigs.len() > 10 { ", ..." } else { "" }
            );
        }
        tracing::info!(
            "Planned {} positions into {} shards",
            entries.len(),
            shards.len()
        );

        ShardPlan {
            entries,
            shards,
            skipped_contigs,
            query_convention,
        }
    }
}
