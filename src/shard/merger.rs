use std::collections::{HashMap, HashSet};

use super::planner::ShardPlan;
use crate::core::position::{chrom_order, Position};
use crate::core::types::{AnnotationValue, ConfidenceTier, TierThresholds};
use crate::lookup::{LookupTable, LookupValue, ShardLookup};
use crate::parsing::annotations::AnnotationRow;
use crate::parsing::query_rows::QueryRow;

/// Reason recorded for shards that never reported back
const NEVER_COMPLETED: &str = "shard never completed";

/// Rows returned for one chromosome, indexed both ways a position can match
#[derive(Debug, Default)]
struct RowIndex {
    by_allele: HashMap<(u64, String, String), u64>,
    by_site: HashMap<u64, u64>,
}

impl RowIndex {
    fn from_rows(rows: Vec<QueryRow>) -> Self {
        let mut index = Self::default();
        for row in rows {
            // First row wins at both granularities
            index.by_site.entry(row.pos).or_insert(row.value);
            if let (Some(r), Some(a)) = (row.ref_allele, row.alt_allele) {
                index
                    .by_allele
                    .entry((row.pos, r.to_ascii_uppercase(), a.to_ascii_uppercase()))
                    .or_insert(row.value);
            }
        }
        index
    }

    fn resolve(&self, position: &Position) -> AnnotationValue {
        // Site-level output carries no alleles, so allele-bearing positions
        // match on the site alone
        let value = match (&position.ref_allele, &position.alt_allele) {
            (Some(r), Some(a)) if !self.by_allele.is_empty() => self
                .by_allele
                .get(&(position.pos, r.clone(), a.clone()))
                .copied(),
            _ => self.by_site.get(&position.pos).copied(),
        };
        value.map_or(AnnotationValue::Absent, |value| AnnotationValue::Observed { value })
    }
}

#[derive(Debug)]
enum Resolution {
    Rows(RowIndex),
    Lookup(LookupTable),
    Failed(String),
}

/// Status counts and failed shards of a merged table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeTally {
    pub observed: usize,
    pub absent: usize,
    pub shard_failed: usize,
    pub skipped: usize,
    pub shards_succeeded: usize,

    /// `(chrom, reason)` per failed shard
    pub failed_shards: Vec<(String, String)>,
}

impl MergeTally {
    #[must_use]
    pub fn total(&self) -> usize {
        self.observed + self.absent + self.shard_failed + self.skipped
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_shards.is_empty()
    }
}

/// Collects per-shard results as they complete and emits one row per input
/// position.
#[derive(Debug)]
pub struct AnnotationMerger {
    plan: ShardPlan,
    thresholds: TierThresholds,
    resolved: HashMap<String, Resolution>,
    expected: HashSet<String>,
}

impl AnnotationMerger {
    #[must_use]
    pub fn new(plan: ShardPlan, thresholds: TierThresholds) -> Self {
        let expected = plan.shards.iter().map(|s| s.chrom.clone()).collect();
        Self {
            plan,
            thresholds,
            resolved: HashMap::new(),
            expected,
        }
    }

    #[must_use]
    pub fn plan(&self) -> &ShardPlan {
        &self.plan
    }

    /// Record a successful external query. A shard is resolved once; later
    /// reports for the same chromosome are ignored.
    pub fn absorb_rows(&mut self, chrom: &str, rows: Vec<QueryRow>) {
        self.resolve(chrom, Resolution::Rows(RowIndex::from_rows(rows)));
    }

    pub fn absorb_failure(&mut self, chrom: &str, reason: impl Into<String>) {
        self.resolve(chrom, Resolution::Failed(reason.into()));
    }

    pub fn absorb_lookup(&mut self, shard: ShardLookup) {
        let resolution = match shard.result {
            Ok(table) => Resolution::Lookup(table),
            Err(reason) => Resolution::Failed(reason),
        };
        self.resolve(&shard.chrom, resolution);
    }

    fn resolve(&mut self, chrom: &str, resolution: Resolution) {
        if !self.expected.contains(chrom) {
            tracing::warn!("Ignoring result for unplanned shard {}", chrom);
            return;
        }
        if self.resolved.contains_key(chrom) {
            tracing::warn!("Ignoring repeated result for shard {}", chrom);
            return;
        }
        self.resolved.insert(chrom.to_string(), resolution);
    }

    /// Number of shards not yet reported
    #[must_use]
    pub fn pending(&self) -> usize {
        self.expected.len() - self.resolved.len()
    }

    fn value_for(&self, query: &Position, queried: bool) -> AnnotationValue {
        if !queried {
            return AnnotationValue::Skipped;
        }
        match self.resolved.get(&query.chrom) {
            None => AnnotationValue::ShardFailed {
                reason: NEVER_COMPLETED.to_string(),
            },
            Some(Resolution::Failed(reason)) => AnnotationValue::ShardFailed {
                reason: reason.clone(),
            },
            Some(Resolution::Rows(index)) => index.resolve(query),
            Some(Resolution::Lookup(table)) => match table.get(&query.locus()) {
                Some(LookupValue::Observed(value)) => AnnotationValue::Observed { value: *value },
                Some(LookupValue::Missing) | None => AnnotationValue::Absent,
            },
        }
    }

    /// Emit the merged table, sorted by chromosome and position
    #[must_use]
    pub fn finish(self) -> (Vec<AnnotationRow>, MergeTally) {
        let mut tally = MergeTally::default();

        for shard in &self.plan.shards {
            match self.resolved.get(&shard.chrom) {
                Some(Resolution::Failed(reason)) => {
                    tally.failed_shards.push((shard.chrom.clone(), reason.clone()));
                }
                None => {
                    tally
                        .failed_shards
                        .push((shard.chrom.clone(), NEVER_COMPLETED.to_string()));
                }
                Some(_) => tally.shards_succeeded += 1,
            }
        }

        let mut rows: Vec<AnnotationRow> = Vec::with_capacity(self.plan.entries.len());
        for entry in &self.plan.entries {
            let value = self.value_for(&entry.query, entry.queried);
            match value {
                AnnotationValue::Observed { .. } => tally.observed += 1,
                AnnotationValue::Absent => tally.absent += 1,
                AnnotationValue::ShardFailed { .. } => tally.shard_failed += 1,
                AnnotationValue::Skipped => tally.skipped += 1,
            }
            let tier = ConfidenceTier::classify(&value, &self.thresholds);
            rows.push(AnnotationRow::new(&entry.input, &value, tier));
        }

        rows.sort_by(|a, b| {
            chrom_order(&a.chr)
                .cmp(&chrom_order(&b.chr))
                .then(a.pos.cmp(&b.pos))
                .then_with(|| a.ref_allele.cmp(&b.ref_allele))
                .then_with(|| a.alt.cmp(&b.alt))
        });

        (rows, tally)
    }
}
