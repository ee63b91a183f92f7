use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::position::{Locus, Position};

/// One chromosome's worth of query positions.
///
/// A position belongs to exactly one shard, and a shard's query either
/// succeeds as a whole or fails as a whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    /// Chromosome name, already in the reference's naming convention
    pub chrom: String,

    /// Unique positions, sorted by coordinate
    pub positions: Vec<Position>,

    /// Worker slot assigned by the planner (round-robin over the pool)
    pub slot: usize,
}

impl Shard {
    #[must_use]
    pub fn new(chrom: impl Into<String>, mut positions: Vec<Position>, slot: usize) -> Self {
        positions.sort();
        positions.dedup();
        Self {
            chrom: chrom.into(),
            positions,
            slot,
        }
    }

    /// Distinct sites covered by this shard
    #[must_use]
    pub fn loci(&self) -> HashSet<Locus> {
        self.positions.iter().map(Position::locus).collect()
    }

    /// Sorted distinct coordinates, used to write region lists
    #[must_use]
    pub fn coordinates(&self) -> Vec<u64> {
        let mut coords: Vec<u64> = self.positions.iter().map(|p| p.pos).collect();
        coords.dedup();
        coords
    }

    /// Contents of a `CHROM<TAB>POS` region file for indexed query tools
    #[must_use]
    pub fn regions_text(&self) -> String {
        let mut text = String::with_capacity(self.positions.len() * 16);
        for pos in self.coordinates() {
            text.push_str(&self.chrom);
            text.push('\t');
            text.push_str(&pos.to_string());
            text.push('\n');
        }
        text
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_dedups_and_sorts() {
        let shard = Shard::new(
            "chr1",
            vec![
                Position::new("chr1", 30),
                Position::new("chr1", 10),
                Position::new("chr1", 30),
                Position::new("chr1", 10).with_alleles("A", "T"),
            ],
            0,
        );
        assert_eq!(shard.len(), 3);
        assert_eq!(shard.coordinates(), vec![10, 30]);
        assert_eq!(shard.loci().len(), 2);
        assert_eq!(shard.regions_text(), "chr1\t10\nchr1\t30\n");
    }
}
