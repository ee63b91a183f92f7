use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

use super::{complete_table, LookupError, LookupStrategy, LookupTable, PositionLookup};
use crate::core::position::Locus;
use crate::parsing::reference::parse_reference_line;
use crate::utils::io::open_text;

/// The whole reference parsed into a hash map, keyed by chromosome then
/// coordinate.
///
/// Loading is a single pass over the file; afterwards any number of query
/// sets resolve in O(1) per locus.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    values: HashMap<String, HashMap<u64, u64>>,
    entries: usize,
}

impl InMemoryIndex {
    /// Load `path`, logging progress every `progress_interval` lines
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Io` if the reference cannot be read.
    pub fn load(path: &Path, progress_interval: u64) -> Result<Self, LookupError> {
        tracing::info!("Loading reference into memory: {}", path.display());
        let started = Instant::now();
        let reader = open_text(path).map_err(|e| LookupError::io(path, e))?;
        let index = Self::from_reader(reader, progress_interval).map_err(|e| LookupError::io(path, e))?;
        tracing::info!(
            "Loaded {} entries on {} chromosomes in {:.1}s",
            index.entries,
            index.values.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(index)
    }

    /// Build an index from any line source
    ///
    /// # Errors
    ///
    /// Returns any IO error from the reader.
    pub fn from_reader<R: BufRead>(mut reader: R, progress_interval: u64) -> std::io::Result<Self> {
        let mut index = Self::default();
        let mut line = String::new();
        let mut lines: u64 = 0;
        let mut skipped: u64 = 0;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            lines += 1;
            if progress_interval > 0 && lines % progress_interval == 0 {
                tracing::info!("  {} lines loaded ({} entries)", lines, index.entries);
            }

            let Some(record) = parse_reference_line(&line) else {
                skipped += 1;
                continue;
            };
            // Avoid allocating the chromosome name on every line
            if !index.values.contains_key(record.chrom) {
                index.values.insert(record.chrom.to_string(), HashMap::new());
            }
            if let Some(by_pos) = index.values.get_mut(record.chrom) {
                // First occurrence wins
                if let Entry::Vacant(slot) = by_pos.entry(record.pos) {
                    slot.insert(record.value);
                    index.entries += 1;
                }
            }
        }

        if skipped > 0 {
            tracing::debug!("Skipped {} unparsable reference lines", skipped);
        }
        Ok(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[must_use]
    pub fn get(&self, locus: &Locus) -> Option<u64> {
        self.values.get(&locus.chrom)?.get(&locus.pos).copied()
    }
}

impl PositionLookup for InMemoryIndex {
    fn strategy(&self) -> LookupStrategy {
        LookupStrategy::Memory
    }

    fn lookup(&self, queries: &HashSet<Locus>) -> Result<LookupTable, LookupError> {
        let found: HashMap<Locus, u64> = queries
            .iter()
            .filter_map(|locus| self.get(locus).map(|v| (locus.clone(), v)))
            .collect();
        tracing::debug!("In-memory lookup: {}/{} found", found.len(), queries.len());
        Ok(complete_table(queries, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupValue;

    const REFERENCE: &str = "#locus\tAN\n\
                             chr1:100\t152000\n\
                             chr1:101\t0\n\
                             chr1:101\t999\n\
                             garbage line\n\
                             chr2\t7\t48000\n";

    #[test]
    fn test_load_and_lookup() {
        let index = InMemoryIndex::from_reader(REFERENCE.as_bytes(), 2).unwrap();
        assert_eq!(index.len(), 3);

        let queries: HashSet<Locus> = [
            Locus::new("chr1", 100),
            Locus::new("chr1", 101),
            Locus::new("chr1", 102),
            Locus::new("chr9", 1),
        ]
        .into();
        let table = index.lookup(&queries).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table[&Locus::new("chr1", 100)], LookupValue::Observed(152_000));
        // Duplicate entry: first wins, and zero stays observed
        assert_eq!(table[&Locus::new("chr1", 101)], LookupValue::Observed(0));
        assert_eq!(table[&Locus::new("chr1", 102)], LookupValue::Missing);
        assert_eq!(table[&Locus::new("chr9", 1)], LookupValue::Missing);
        assert_eq!(index.get(&Locus::new("chr2", 7)), Some(48_000));
    }

    #[test]
    fn test_reusable_across_query_sets() {
        let index = InMemoryIndex::from_reader(REFERENCE.as_bytes(), 0).unwrap();
        for _ in 0..3 {
            let queries: HashSet<Locus> = [Locus::new("chr2", 7)].into();
            let table = index.lookup(&queries).unwrap();
            assert_eq!(table[&Locus::new("chr2", 7)], LookupValue::Observed(48_000));
        }
    }
}
