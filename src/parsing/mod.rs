//! Parsers for the flat tabular files exchanged with upstream and downstream
//! collaborators.
//!
//! This module provides parsers for:
//!
//! - **Position lists**: `chr pos [ref alt]` tables produced by path enumeration
//! - **Reference datasets**: per-site value tables (`chr:pos value` or `chr pos value`)
//! - **External query output**: tab-delimited rows printed by indexed-query tools
//! - **Stratified position sets**: `chr pos stratum` tables for constraint statistics
//! - **Annotation tables**: the merged table written by the `annotate` command
//!
//! ## Header Detection
//!
//! Tables may or may not carry a header row. When the first data line names a
//! chromosome column, columns are located by name; otherwise a fixed column
//! order is assumed.
//!
//! | Column     | Accepted header names                          |
//! |------------|------------------------------------------------|
//! | chromosome | `chr`, `chrom`, `chromosome`, `contig`         |
//! | position   | `pos`, `position`, `genomic_position`, `start` |
//! | ref        | `ref`, `ref_base`, `reference`                 |
//! | alt        | `alt`, `alt_base`, `alternate`                 |
//! | stratum    | `stratum`, `hamming`, `hamming_distance`, `key`|

pub mod annotations;
pub mod positions;
pub mod query_rows;
pub mod reference;
pub mod strata;

pub(crate) const CHROM_COLUMNS: &[&str] = &["chr", "chrom", "chromosome", "contig"];
pub(crate) const POS_COLUMNS: &[&str] = &["pos", "position", "genomic_position", "start"];
pub(crate) const REF_COLUMNS: &[&str] = &["ref", "ref_base", "reference"];
pub(crate) const ALT_COLUMNS: &[&str] = &["alt", "alt_base", "alternate"];
pub(crate) const STRATUM_COLUMNS: &[&str] = &["stratum", "hamming", "hamming_distance", "key"];

/// Lower-cased header fields of a table, with any leading `#` removed
pub(crate) struct HeaderIndex {
    names: Vec<String>,
}

impl HeaderIndex {
    /// Interpret `fields` as a header if its first field names a chromosome
    /// column.
    pub(crate) fn detect(fields: &[&str]) -> Option<Self> {
        let names: Vec<String> = fields
            .iter()
            .map(|f| f.trim().trim_start_matches('#').to_lowercase())
            .collect();
        let first = names.first()?;
        if CHROM_COLUMNS.contains(&first.as_str()) {
            Some(Self { names })
        } else {
            None
        }
    }

    /// Index of the first column whose name is in `candidates`
    pub(crate) fn find(&self, candidates: &[&str]) -> Option<usize> {
        self.names
            .iter()
            .position(|name| candidates.contains(&name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_detection() {
        let header = HeaderIndex::detect(&["#CHROM", "POS", "REF", "ALT"]).unwrap();
        assert_eq!(header.find(POS_COLUMNS), Some(1));
        assert_eq!(header.find(ALT_COLUMNS), Some(3));
        assert_eq!(header.find(STRATUM_COLUMNS), None);

        assert!(HeaderIndex::detect(&["chr1", "100"]).is_none());
        assert!(HeaderIndex::detect(&[]).is_none());
    }
}
