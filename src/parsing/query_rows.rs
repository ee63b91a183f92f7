//! Rows printed by an external indexed-query tool.
//!
//! The default query format prints `CHROM POS REF ALT VALUE`; a site-level
//! format without alleles prints `CHROM POS VALUE`. Multi-allelic records
//! (`ALT = A,G`, `VALUE = 3,5`) are split into one row per allele.

use serde::{Deserialize, Serialize};

/// Column layout of query tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowLayout {
    /// Columns 2 and 3 hold REF and ALT
    pub alleles: bool,

    /// 0-based column holding the numeric value
    pub value_column: usize,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self {
            alleles: true,
            value_column: 4,
        }
    }
}

impl RowLayout {
    /// Site-level layout: `CHROM POS VALUE`
    #[must_use]
    pub fn sites() -> Self {
        Self {
            alleles: false,
            value_column: 2,
        }
    }
}

/// One parsed output row, after multi-allelic splitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRow {
    pub chrom: String,
    pub pos: u64,
    pub ref_allele: Option<String>,
    pub alt_allele: Option<String>,
    pub value: u64,
}

/// Rows parsed from one shard's output, plus the count of lines skipped
#[derive(Debug, Default)]
pub struct ParsedRows {
    pub rows: Vec<QueryRow>,
    pub skipped: usize,
}

/// Parse a shard's stdout.
///
/// Lines that cannot be interpreted (a missing value printed as `.`, too few
/// columns, a value list that does not match the allele list) are skipped and
/// counted rather than failing the shard.
#[must_use]
pub fn parse_query_rows(text: &str, layout: &RowLayout) -> ParsedRows {
    let mut parsed = ParsedRows::default();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !parse_line(line, layout, &mut parsed.rows) {
            parsed.skipped += 1;
        }
    }

    parsed
}

fn parse_line(line: &str, layout: &RowLayout, rows: &mut Vec<QueryRow>) -> bool {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() <= layout.value_column || fields.len() < 2 {
        return false;
    }

    let chrom = fields[0];
    let Ok(pos) = fields[1].parse::<u64>() else {
        return false;
    };
    let values: Vec<Option<u64>> = fields[layout.value_column]
        .split(',')
        .map(|v| v.trim().parse().ok())
        .collect();

    if !layout.alleles {
        return match values.as_slice() {
            [Some(value)] => {
                rows.push(QueryRow {
                    chrom: chrom.to_string(),
                    pos,
                    ref_allele: None,
                    alt_allele: None,
                    value: *value,
                });
                true
            }
            _ => false,
        };
    }

    if fields.len() < 4 {
        return false;
    }
    let ref_allele = fields[2];
    let alts: Vec<&str> = fields[3].split(',').collect();

    // A single site-level value (e.g. allele number) applies to every allele
    let per_allele = match values.len() {
        1 => vec![values[0]; alts.len()],
        n if n == alts.len() => values,
        _ => return false,
    };

    let before = rows.len();
    for (alt, value) in alts.iter().zip(per_allele) {
        if let Some(value) = value {
            rows.push(QueryRow {
                chrom: chrom.to_string(),
                pos,
                ref_allele: Some(ref_allele.to_string()),
                alt_allele: Some((*alt).to_string()),
                value,
            });
        }
    }
    rows.len() > before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_layout() {
        let out = "chr1\t100\tA\tG\t12\nchr1\t200\tC\tT\t0\n";
        let parsed = parse_query_rows(out, &RowLayout::default());
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.rows[1].value, 0);
        assert_eq!(parsed.rows[1].alt_allele.as_deref(), Some("T"));
    }

    #[test]
    fn test_multiallelic_split() {
        let out = "chr2\t50\tA\tC,G\t3,5\n";
        let rows = parse_query_rows(out, &RowLayout::default()).rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].alt_allele.as_deref(), Some("C"));
        assert_eq!(rows[0].value, 3);
        assert_eq!(rows[1].alt_allele.as_deref(), Some("G"));
        assert_eq!(rows[1].value, 5);
    }

    #[test]
    fn test_site_value_shared_across_alleles() {
        let out = "chr2\t50\tA\tC,G\t152000\n";
        let rows = parse_query_rows(out, &RowLayout::default()).rows;
        assert!(rows.iter().all(|r| r.value == 152_000));
    }

    #[test]
    fn test_missing_values_skipped() {
        let out = "chr1\t100\tA\tG\t.\nchr1\t101\tA\tG,T\t1,2,3\nshort\n";
        let parsed = parse_query_rows(out, &RowLayout::default());
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.skipped, 3);
    }

    #[test]
    fn test_site_layout() {
        let parsed = parse_query_rows("chr3\t9\t77\nchr3\t10\t.\n", &RowLayout::sites());
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].ref_allele, None);
        assert_eq!(parsed.skipped, 1);
    }
}
