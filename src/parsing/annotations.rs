//! The merged annotation table: one row per input position.
//!
//! Written by the shard merger and read back by the constraint statistics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::core::position::{Locus, Position};
use crate::core::types::{AnnotationValue, ConfidenceTier};
use crate::parsing::positions::ParseError;
use crate::utils::io::open_text;

/// One row of the merged annotation table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub chr: String,
    pub pos: u64,
    #[serde(rename = "ref", default)]
    pub ref_allele: String,
    #[serde(default)]
    pub alt: String,
    pub value: Option<u64>,
    pub status: String,
    pub tier: ConfidenceTier,
    #[serde(default)]
    pub reason: String,
}

impl AnnotationRow {
    #[must_use]
    pub fn new(
        position: &Position,
        value: &AnnotationValue,
        tier: ConfidenceTier,
    ) -> Self {
        Self {
            chr: position.chrom.clone(),
            pos: position.pos,
            ref_allele: position.ref_allele.clone().unwrap_or_default(),
            alt: position.alt_allele.clone().unwrap_or_default(),
            value: match value {
                AnnotationValue::Observed { value } => Some(*value),
                _ => None,
            },
            status: value.status().to_string(),
            tier,
            reason: value.reason().unwrap_or_default().to_string(),
        }
    }
}

/// Best-resolved annotation for a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteAnnotation {
    pub value: Option<u64>,
    pub tier: ConfidenceTier,
}

/// Write annotation rows as a tab-separated table with a header
///
/// # Errors
///
/// Returns any error from the underlying writer.
pub fn write_annotation_rows<W: Write>(writer: W, rows: &[AnnotationRow]) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Load a merged annotation table into a site-keyed map.
///
/// Several allele rows can share a site; the site keeps the highest tier
/// among them.
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be opened and
/// `ParseError::Table` for malformed rows.
pub fn load_site_annotations(path: &Path) -> Result<HashMap<Locus, SiteAnnotation>, ParseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(open_text(path)?);

    let mut sites: HashMap<Locus, SiteAnnotation> = HashMap::new();
    for result in rdr.deserialize() {
        let row: AnnotationRow = result?;
        let candidate = SiteAnnotation {
            value: row.value,
            tier: row.tier,
        };
        sites
            .entry(Locus::new(row.chr, row.pos))
            .and_modify(|site| {
                if candidate.tier > site.tier {
                    *site = candidate;
                }
            })
            .or_insert(candidate);
    }

    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_then_load_keeps_best_tier() {
        let rows = vec![
            AnnotationRow::new(
                &Position::new("chr1", 10).with_alleles("A", "G"),
                &AnnotationValue::Observed { value: 10 },
                ConfidenceTier::Low,
            ),
            AnnotationRow::new(
                &Position::new("chr1", 10).with_alleles("A", "T"),
                &AnnotationValue::Observed { value: 120_000 },
                ConfidenceTier::High,
            ),
            AnnotationRow::new(
                &Position::new("chr2", 5),
                &AnnotationValue::ShardFailed {
                    reason: "timed out".into(),
                },
                ConfidenceTier::Missing,
            ),
        ];

        let file = NamedTempFile::new().unwrap();
        write_annotation_rows(file.as_file(), &rows).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("chr\tpos\tref\talt\tvalue\tstatus\ttier\treason\n"));
        assert!(text.contains("chr2\t5\t\t\t\tshard_failed\tmissing\ttimed out"));

        let sites = load_site_annotations(file.path()).unwrap();
        assert_eq!(sites.len(), 2);
        let site = sites[&Locus::new("chr1", 10)];
        assert_eq!(site.tier, ConfidenceTier::High);
        assert_eq!(site.value, Some(120_000));
        assert_eq!(sites[&Locus::new("chr2", 5)].value, None);
    }
}
