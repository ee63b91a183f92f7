use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::core::position::Locus;
use crate::parsing::positions::ParseError;
use crate::parsing::{HeaderIndex, CHROM_COLUMNS, POS_COLUMNS, STRATUM_COLUMNS};
use crate::utils::io::read_text;

/// Distinct loci grouped by stratum key (e.g. Hamming distance)
pub type StratifiedLoci = BTreeMap<String, HashSet<Locus>>;

/// Parse a stratified position file (`chr pos stratum`)
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or
/// `ParseError::InvalidFormat` for malformed content.
pub fn parse_strata_file(path: &Path) -> Result<StratifiedLoci, ParseError> {
    let content = read_text(path)?;
    parse_strata_text(&content)
}

/// Parse stratified position text.
///
/// With a header row the stratum column is located by name, otherwise the
/// layout is `chr pos stratum`. The same locus may appear in several strata
/// and is counted once per stratum.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` on a bad coordinate, a missing
/// stratum, or when no rows are found.
pub fn parse_strata_text(text: &str) -> Result<StratifiedLoci, ParseError> {
    let mut strata = StratifiedLoci::new();
    let (mut chrom_col, mut pos_col, mut stratum_col) = (0, 1, 2);
    let mut seen_data = false;

    for (i, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();

        if !seen_data {
            if let Some(header) = HeaderIndex::detect(&fields) {
                seen_data = true;
                chrom_col = header.find(CHROM_COLUMNS).unwrap_or(0);
                pos_col = header.find(POS_COLUMNS).ok_or_else(|| {
                    ParseError::InvalidFormat("Header has no position column".to_string())
                })?;
                stratum_col = header.find(STRATUM_COLUMNS).ok_or_else(|| {
                    ParseError::InvalidFormat("Header has no stratum column".to_string())
                })?;
                continue;
            }
        }
        if line.starts_with('#') {
            continue;
        }
        seen_data = true;

        let line_num = i + 1;
        let max_col = chrom_col.max(pos_col).max(stratum_col);
        if fields.len() <= max_col {
            return Err(ParseError::InvalidFormat(format!(
                "Line {line_num} has {} fields, expected at least {}",
                fields.len(),
                max_col + 1
            )));
        }

        let pos: u64 = fields[pos_col].trim().parse().map_err(|_| {
            ParseError::InvalidFormat(format!(
                "Invalid position on line {}: '{}'",
                line_num, fields[pos_col]
            ))
        })?;
        let stratum = fields[stratum_col].trim();
        if stratum.is_empty() {
            return Err(ParseError::InvalidFormat(format!(
                "Empty stratum on line {line_num}"
            )));
        }

        strata
            .entry(stratum.to_string())
            .or_default()
            .insert(Locus::new(fields[chrom_col].trim(), pos));
    }

    if strata.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No stratified positions found".to_string(),
        ));
    }

    Ok(strata)
}
