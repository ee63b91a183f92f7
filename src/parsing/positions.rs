use std::path::Path;
use thiserror::Error;

use crate::core::position::Position;
use crate::parsing::{HeaderIndex, ALT_COLUMNS, CHROM_COLUMNS, POS_COLUMNS, REF_COLUMNS};
use crate::utils::io::read_text;
use crate::utils::validation::is_valid_allele;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid table format: {0}")]
    InvalidFormat(String),

    #[error("Table error: {0}")]
    Table(#[from] csv::Error),
}

/// Column layout of a position table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PositionColumns {
    chrom: usize,
    pos: usize,
    alleles: Option<(usize, usize)>,
}

impl PositionColumns {
    /// Layout when no header is present: `chr pos [ref alt]`
    fn positional(field_count: usize) -> Self {
        Self {
            chrom: 0,
            pos: 1,
            alleles: (field_count >= 4).then_some((2, 3)),
        }
    }

    fn from_header(header: &HeaderIndex) -> Result<Self, ParseError> {
        let chrom = header.find(CHROM_COLUMNS).ok_or_else(|| {
            ParseError::InvalidFormat("Header has no chromosome column".to_string())
        })?;
        let pos = header.find(POS_COLUMNS).ok_or_else(|| {
            ParseError::InvalidFormat("Header has no position column".to_string())
        })?;
        let alleles = header.find(REF_COLUMNS).zip(header.find(ALT_COLUMNS));
        Ok(Self {
            chrom,
            pos,
            alleles,
        })
    }
}

/// Parse a position list file (optionally gzip-compressed)
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_positions_file(path: &Path) -> Result<Vec<Position>, ParseError> {
    let content = read_text(path)?;
    parse_positions_text(&content)
}

/// Parse tab-delimited position text: `chr pos [ref alt]`
///
/// A header row is optional. With a header, columns are located by name so
/// wide upstream tables (e.g. mutation-path listings) can be consumed as-is.
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` if a line has too few fields, an
/// invalid coordinate or allele, or if no positions are found.
pub fn parse_positions_text(text: &str) -> Result<Vec<Position>, ParseError> {
    let mut positions = Vec::new();
    let mut columns: Option<PositionColumns> = None;
    let mut first_data_line = true;

    for (i, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();

        if first_data_line {
            if let Some(header) = HeaderIndex::detect(&fields) {
                first_data_line = false;
                columns = Some(PositionColumns::from_header(&header)?);
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            first_data_line = false;
        } else if line.starts_with('#') {
            continue;
        }

        // Line numbers in errors are 1-based for user friendliness
        let line_num = i + 1;
        let layout = *columns.get_or_insert_with(|| PositionColumns::positional(fields.len()));

        let needed = [layout.chrom, layout.pos]
            .into_iter()
            .chain(layout.alleles.map(|(r, a)| r.max(a)))
            .max()
            .unwrap_or(1);
        if fields.len() <= needed {
            return Err(ParseError::InvalidFormat(format!(
                "Line {line_num} has {} fields, expected at least {}",
                fields.len(),
                needed + 1
            )));
        }

        let chrom = fields[layout.chrom].trim();
        if chrom.is_empty() {
            return Err(ParseError::InvalidFormat(format!(
                "Empty chromosome on line {line_num}"
            )));
        }
        let pos: u64 = fields[layout.pos].trim().parse().map_err(|_| {
            ParseError::InvalidFormat(format!(
                "Invalid position on line {}: '{}'",
                line_num, fields[layout.pos]
            ))
        })?;

        let mut position = Position::new(chrom, pos);
        if let Some((r, a)) = layout.alleles {
            let (ref_allele, alt_allele) = (fields[r].trim(), fields[a].trim());
            if !is_valid_allele(ref_allele) || !is_valid_allele(alt_allele) {
                return Err(ParseError::InvalidFormat(format!(
                    "Invalid alleles on line {line_num}: '{ref_allele}' > '{alt_allele}'"
                )));
            }
            position = position.with_alleles(
                ref_allele.to_ascii_uppercase(),
                alt_allele.to_ascii_uppercase(),
            );
        }

        positions.push(position);
    }

    if positions.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No positions found in file".to_string(),
        ));
    }

    Ok(positions)
}
