//! Per-site reference value lines.
//!
//! Two layouts are accepted, both tab-delimited:
//!
//! ```text
//! chr1:12345<TAB>152312
//! chr1<TAB>12345<TAB>152312[<TAB>...]
//! ```
//!
//! Parsing borrows from the line buffer so that scanning billions of lines
//! allocates nothing for the lines that are not of interest.

/// One reference entry, borrowing from the source line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefRecord<'a> {
    pub chrom: &'a str,
    pub pos: u64,
    pub value: u64,
}

/// Parse a single reference line.
///
/// Returns `None` for comments, headers and any line that does not match
/// either layout; callers count these as skipped.
#[must_use]
pub fn parse_reference_line(line: &str) -> Option<RefRecord<'_>> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split('\t');
    let first = fields.next()?;
    let second = fields.next()?;

    if let Some((chrom, pos)) = first.rsplit_once(':') {
        let pos = pos.parse().ok()?;
        let value = parse_value(second)?;
        if chrom.is_empty() {
            return None;
        }
        return Some(RefRecord { chrom, pos, value });
    }

    let pos = second.parse().ok()?;
    let value = parse_value(fields.next()?)?;
    if first.is_empty() {
        return None;
    }
    Some(RefRecord {
        chrom: first,
        pos,
        value,
    })
}

/// Values are non-negative counts; some exports write them as floats (`1.52e5`)
fn parse_value(field: &str) -> Option<u64> {
    let field = field.trim();
    if let Ok(v) = field.parse::<u64>() {
        return Some(v);
    }
    let v: f64 = field.parse().ok()?;
    if v.is_finite() && v >= 0.0 {
        // Truncation after rounding is the intent here
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(v.round() as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locus_layout() {
        assert_eq!(
            parse_reference_line("chr1:12345\t152312\n"),
            Some(RefRecord {
                chrom: "chr1",
                pos: 12345,
                value: 152_312
            })
        );
    }

    #[test]
    fn test_column_layout() {
        let rec = parse_reference_line("chrX\t77\t0\textra").unwrap();
        assert_eq!(rec.chrom, "chrX");
        assert_eq!(rec.pos, 77);
        assert_eq!(rec.value, 0);
    }

    #[test]
    fn test_float_values() {
        assert_eq!(parse_reference_line("1\t5\t1.5e2").unwrap().value, 150);
        assert!(parse_reference_line("1\t5\t-3").is_none());
        assert!(parse_reference_line("1\t5\tNaN").is_none());
    }

    #[test]
    fn test_skipped_lines() {
        assert!(parse_reference_line("#locus\tAN").is_none());
        assert!(parse_reference_line("locus\tAN").is_none());
        assert!(parse_reference_line("chrom\tpos\tvalue").is_none());
        assert!(parse_reference_line("").is_none());
        assert!(parse_reference_line("chr1:12\t.").is_none());
        assert!(parse_reference_line(":12\t5").is_none());
    }
}
