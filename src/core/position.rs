use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::NamingConvention;

/// A site on the genome: chromosome plus 1-based coordinate.
///
/// This is the key used by the lookup backends, which work at site
/// granularity (coverage and allele-number datasets have one row per base).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locus {
    pub chrom: String,
    pub pos: u64,
}

impl Locus {
    pub fn new(chrom: impl Into<String>, pos: u64) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
        }
    }

    /// Parse a `chrom:pos` string, as used by locus-keyed reference files.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (chrom, pos) = s.rsplit_once(':')?;
        if chrom.is_empty() {
            return None;
        }
        let pos = pos.trim().parse().ok()?;
        Some(Self::new(chrom.trim(), pos))
    }

    /// Region string understood by indexed-fetch tools (`chr1:100-100`)
    #[must_use]
    pub fn region(&self) -> String {
        format!("{}:{}-{}", self.chrom, self.pos, self.pos)
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.pos)
    }
}

/// A query position loaded from the upstream position list.
///
/// Positions without alleles are matched at site granularity; positions with
/// both `ref` and `alt` are matched on the full `(chrom, pos, ref, alt)` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub chrom: String,
    pub pos: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_allele: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_allele: Option<String>,
}

impl Position {
    pub fn new(chrom: impl Into<String>, pos: u64) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            ref_allele: None,
            alt_allele: None,
        }
    }

    #[must_use]
    pub fn with_alleles(mut self, ref_allele: impl Into<String>, alt_allele: impl Into<String>) -> Self {
        self.ref_allele = Some(ref_allele.into());
        self.alt_allele = Some(alt_allele.into());
        self
    }

    #[must_use]
    pub fn locus(&self) -> Locus {
        Locus::new(self.chrom.clone(), self.pos)
    }

    /// Whether this position is matched on alleles as well as coordinate
    #[must_use]
    pub fn has_alleles(&self) -> bool {
        self.ref_allele.is_some() && self.alt_allele.is_some()
    }

    /// Return a copy with the chromosome renamed to the given convention
    #[must_use]
    pub fn renamed(&self, convention: NamingConvention) -> Self {
        Self {
            chrom: convert_chrom_name(&self.chrom, convention),
            ..self.clone()
        }
    }

    /// Identifier in `chr:pos:REF>ALT` form, as expected by the scoring service
    #[must_use]
    pub fn variant_id(&self) -> String {
        let chrom = convert_chrom_name(&self.chrom, NamingConvention::Ucsc);
        match (&self.ref_allele, &self.alt_allele) {
            (Some(r), Some(a)) => format!("{chrom}:{}:{r}>{a}", self.pos),
            _ => format!("{chrom}:{}", self.pos),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.ref_allele, &self.alt_allele) {
            (Some(r), Some(a)) => write!(f, "{}:{}:{r}>{a}", self.chrom, self.pos),
            _ => write!(f, "{}:{}", self.chrom, self.pos),
        }
    }
}

/// Check if a chromosome name is a primary chromosome (1-22, X, Y).
/// Accepts both UCSC (`chr1`) and NCBI (`1`) spellings.
#[must_use]
pub fn is_primary_chromosome(name: &str) -> bool {
    let bare = name.strip_prefix("chr").unwrap_or(name);
    match bare {
        "X" | "Y" => true,
        n => n.parse::<u8>().is_ok_and(|v| (1..=22).contains(&v)) && !n.starts_with('0'),
    }
}

/// The default contig allowlist: `chr1`..`chr22`, `chrX`, `chrY`.
#[must_use]
pub fn standard_chromosomes() -> Vec<String> {
    (1..=22)
        .map(|i| format!("chr{i}"))
        .chain(["chrX".to_string(), "chrY".to_string()])
        .collect()
}

/// Sort key placing chromosomes in karyotype order: 1..22, X, Y, M, then
/// everything else by name.
#[must_use]
pub fn chrom_order(name: &str) -> (u32, &str) {
    let bare = name.strip_prefix("chr").unwrap_or(name);
    match bare {
        "X" => (23, ""),
        "Y" => (24, ""),
        "M" | "MT" => (25, ""),
        n => match n.parse::<u32>() {
            Ok(v) if !n.starts_with('0') => (v, ""),
            _ => (u32::MAX, bare),
        },
    }
}

/// Rename a chromosome to the requested convention by adding or stripping
/// the `chr` prefix. `Mixed` leaves the name untouched.
#[must_use]
pub fn convert_chrom_name(name: &str, convention: NamingConvention) -> String {
    match convention {
        NamingConvention::Ucsc if !name.starts_with("chr") => format!("chr{name}"),
        NamingConvention::Ncbi => name.strip_prefix("chr").unwrap_or(name).to_string(),
        _ => name.to_string(),
    }
}

/// Detect the naming convention used by a set of chromosome names
pub fn detect_naming_convention<'a>(names: impl IntoIterator<Item = &'a str>) -> NamingConvention {
    let mut has_chr_prefix = false;
    let mut has_no_prefix = false;

    for name in names {
        if name.starts_with("chr") {
            has_chr_prefix = true;
        } else {
            has_no_prefix = true;
        }
        if has_chr_prefix && has_no_prefix {
            break;
        }
    }

    match (has_chr_prefix, has_no_prefix) {
        (true, false) => NamingConvention::Ucsc,
        (false, true) => NamingConvention::Ncbi,
        _ => NamingConvention::Mixed,
    }
}
