//! Sharded annotation of query positions.
//!
//! Positions are partitioned into one [`Shard`](crate::core::shard::Shard) per
//! chromosome, renamed to the reference's naming convention, and resolved
//! either by an external query tool per chromosome (query mode) or by a
//! [`PositionLookup`](crate::lookup::PositionLookup) backend (lookup mode).
//! Shard results are merged as they complete.
//!
//! Every input position appears exactly once in the merged table, with one of
//! these statuses:
//!
//! | Status         | Meaning                                             |
//! |----------------|-----------------------------------------------------|
//! | `observed`     | the reference holds a value (zero included)         |
//! | `absent`       | the shard was resolved but the reference has no row |
//! | `shard_failed` | the shard's query failed; `reason` says why         |
//! | `skipped`      | the contig is outside the allowlist                 |

pub mod annotate;
pub mod merger;
pub mod planner;

pub use annotate::{annotate_with_lookup, annotate_with_query, write_annotations, AnnotationRun};
pub use merger::{AnnotationMerger, MergeTally};
pub use planner::{PlannedPosition, ShardPlan, ShardPlanner};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::position::standard_chromosomes;
use crate::core::types::NamingConvention;
use crate::executor::ExecutorError;
use crate::lookup::LookupError;
use crate::parsing::positions::ParseError;
use crate::parsing::query_rows::RowLayout;

/// Placeholder in `source_pattern` for the chromosome name
pub const CHROM_PLACEHOLDER: &str = "{chrom}";

/// Placeholder in the query arguments for the per-chromosome source file
pub const SOURCE_PLACEHOLDER: &str = "{source}";

#[derive(Error, Debug)]
pub enum ShardError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Failed to write annotations: {0}")]
    Write(#[from] ParseError),

    #[error("No source directory configured for query mode")]
    NoSourceDir,
}

/// External-query settings for the `annotate` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Directory holding one indexed source file per chromosome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    /// Source file name, with `{chrom}` replaced by the reference-style name
    pub source_pattern: String,

    /// Query program and its arguments. `{regions}` is the shard's region
    /// list and `{source}` the chromosome's source file.
    pub program: String,
    pub args: Vec<String>,

    /// Column layout of the program's output
    pub layout: RowLayout,

    /// Contigs that are queried at all; others are reported as skipped.
    /// `None` queries every contig.
    pub contigs: Option<Vec<String>>,

    /// Naming convention of the reference files
    pub reference_naming: NamingConvention,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            source_pattern: "gnomad.genomes.v4.1.sites.{chrom}.vcf.bgz".to_string(),
            program: "bcftools".to_string(),
            args: [
                "query",
                "-R",
                "{regions}",
                "-f",
                r"%CHROM\t%POS\t%REF\t%ALT\t%INFO/AC\n",
                "{source}",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            layout: RowLayout::default(),
            contigs: Some(standard_chromosomes()),
            reference_naming: NamingConvention::Ucsc,
        }
    }
}
