//! Command-line interface for locus-annotator.
//!
//! Available commands:
//!
//! - **annotate**: Annotate a position list against a reference dataset
//! - **score**: Score annotated items against an external service, resumably
//! - **constraint**: Stratified depletion statistics over observed positions
//!
//! ## Usage
//!
//! ```text
//! # One bcftools query per chromosome over a directory of per-chromosome VCFs
//! locus-annotator annotate -p positions.tsv -o annotated.tsv --source-dir /data/gnomad/vcf
//!
//! # Site lookup against a flat coverage table, strategy picked from the budget
//! locus-annotator annotate -p positions.tsv -o coverage.tsv \
//!     --reference allele_number.tsv.gz --memory-budget-gb 32
//!
//! # Score in batches of 250; rerun the same command to resume
//! locus-annotator score -i variants.tsv -o scores/ --batch-size 250
//!
//! # Depletion by Hamming distance
//! locus-annotator constraint --possible possible.tsv --observed observed.tsv \
//!     --annotations coverage.tsv -o constraint/
//! ```
//!
//! Exit status is 0 when everything succeeded, 2 when the run finished but
//! some shards or items failed (or batches remain), and 1 on a fatal error.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

pub mod annotate;
pub mod constraint;
pub mod score;

#[derive(Parser)]
#[command(name = "locus-annotator")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Annotate genomic positions against large reference datasets and score them in resumable batches")]
#[command(
    long_about = "locus-annotator annotates millions of genomic positions against chromosome-partitioned reference datasets.\n\nIt provides:\n- Sharded, parallel queries of indexed per-chromosome files\n- In-memory, streaming and indexed site lookups\n- Checkpointed batch scoring against an external service\n- Depletion statistics across position strata"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pipeline configuration (JSON); command-line flags override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Annotate positions by sharded query or site lookup
    Annotate(annotate::AnnotateArgs),

    /// Score items against an external service in checkpointed batches
    Score(score::ScoreArgs),

    /// Compute stratified constraint statistics
    Constraint(constraint::ConstraintArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// How a command finished, when it did not abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,

    /// Finished with per-unit failures, or with work left to resume
    Partial,
}

impl RunStatus {
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Complete => ExitCode::SUCCESS,
            Self::Partial => ExitCode::from(2),
        }
    }
}
