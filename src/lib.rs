//! # locus-annotator
//!
//! A library for annotating large sets of genomic positions against
//! multi-gigabyte, chromosome-partitioned reference datasets, and for driving
//! the annotated positions through an expensive external scoring service.
//!
//! Reference datasets such as population allele counts or per-base allele
//! numbers ship as one file per chromosome. Querying them for millions of
//! positions is dominated by IO and external tool runtime, so the work is
//! split into one shard per chromosome and run concurrently, with failures
//! isolated to the shard that produced them.
//!
//! ## Features
//!
//! - **Sharded queries**: one external query per chromosome, bounded
//!   concurrency, per-shard timeouts
//! - **Three lookup strategies**: in-memory index, streaming scan and
//!   indexed random access, with identical results
//! - **Explicit absence**: unobserved positions are `absent`, never a
//!   silent zero; failed shards are marked `shard_failed` with a reason
//! - **Resumable scoring**: checkpointed batches, at-least-once per batch
//! - **Constraint statistics**: fold depletion and exact binomial tests per
//!   stratum
//!
//! ## Example
//!
//! ```rust,no_run
//! use locus_annotator::core::types::TierThresholds;
//! use locus_annotator::lookup::InMemoryIndex;
//! use locus_annotator::parsing::positions::parse_positions_text;
//! use locus_annotator::shard::{annotate_with_lookup, AnnotationConfig};
//! use std::path::Path;
//!
//! let positions = parse_positions_text("chr1\t12345\nchr2\t500\n").unwrap();
//! let index = InMemoryIndex::load(Path::new("allele_number.tsv.gz"), 50_000_000).unwrap();
//!
//! let run = annotate_with_lookup(
//!     &positions,
//!     &index,
//!     &AnnotationConfig::default(),
//!     4,
//!     &TierThresholds::default(),
//! )
//! .unwrap();
//!
//! for row in &run.rows {
//!     println!("{}:{} {} {}", row.chr, row.pos, row.status, row.tier);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Positions, shards, annotation values and configuration
//! - [`executor`]: Concurrent external processes with timeouts
//! - [`lookup`]: Position lookup backends
//! - [`shard`]: Shard planning and result merging
//! - [`scoring`]: Batched, resumable scoring
//! - [`stats`]: Constraint statistics
//! - [`parsing`]: Input and output table formats
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod core;
pub mod executor;
pub mod lookup;
pub mod parsing;
pub mod scoring;
pub mod shard;
pub mod stats;
pub mod utils;

// Re-export commonly used types for convenience
pub use crate::core::config::PipelineConfig;
pub use crate::core::position::{Locus, Position};
pub use crate::core::shard::Shard;
pub use crate::core::types::*;
pub use lookup::{LookupStrategy, PositionLookup};
pub use shard::{AnnotationConfig, MergeTally};
