//! Core data types shared by every stage of the pipeline.
//!
//! - [`Position`] / [`Locus`]: query coordinates at allele or site granularity
//! - [`Shard`]: one chromosome's worth of positions, the unit of parallel work
//! - [`AnnotationValue`], [`ConfidenceTier`]: merged annotation results
//! - [`PipelineConfig`]: the explicit configuration handed to each component
//!
//! ## Chromosome Naming
//!
//! Position lists and reference datasets frequently disagree on naming:
//!
//! | Source  | Chromosome 1 | X    |
//! |---------|--------------|------|
//! | UCSC    | chr1         | chrX |
//! | NCBI    | 1            | X    |
//!
//! The shard planner renames query positions to the reference convention
//! before dispatch; see [`position::convert_chrom_name`].
//!
//! [`Position`]: position::Position
//! [`Locus`]: position::Locus
//! [`Shard`]: shard::Shard
//! [`AnnotationValue`]: types::AnnotationValue
//! [`ConfidenceTier`]: types::ConfidenceTier
//! [`PipelineConfig`]: config::PipelineConfig

pub mod config;
pub mod position;
pub mod shard;
pub mod types;
