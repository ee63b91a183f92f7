//! Constraint (depletion) statistics over stratified positions.
//!
//! Given the possible positions of each stratum and the positions actually
//! observed in a population dataset, each stratum is compared against a
//! baseline rate:
//!
//! | Column           | Definition                                        |
//! |------------------|---------------------------------------------------|
//! | `expected`       | `total_possible × baseline_rate`                  |
//! | `fold_depletion` | `expected / observed`, `inf` when nothing observed |
//! | `p_value`        | `P(X ≤ observed)`, `X ~ Binomial(total_possible, baseline_rate)` |
//!
//! Observed positions only count when their annotation reaches the
//! configured minimum confidence tier.

pub mod constraint;
pub mod report;

pub use constraint::{analyze, ConstraintBucket, Evidence, StratumCounts};
pub use report::{write_report, write_table, ConstraintReport};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::ConfidenceTier;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Baseline stratum '{0}' has no possible positions")]
    UnknownBaseline(String),

    #[error("No stratum has any possible positions")]
    NoStrata,

    #[error("Invalid binomial parameters for stratum '{stratum}': {detail}")]
    Distribution { stratum: String, detail: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Constraint analysis settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    /// Stratum supplying the baseline rate; the least depleted stratum when
    /// unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,

    /// Lowest annotation tier an observed position may have and still count
    pub min_tier: ConfidenceTier,

    /// Prefix for output file names
    pub label: String,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            baseline: None,
            min_tier: ConfidenceTier::Low,
            label: "constraint".to_string(),
        }
    }
}
