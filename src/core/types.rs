use serde::{Deserialize, Serialize};
use std::fmt;

/// Naming convention used for chromosomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// UCSC style: chr1, chr2, ..., chrX, chrY
    #[default]
    Ucsc,
    /// NCBI/Ensembl style: 1, 2, ..., X, Y
    Ncbi,
    /// Mixed or unknown
    Mixed,
}

/// Value resolved for a single query position.
///
/// `Absent` and `ShardFailed` are both "missing" but for different reasons
/// and must stay distinguishable in every output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AnnotationValue {
    /// The reference holds a value for this position (may be zero)
    Observed { value: u64 },
    /// The shard was queried successfully but the reference has no entry
    Absent,
    /// The shard's query failed; the position was never resolved
    ShardFailed { reason: String },
    /// The position's contig was not queried (outside the contig allowlist)
    Skipped,
}

impl AnnotationValue {
    /// Observed value, or `default` for every kind of missing
    #[must_use]
    pub fn value_or(&self, default: u64) -> u64 {
        match self {
            Self::Observed { value } => *value,
            _ => default,
        }
    }

    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Observed { .. } => "observed",
            Self::Absent => "absent",
            Self::ShardFailed { .. } => "shard_failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::ShardFailed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Confidence tier derived from an annotation value.
///
/// Tiers partition the value domain: every observed value lands in exactly
/// one of `High`, `Medium` or `Low`; every unresolved position is `Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Missing,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub const ALL: [Self; 4] = [Self::High, Self::Medium, Self::Low, Self::Missing];

    #[must_use]
    pub fn classify(value: &AnnotationValue, thresholds: &TierThresholds) -> Self {
        match value {
            AnnotationValue::Observed { value } => thresholds.tier_for(*value),
            _ => Self::Missing,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "missing" => Ok(Self::Missing),
            other => Err(format!("unknown confidence tier '{other}'")),
        }
    }
}

/// Allele-number style thresholds separating the observed tiers.
///
/// `high` ~ 50K individuals genotyped, `medium` ~ 25K.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub high: u64,
    pub medium: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high: 100_000,
            medium: 50_000,
        }
    }
}

impl TierThresholds {
    #[must_use]
    pub fn tier_for(&self, value: u64) -> ConfidenceTier {
        if value >= self.high {
            ConfidenceTier::High
        } else if value >= self.medium {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_partition_values() {
        let t = TierThresholds::default();
        assert_eq!(t.tier_for(0), ConfidenceTier::Low);
        assert_eq!(t.tier_for(49_999), ConfidenceTier::Low);
        assert_eq!(t.tier_for(50_000), ConfidenceTier::Medium);
        assert_eq!(t.tier_for(99_999), ConfidenceTier::Medium);
        assert_eq!(t.tier_for(100_000), ConfidenceTier::High);
        assert_eq!(t.tier_for(u64::MAX), ConfidenceTier::High);
    }

    #[test]
    fn test_observed_zero_is_not_missing() {
        let t = TierThresholds::default();
        let zero = AnnotationValue::Observed { value: 0 };
        assert_eq!(ConfidenceTier::classify(&zero, &t), ConfidenceTier::Low);
        assert_eq!(
            ConfidenceTier::classify(&AnnotationValue::Absent, &t),
            ConfidenceTier::Missing
        );
        assert_eq!(
            ConfidenceTier::classify(
                &AnnotationValue::ShardFailed {
                    reason: "boom".into()
                },
                &t
            ),
            ConfidenceTier::Missing
        );
    }

    #[test]
    fn test_tier_ordering_and_parse() {
        assert!(ConfidenceTier::High > ConfidenceTier::Medium);
        assert!(ConfidenceTier::Low > ConfidenceTier::Missing);
        assert_eq!("Medium".parse::<ConfidenceTier>(), Ok(ConfidenceTier::Medium));
        assert!("bogus".parse::<ConfidenceTier>().is_err());
    }

    #[test]
    fn test_value_or_and_status() {
        assert_eq!(AnnotationValue::Observed { value: 7 }.value_or(0), 7);
        assert_eq!(AnnotationValue::Absent.value_or(0), 0);
        assert_eq!(AnnotationValue::Skipped.status(), "skipped");
        let failed = AnnotationValue::ShardFailed {
            reason: "timeout".into(),
        };
        assert_eq!(failed.status(), "shard_failed");
        assert_eq!(failed.reason(), Some("timeout"));
    }
}
