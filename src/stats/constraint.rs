use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::report::ConstraintReport;
use super::{ConstraintConfig, StatsError};
use crate::core::position::{convert_chrom_name, Locus};
use crate::core::types::{ConfidenceTier, NamingConvention};
use crate::parsing::annotations::SiteAnnotation;
use crate::parsing::strata::StratifiedLoci;

/// Strength of the depletion signal in one stratum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Strong,
    Moderate,
    Weak,
}

impl Evidence {
    #[must_use]
    pub fn classify(fold_depletion: f64, p_value: f64) -> Self {
        if fold_depletion > 10.0 && p_value < 0.001 {
            Self::Strong
        } else if fold_depletion > 2.0 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-stratum counts before any rate is applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StratumCounts {
    pub stratum: String,
    pub total_possible: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub missing: u64,

    /// Observed positions that are also possible in this stratum
    pub observed_total: u64,

    /// Of those, the ones meeting the tier threshold
    pub observed: u64,

    /// Mean annotation value over possible positions that have one
    pub mean_value: Option<f64>,
}

impl StratumCounts {
    #[allow(clippy::cast_precision_loss)]
    fn observed_rate(&self) -> f64 {
        if self.total_possible == 0 {
            0.0
        } else {
            self.observed as f64 / self.total_possible as f64
        }
    }

    fn add_tier(&mut self, tier: ConfidenceTier) {
        match tier {
            ConfidenceTier::High => self.high += 1,
            ConfidenceTier::Medium => self.medium += 1,
            ConfidenceTier::Low => self.low += 1,
            ConfidenceTier::Missing => self.missing += 1,
        }
    }

    /// Count every stratum of `possible` and `observed`.
    ///
    /// Without an annotation table every position is `missing` and observed
    /// positions are not filtered by tier. Strata with no possible positions
    /// are dropped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tally(
        possible: &StratifiedLoci,
        observed: &StratifiedLoci,
        annotations: Option<&HashMap<Locus, SiteAnnotation>>,
        min_tier: ConfidenceTier,
    ) -> Vec<Self> {
        let annotations: Option<HashMap<Locus, SiteAnnotation>> =
            annotations.map(|sites| sites.iter().map(|(l, a)| (canonical(l), *a)).collect());
        let site = |locus: &Locus| annotations.as_ref().and_then(|sites| sites.get(locus));

        let mut counts = Vec::new();
        let strata: BTreeSet<&String> = possible.keys().chain(observed.keys()).collect();
        for stratum in strata {
            let candidates: HashSet<Locus> = possible
                .get(stratum)
                .map(|loci| loci.iter().map(canonical).collect())
                .unwrap_or_default();
            if candidates.is_empty() {
                tracing::warn!(
                    "Stratum {} has observed positions but no possible positions; excluded",
                    stratum
                );
                continue;
            }

            let mut entry = Self {
                stratum: stratum.clone(),
                total_possible: candidates.len() as u64,
                ..Self::default()
            };

            let mut value_sum = 0.0;
            let mut value_count = 0u64;
            for locus in &candidates {
                let annotation = site(locus);
                entry.add_tier(annotation.map_or(ConfidenceTier::Missing, |a| a.tier));
                if let Some(value) = annotation.and_then(|a| a.value) {
                    value_sum += value as f64;
                    value_count += 1;
                }
            }
            if value_count > 0 {
                entry.mean_value = Some(value_sum / value_count as f64);
            }

            let mut outside = 0usize;
            for locus in observed.get(stratum).into_iter().flatten() {
                let locus = canonical(locus);
                if !candidates.contains(&locus) {
                    outside += 1;
                    continue;
                }
                entry.observed_total += 1;
                let passes = annotations.is_none()
                    || site(&locus).map_or(ConfidenceTier::Missing, |a| a.tier) >= min_tier;
                if passes {
                    entry.observed += 1;
                }
            }
            if outside > 0 {
                tracing::warn!(
                    "Stratum {}: {} observed positions are not possible positions; ignored",
                    stratum,
                    outside
                );
            }

            counts.push(entry);
        }

        counts.sort_by(|a, b| stratum_order(&a.stratum, &b.stratum));
        counts
    }
}

/// Expected vs observed for one stratum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintBucket {
    pub stratum: String,
    pub total_possible: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub missing: u64,
    pub observed_total: u64,
    pub observed: u64,
    pub observed_rate: f64,
    pub mean_value: Option<f64>,
    pub baseline_rate: f64,
    pub expected: f64,
    #[serde(with = "fold_serde")]
    pub fold_depletion: f64,
    pub p_value: f64,
    pub evidence: Evidence,
}

/// JSON has no infinity, so a non-finite fold is written as a string
/// (`"inf"`) and read back from either form.
mod fold_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fold: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if fold.is_finite() {
            serializer.serialize_f64(*fold)
        } else {
            serializer.collect_str(fold)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Fold {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Fold::deserialize(deserializer)? {
            Fold::Number(fold) => Ok(fold),
            Fold::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Locus with UCSC naming, so files with different conventions line up
fn canonical(locus: &Locus) -> Locus {
    Locus::new(convert_chrom_name(&locus.chrom, NamingConvention::Ucsc), locus.pos)
}

/// Numeric strata in numeric order, then the rest lexically
fn stratum_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// One-sided depletion p-value `P(X ≤ observed)`
fn depletion_p_value(stratum: &str, n: u64, observed: u64, rate: f64) -> Result<f64, StatsError> {
    if rate <= 0.0 {
        return Ok(1.0);
    }
    let distribution = Binomial::new(rate, n).map_err(|e| StatsError::Distribution {
        stratum: stratum.to_string(),
        detail: e.to_string(),
    })?;
    Ok(distribution.cdf(observed).max(f64::MIN_POSITIVE))
}

/// Apply the baseline rate to each stratum.
///
/// # Errors
///
/// Returns `StatsError::NoStrata` for empty input and
/// `StatsError::UnknownBaseline` when an explicit baseline is not among the
/// counted strata.
pub fn score_strata(
    counts: &[StratumCounts],
    baseline: Option<&str>,
) -> Result<(String, Vec<ConstraintBucket>), StatsError> {
    let reference = match baseline {
        Some(key) => counts
            .iter()
            .find(|c| c.stratum == key)
            .ok_or_else(|| StatsError::UnknownBaseline(key.to_string()))?,
        // First stratum wins ties
        None => counts
            .iter()
            .reduce(|best, c| if c.observed_rate() > best.observed_rate() { c } else { best })
            .ok_or(StatsError::NoStrata)?,
    };
    let baseline_rate = reference.observed_rate();
    tracing::info!(
        "Baseline stratum {}: {}/{} observed (rate {:.6})",
        reference.stratum,
        reference.observed,
        reference.total_possible,
        baseline_rate
    );

    let mut buckets = Vec::with_capacity(counts.len());
    for c in counts {
        #[allow(clippy::cast_precision_loss)]
        let expected = c.total_possible as f64 * baseline_rate;
        #[allow(clippy::cast_precision_loss)]
        let fold_depletion = if c.observed == 0 {
            f64::INFINITY
        } else {
            expected / c.observed as f64
        };
        let p_value = depletion_p_value(&c.stratum, c.total_possible, c.observed, baseline_rate)?;

        buckets.push(ConstraintBucket {
            stratum: c.stratum.clone(),
            total_possible: c.total_possible,
            high: c.high,
            medium: c.medium,
            low: c.low,
            missing: c.missing,
            observed_total: c.observed_total,
            observed: c.observed,
            observed_rate: c.observed_rate(),
            mean_value: c.mean_value,
            baseline_rate,
            expected,
            fold_depletion,
            p_value,
            evidence: Evidence::classify(fold_depletion, p_value),
        });
    }

    Ok((reference.stratum.clone(), buckets))
}

/// Full constraint analysis over possible and observed strata
///
/// # Errors
///
/// See [`score_strata`].
pub fn analyze(
    possible: &StratifiedLoci,
    observed: &StratifiedLoci,
    annotations: Option<&HashMap<Locus, SiteAnnotation>>,
    config: &ConstraintConfig,
) -> Result<ConstraintReport, StatsError> {
    let counts = StratumCounts::tally(possible, observed, annotations, config.min_tier);
    let (baseline, buckets) = score_strata(&counts, config.baseline.as_deref())?;
    Ok(ConstraintReport::new(
        &config.label,
        baseline,
        annotations.is_some().then_some(config.min_tier),
        buckets,
    ))
}
