use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::constraint::{ConstraintBucket, Evidence};
use super::StatsError;
use crate::core::types::ConfidenceTier;
use crate::utils::io::write_atomically;

/// Result of one constraint analysis
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintReport {
    pub label: String,
    pub baseline: String,

    /// Tier filter applied to observed positions, if an annotation table was
    /// supplied
    pub min_tier: Option<ConfidenceTier>,

    pub buckets: Vec<ConstraintBucket>,
    pub generated_at: DateTime<Utc>,
}

impl ConstraintReport {
    #[must_use]
    pub fn new(
        label: &str,
        baseline: String,
        min_tier: Option<ConfidenceTier>,
        buckets: Vec<ConstraintBucket>,
    ) -> Self {
        Self {
            label: label.to_string(),
            baseline,
            min_tier,
            buckets,
            generated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn table_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.tsv", self.label))
    }

    #[must_use]
    pub fn report_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_report.txt", self.label))
    }

    #[must_use]
    pub fn baseline_rate(&self) -> f64 {
        self.buckets.first().map_or(0.0, |b| b.baseline_rate)
    }
}

fn fold_text(fold: f64) -> String {
    if fold.is_infinite() {
        "inf".to_string()
    } else {
        format!("{fold:.2}")
    }
}

impl fmt::Display for ConstraintReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(72);
        writeln!(f, "{rule}")?;
        writeln!(f, "CONSTRAINT ANALYSIS: {}", self.label)?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(
            f,
            "Baseline stratum: {} (rate {:.6})",
            self.baseline,
            self.baseline_rate()
        )?;
        match self.min_tier {
            Some(tier) => writeln!(f, "Observed positions counted at tier >= {tier}")?,
            None => writeln!(f, "No annotation table; observed positions not filtered")?,
        }
        writeln!(f)?;

        writeln!(f, "Confidence tiers of possible positions")?;
        writeln!(
            f,
            "{:<10} {:>12} {:>10} {:>10} {:>10} {:>10} {:>12}",
            "stratum", "possible", "high", "medium", "low", "missing", "mean_value"
        )?;
        for b in &self.buckets {
            let mean = b.mean_value.map_or_else(|| "-".to_string(), |m| format!("{m:.1}"));
            writeln!(
                f,
                "{:<10} {:>12} {:>10} {:>10} {:>10} {:>10} {:>12}",
                b.stratum, b.total_possible, b.high, b.medium, b.low, b.missing, mean
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Observed vs expected")?;
        writeln!(
            f,
            "{:<10} {:>12} {:>10} {:>12} {:>8} {:>12} {:>9}",
            "stratum", "possible", "observed", "expected", "fold", "p_value", "evidence"
        )?;
        for b in &self.buckets {
            writeln!(
                f,
                "{:<10} {:>12} {:>10} {:>12.1} {:>8} {:>12.3e} {:>9}",
                b.stratum,
                b.total_possible,
                b.observed,
                b.expected,
                fold_text(b.fold_depletion),
                b.p_value,
                b.evidence
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Interpretation")?;
        for b in self.buckets.iter().filter(|b| b.stratum != self.baseline) {
            let strength = match b.evidence {
                Evidence::Strong => "STRONG EVIDENCE",
                Evidence::Moderate => "MODERATE EVIDENCE",
                Evidence::Weak => "WEAK EVIDENCE",
            };
            writeln!(
                f,
                "  {}: {} of depletion (fold {}, p = {:.3e})",
                b.stratum,
                strength,
                fold_text(b.fold_depletion),
                b.p_value
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Analysis completed: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Write the per-stratum table as TSV
///
/// # Errors
///
/// Returns `StatsError::Write` on any IO failure.
pub fn write_table(path: &Path, report: &ConstraintReport) -> Result<(), StatsError> {
    write_atomically(path, |w| {
        let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(w);
        for bucket in &report.buckets {
            wtr.serialize(bucket).map_err(std::io::Error::from)?;
        }
        wtr.flush()
    })
    .map_err(|source| StatsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the plain-text summary report
///
/// # Errors
///
/// Returns `StatsError::Write` on any IO failure.
pub fn write_report(path: &Path, report: &ConstraintReport) -> Result<(), StatsError> {
    write_atomically(path, |w| write!(w, "{report}")).map_err(|source| StatsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::constraint::{score_strata, StratumCounts};

    fn report() -> ConstraintReport {
        let counts = vec![
            StratumCounts {
                stratum: "1".into(),
                total_possible: 1000,
                observed: 300,
                ..StratumCounts::default()
            },
            StratumCounts {
                stratum: "3".into(),
                total_possible: 1000,
                observed: 0,
                ..StratumCounts::default()
            },
        ];
        let (baseline, buckets) = score_strata(&counts, None).unwrap();
        ConstraintReport::new("hamming", baseline, Some(ConfidenceTier::Low), buckets)
    }

    #[test]
    fn test_text_report() {
        let text = report().to_string();
        assert!(text.contains("CONSTRAINT ANALYSIS: hamming"));
        assert!(text.contains("Baseline stratum: 1"));
        assert!(text.contains("3: STRONG EVIDENCE of depletion (fold inf, p = "));
        assert!(text.contains("Analysis completed: "));
        // Baseline gets no interpretation line
        assert!(!text.contains("  1: "));
    }

    #[test]
    fn test_table_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();
        let path = report.table_path(dir.path());
        write_table(&path, &report).unwrap();
        write_report(&report.report_path(dir.path()), &report).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("stratum\ttotal_possible\thigh"));
        assert_eq!(lines.count(), 2);
        assert!(text.contains("\tinf\t"));
        assert!(dir.path().join("hamming_report.txt").exists());
    }
}
