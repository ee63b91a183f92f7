use serde::{Deserialize, Serialize};

use super::client::TrackScore;

/// Per-item aggregate over all of an item's track scores.
///
/// Focus columns aggregate only the tracks whose target matches one of the
/// configured focus targets; they are empty when no track matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item_id: String,
    pub quantile_mean: f64,
    pub quantile_max: f64,
    /// Sample standard deviation; empty for a single track
    pub quantile_std: Option<f64>,
    pub n_tracks: usize,
    pub raw_mean: f64,
    pub raw_max: f64,
    pub focus_quantile_mean: Option<f64>,
    pub focus_quantile_max: Option<f64>,
    pub focus_raw_mean: Option<f64>,
    pub focus_raw_max: Option<f64>,
}

#[derive(Debug, Default)]
struct Moments {
    n: usize,
    sum: f64,
    sum_sq: f64,
    max: f64,
}

impl Moments {
    fn push(&mut self, x: f64) {
        self.max = if self.n == 0 { x } else { self.max.max(x) };
        self.n += 1;
        self.sum += x;
        self.sum_sq += x * x;
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample_std(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        let n = self.n as f64;
        let variance = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        Some(variance.max(0.0).sqrt())
    }

    fn max(&self) -> Option<f64> {
        (self.n > 0).then_some(self.max)
    }
}

/// Whether a track's target names one of `focus` (case-insensitive substring)
fn is_focus(score: &TrackScore, focus: &[String]) -> bool {
    score.target.as_deref().is_some_and(|target| {
        let target = target.to_uppercase();
        focus.iter().any(|f| target.contains(&f.to_uppercase()))
    })
}

/// Summarize one item's track scores. Returns `None` for an empty list.
#[must_use]
pub fn summarize(item_id: &str, scores: &[TrackScore], focus: &[String]) -> Option<ItemSummary> {
    let mut quantile = Moments::default();
    let mut raw = Moments::default();
    let mut focus_quantile = Moments::default();
    let mut focus_raw = Moments::default();

    for score in scores {
        quantile.push(score.quantile_score);
        raw.push(score.raw_score);
        if !focus.is_empty() && is_focus(score, focus) {
            focus_quantile.push(score.quantile_score);
            focus_raw.push(score.raw_score);
        }
    }

    Some(ItemSummary {
        item_id: item_id.to_string(),
        quantile_mean: quantile.mean()?,
        quantile_max: quantile.max()?,
        quantile_std: quantile.sample_std(),
        n_tracks: quantile.n,
        raw_mean: raw.mean()?,
        raw_max: raw.max()?,
        focus_quantile_mean: focus_quantile.mean(),
        focus_quantile_max: focus_quantile.max(),
        focus_raw_mean: focus_raw.mean(),
        focus_raw_max: focus_raw.max(),
    })
}

/// Order summaries by `raw_max`, highest first; ties keep their order
pub fn sort_by_impact(summaries: &mut [ItemSummary]) {
    summaries.sort_by(|a, b| b.raw_max.total_cmp(&a.raw_max));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str, q: f64, r: f64, target: Option<&str>) -> TrackScore {
        TrackScore {
            track: name.into(),
            quantile_score: q,
            raw_score: r,
            target: target.map(Into::into),
        }
    }

    #[test]
    fn test_summarize_aggregates() {
        let scores = vec![
            track("a", 1.0, 10.0, Some("JunD")),
            track("b", 3.0, -2.0, Some("CTCF")),
            track("c", 5.0, 4.0, None),
        ];
        let s = summarize("chr1:5:A>G", &scores, &["JUN".to_string()]).unwrap();
        assert_eq!(s.n_tracks, 3);
        assert!((s.quantile_mean - 3.0).abs() < 1e-12);
        assert_eq!(s.quantile_max, 5.0);
        assert!((s.quantile_std.unwrap() - 2.0).abs() < 1e-12);
        assert!((s.raw_mean - 4.0).abs() < 1e-12);
        assert_eq!(s.raw_max, 10.0);
        assert_eq!(s.focus_raw_max, Some(10.0));
        assert_eq!(s.focus_quantile_mean, Some(1.0));
    }

    #[test]
    fn test_single_track_and_empty() {
        let s = summarize("x", &[track("a", 0.5, -1.0, None)], &[]).unwrap();
        assert_eq!(s.quantile_std, None);
        assert_eq!(s.raw_max, -1.0);
        assert_eq!(s.focus_raw_mean, None);
        assert!(summarize("x", &[], &[]).is_none());
    }

    #[test]
    fn test_sort_by_impact_is_stable() {
        let mut summaries: Vec<ItemSummary> = [("a", 1.0), ("b", 5.0), ("c", 1.0)]
            .iter()
            .map(|(id, raw)| summarize(id, &[track("t", 0.0, *raw, None)], &[]).unwrap())
            .collect();
        sort_by_impact(&mut summaries);
        let ids: Vec<&str> = summaries.iter().map(|s| s.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
