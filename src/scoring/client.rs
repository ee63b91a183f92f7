use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::ScoringConfig;
use crate::core::position::{convert_chrom_name, Position};
use crate::core::types::NamingConvention;
use crate::utils::validation::truncate_chars;

/// Characters of an error response body kept in the failure reason
const MAX_BODY_CHARS: usize = 300;

/// Why one item could not be scored
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("item has no ref/alt alleles")]
    MissingAlleles,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable response: {0}")]
    Decode(String),

    #[error("service returned no scores")]
    Empty,

    #[error("scoring task aborted: {0}")]
    Aborted(String),
}

impl ScoreError {
    /// Rate limiting, server errors and transport problems are worth retrying
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// One track's score for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackScore {
    pub track: String,
    pub quantile_score: f64,
    pub raw_score: f64,

    /// Assay target (e.g. a transcription factor), when the track has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// An external per-item scoring service
pub trait ItemScorer: Send + Sync + 'static {
    /// Score one item across all tracks
    fn score(
        &self,
        item: &Position,
    ) -> impl Future<Output = Result<Vec<TrackScore>, ScoreError>> + Send;
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    chromosome: String,
    position: u64,
    reference_bases: &'a str,
    alternate_bases: &'a str,
    interval_width: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    scores: Vec<TrackScore>,
}

/// JSON-over-HTTP scoring client with bearer authentication and retries
#[derive(Debug, Clone)]
pub struct HttpScorer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    interval_width: u64,
    max_retries: usize,
    retry_base_delay: Duration,
}

impl HttpScorer {
    /// # Errors
    ///
    /// Returns the reqwest error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, api_key: &str, config: &ScoringConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("locus-annotator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            interval_width: config.interval_width,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    async fn score_once(&self, request: &ScoreRequest<'_>) -> Result<Vec<TrackScore>, ScoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ScoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoreError::Status {
                status: status.as_u16(),
                body: truncate_chars(body.trim(), MAX_BODY_CHARS).to_string(),
            });
        }

        let parsed: ScoreResponse = response
            .json()
            .await
            .map_err(|e| ScoreError::Decode(e.to_string()))?;
        if parsed.scores.is_empty() {
            return Err(ScoreError::Empty);
        }
        Ok(parsed.scores)
    }
}

/// Exponential backoff: base, 2x base, 4x base, ... capped at 64x
#[must_use]
pub fn retry_backoff(base: Duration, attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(6) as u32;
    base.saturating_mul(1 << shift)
}

impl ItemScorer for HttpScorer {
    async fn score(&self, item: &Position) -> Result<Vec<TrackScore>, ScoreError> {
        let (Some(ref_bases), Some(alt_bases)) = (&item.ref_allele, &item.alt_allele) else {
            return Err(ScoreError::MissingAlleles);
        };
        let request = ScoreRequest {
            chromosome: convert_chrom_name(&item.chrom, NamingConvention::Ucsc),
            position: item.pos,
            reference_bases: ref_bases,
            alternate_bases: alt_bases,
            interval_width: self.interval_width,
            name: item.variant_id(),
        };

        let mut attempt = 0;
        loop {
            match self.score_once(&request).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = retry_backoff(self.retry_base_delay, attempt);
                    tracing::debug!(
                        "{}: {} (retry {}/{} in {:?})",
                        request.name,
                        e,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScoreError::Transport("reset".into()).is_transient());
        assert!(ScoreError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(ScoreError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ScoreError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ScoreError::MissingAlleles.is_transient());
    }

    #[test]
    fn test_retry_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_backoff(base, 1), Duration::from_millis(100));
        assert_eq!(retry_backoff(base, 3), Duration::from_millis(400));
        assert_eq!(retry_backoff(base, 50), Duration::from_millis(6400));
    }

    #[test]
    fn test_request_and_response_shapes() {
        let request = ScoreRequest {
            chromosome: "chr7".into(),
            position: 100,
            reference_bases: "A",
            alternate_bases: "G",
            interval_width: 1 << 20,
            name: "chr7:100:A>G".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["reference_bases"], "A");
        assert_eq!(json["interval_width"], 1_048_576);

        let response: ScoreResponse = serde_json::from_str(
            r#"{"scores": [{"track": "K562 JUND", "quantile_score": 0.9, "raw_score": 1.5, "target": "JUND"},
                           {"track": "HepG2 H3K27ac", "quantile_score": -0.2, "raw_score": 0.1}]}"#,
        )
        .unwrap();
        assert_eq!(response.scores.len(), 2);
        assert_eq!(response.scores[1].target, None);
    }

    #[tokio::test]
    async fn test_missing_alleles_rejected_without_request() {
        let scorer = HttpScorer::new(
            "http://127.0.0.1:9/score",
            "key",
            &ScoringConfig::default(),
        )
        .unwrap();
        let result = scorer.score(&Position::new("chr1", 5)).await;
        assert_eq!(result, Err(ScoreError::MissingAlleles));
    }
}
