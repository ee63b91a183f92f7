//! Pipeline configuration.
//!
//! Every component takes its own section of [`PipelineConfig`] at
//! construction. The file format is JSON; every field has a default, so a
//! config file only needs the values that differ:
//!
//! ```json
//! {
//!   "annotation": { "source_dir": "/data/gnomad/v4.1/vcf" },
//!   "executor": { "max_workers": 12 },
//!   "scoring": { "endpoint": "https://scoring.example.org/v1/score", "batch_size": 250 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::types::TierThresholds;
use crate::executor::ExecutorConfig;
use crate::lookup::LookupConfig;
use crate::scoring::ScoringConfig;
use crate::shard::AnnotationConfig;
use crate::stats::ConstraintConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{what} not found: {path}")]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("Missing {what}: {hint}")]
    MissingCredential { what: &'static str, hint: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, one section per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub annotation: AnnotationConfig,
    pub executor: ExecutorConfig,
    pub lookup: LookupConfig,
    pub scoring: ScoringConfig,
    pub constraint: ConstraintConfig,
    pub thresholds: TierThresholds,
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read or
    /// `ConfigError::Parse` if it is not valid configuration JSON.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when given, otherwise use defaults
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::load_from_file`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check values that would otherwise fail deep inside a run
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_workers == 0 {
            return Err(ConfigError::Invalid("executor.max_workers must be > 0".into()));
        }
        if self.executor.timeout_secs == 0 {
            return Err(ConfigError::Invalid("executor.timeout_secs must be > 0".into()));
        }
        if self.scoring.batch_size == 0 {
            return Err(ConfigError::Invalid("scoring.batch_size must be > 0".into()));
        }
        if self.scoring.max_in_flight == 0 {
            return Err(ConfigError::Invalid("scoring.max_in_flight must be > 0".into()));
        }
        if self.lookup.positions_per_fetch == 0 {
            return Err(ConfigError::Invalid(
                "lookup.positions_per_fetch must be > 0".into(),
            ));
        }
        if self.thresholds.medium > self.thresholds.high {
            return Err(ConfigError::Invalid(format!(
                "thresholds.medium ({}) exceeds thresholds.high ({})",
                self.thresholds.medium, self.thresholds.high
            )));
        }
        if !self.annotation.args.iter().any(|a| a.contains("{source}")) {
            return Err(ConfigError::Invalid(
                "annotation.args must reference {source}".into(),
            ));
        }
        Ok(())
    }
}

/// Fail fast when a required input file is missing
///
/// # Errors
///
/// Returns `ConfigError::MissingInput` if `path` does not exist.
pub fn require_input(what: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConfigError::MissingInput {
            what,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.batch_size, 500);
        assert_eq!(config.executor.timeout_secs, 6 * 60 * 60);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"scoring": {{"batch_size": 3}}, "thresholds": {{"high": 10}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = PipelineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.scoring.batch_size, 3);
        assert_eq!(config.thresholds.high, 10);
        assert_eq!(config.thresholds.medium, 50_000);
        assert_eq!(config.scoring.max_in_flight, 4);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = PipelineConfig::default();
        config.thresholds = TierThresholds {
            high: 10,
            medium: 20,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_require_input() {
        let file = NamedTempFile::new().unwrap();
        assert!(require_input("Positions file", file.path()).is_ok());
        let err = require_input("Positions file", Path::new("/nonexistent/positions.tsv"))
            .unwrap_err();
        assert!(err.to_string().contains("Positions file not found"));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, "{{ not json").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            PipelineConfig::load_from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
