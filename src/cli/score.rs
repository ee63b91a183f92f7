//! Score command - drive the external scoring service over an item list.
//!
//! Rerunning the same command against the same output directory resumes
//! after the last committed batch. `--clean` discards previous run state.

use std::path::PathBuf;

use clap::Args;

use crate::cli::{OutputFormat, RunStatus};
use crate::core::config::{require_input, ConfigError, PipelineConfig};
use crate::parsing::positions::parse_positions_file;
use crate::scoring::artifacts::SUMMARY_FILE;
use crate::scoring::{batch, BatchScorer, HttpScorer, ScoreRunReport};

/// Arguments for the score command
#[derive(Args)]
pub struct ScoreArgs {
    /// Items to score: `chr pos ref alt`, tab-separated, optional header
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for checkpoint, batch partitions and final summaries
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Scoring service URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// API key; read from the environment variable named by
    /// `scoring.api_key_env` when omitted
    #[arg(long)]
    pub api_key: Option<String>,

    /// Items per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop after committing this many batches
    #[arg(long)]
    pub max_batches: Option<usize>,

    /// Concurrent requests within a batch
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Score only the first N items
    #[arg(long)]
    pub limit: Option<usize>,

    /// Track targets summarised separately (comma-separated, e.g. FOS,JUN)
    #[arg(long = "focus", value_delimiter = ',')]
    pub focus: Vec<String>,

    /// Rows kept in top_candidates.tsv
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Discard any previous run state in the output directory first
    #[arg(long)]
    pub clean: bool,
}

/// Resolve endpoint and API key, flags first
fn credentials(args: &ScoreArgs, config: &PipelineConfig) -> Result<(String, String), ConfigError> {
    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| config.scoring.endpoint.clone())
        .ok_or_else(|| ConfigError::MissingCredential {
            what: "scoring endpoint",
            hint: "pass --endpoint or set scoring.endpoint in the config".to_string(),
        })?;

    let env_name = &config.scoring.api_key_env;
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var(env_name).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingCredential {
            what: "API key",
            hint: format!("pass --api-key or set {env_name}"),
        })?;

    Ok((endpoint, api_key))
}

/// Execute the score command
///
/// # Errors
///
/// Returns an error for bad configuration, missing credentials or input,
/// a run directory holding a different run, or any persistence failure.
/// Items the service rejects are reported, not returned as errors.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: ScoreArgs, mut config: PipelineConfig, format: OutputFormat) -> anyhow::Result<RunStatus> {
    if let Some(size) = args.batch_size {
        config.scoring.batch_size = size;
    }
    if let Some(n) = args.max_in_flight {
        config.scoring.max_in_flight = n;
    }
    if let Some(n) = args.top_n {
        config.scoring.top_n = n;
    }
    if !args.focus.is_empty() {
        config.scoring.focus_targets.clone_from(&args.focus);
    }
    config.validate()?;
    require_input("Input file", &args.input)?;
    let (endpoint, api_key) = credentials(&args, &config)?;

    let mut items = parse_positions_file(&args.input)?;
    if let Some(limit) = args.limit {
        items.truncate(limit);
    }
    let without_alleles = items.iter().filter(|p| !p.has_alleles()).count();
    if without_alleles > 0 {
        tracing::warn!(
            "{} items have no ref/alt alleles and will be recorded as failed",
            without_alleles
        );
    }
    tracing::info!("Scoring {} items from {}", items.len(), args.input.display());

    if args.clean {
        batch::clean(&args.output_dir)?;
    }

    let scorer = HttpScorer::new(&endpoint, &api_key, &config.scoring)?;
    let report = BatchScorer::new(scorer, config.scoring.clone(), &args.output_dir)
        .run(&items, args.max_batches)?;

    match format {
        OutputFormat::Text => print_text_report(&report, &args),
        OutputFormat::Json => print_json_report(&report, &args)?,
    }

    Ok(if report.complete && report.failed_rows == 0 {
        RunStatus::Complete
    } else {
        RunStatus::Partial
    })
}

fn print_text_report(report: &ScoreRunReport, args: &ScoreArgs) {
    println!(
        "Batches: {} run this invocation, {} of {} committed",
        report.batches_run.len(),
        report.resumed_from + report.batches_run.len(),
        report.total_batches
    );
    println!("  scored: {}", report.scored);
    println!("  failed: {}", report.failed);
    if report.complete {
        println!(
            "Complete: {} items summarised, {} failed -> {}",
            report.summary_rows,
            report.failed_rows,
            args.output_dir.join(SUMMARY_FILE).display()
        );
    } else {
        println!(
            "{} batches remain; rerun to resume",
            report.remaining_batches()
        );
    }
}

fn print_json_report(report: &ScoreRunReport, args: &ScoreArgs) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "output_dir": args.output_dir,
        "total_batches": report.total_batches,
        "resumed_from": report.resumed_from,
        "batches_run": report.batches_run,
        "scored": report.scored,
        "failed": report.failed,
        "complete": report.complete,
        "summary_rows": report.summary_rows,
        "failed_rows": report.failed_rows,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
