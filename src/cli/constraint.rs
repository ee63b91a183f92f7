use std::path::PathBuf;

use clap::Args;

use crate::cli::{OutputFormat, RunStatus};
use crate::core::config::{require_input, PipelineConfig};
use crate::core::types::ConfidenceTier;
use crate::parsing::annotations::load_site_annotations;
use crate::parsing::strata::parse_strata_file;
use crate::stats::{analyze, write_report, write_table};
use crate::utils::validation::sanitize_label;

#[derive(Args)]
pub struct ConstraintArgs {
    /// Possible positions per stratum: `chr pos stratum`
    #[arg(long)]
    pub possible: PathBuf,

    /// Observed positions per stratum: `chr pos stratum`
    #[arg(long)]
    pub observed: PathBuf,

    /// Merged annotation table used for tiering and confidence filtering
    #[arg(long)]
    pub annotations: Option<PathBuf>,

    /// Stratum supplying the baseline rate. Without it the stratum with the
    /// highest observed rate is used, so pass the least-selected key (e.g.
    /// `3` for Hamming strata) to pin the baseline to a fixed stratum.
    #[arg(long)]
    pub baseline: Option<String>,

    /// Lowest tier an observed position needs to be counted
    #[arg(long)]
    pub min_tier: Option<ConfidenceTier>,

    /// Directory for the TSV table and text report
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Prefix for output file names
    #[arg(long)]
    pub label: Option<String>,
}

/// Execute the constraint command
///
/// # Errors
///
/// Returns an error if an input is missing or malformed, the baseline
/// stratum is unknown, or the outputs cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: ConstraintArgs, mut config: PipelineConfig, format: OutputFormat) -> anyhow::Result<RunStatus> {
    if let Some(baseline) = &args.baseline {
        config.constraint.baseline = Some(baseline.clone());
    }
    if let Some(tier) = args.min_tier {
        config.constraint.min_tier = tier;
    }
    if let Some(label) = &args.label {
        config.constraint.label = sanitize_label(label);
    }
    config.validate()?;

    require_input("Possible positions", &args.possible)?;
    require_input("Observed positions", &args.observed)?;
    if let Some(path) = &args.annotations {
        require_input("Annotation table", path)?;
    }

    let possible = parse_strata_file(&args.possible)?;
    let observed = parse_strata_file(&args.observed)?;
    let annotations = args
        .annotations
        .as_deref()
        .map(load_site_annotations)
        .transpose()?;
    if let Some(sites) = &annotations {
        tracing::info!("Loaded annotations for {} sites", sites.len());
    }

    let report = analyze(&possible, &observed, annotations.as_ref(), &config.constraint)?;

    std::fs::create_dir_all(&args.output_dir)?;
    let table = report.table_path(&args.output_dir);
    write_table(&table, &report)?;
    let text = report.report_path(&args.output_dir);
    write_report(&text, &report)?;
    tracing::info!("Wrote {} and {}", table.display(), text.display());

    match format {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(RunStatus::Complete)
}
