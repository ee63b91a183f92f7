use std::path::PathBuf;

use clap::Args;

use crate::cli::{OutputFormat, RunStatus};
use crate::core::config::{require_input, ConfigError, PipelineConfig};
use crate::lookup::{choose_strategy, open_lookup, LookupStrategy};
use crate::parsing::positions::parse_positions_file;
use crate::shard::{annotate_with_lookup, annotate_with_query, write_annotations, AnnotationRun};

#[derive(Args)]
pub struct AnnotateArgs {
    /// Position list: `chr pos [ref alt]`, tab-separated, optional header
    #[arg(short, long)]
    pub positions: PathBuf,

    /// Merged annotation table to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Directory of per-chromosome reference files (query mode)
    #[arg(long, conflicts_with = "reference")]
    pub source_dir: Option<PathBuf>,

    /// Site-level reference table, `chr:pos<TAB>value` or `chr<TAB>pos<TAB>value` (lookup mode)
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Force a lookup strategy (memory, stream or indexed)
    #[arg(long)]
    pub strategy: Option<LookupStrategy>,

    /// Memory available for an in-memory index, in GB
    #[arg(long)]
    pub memory_budget_gb: Option<f64>,

    /// Maximum concurrent external queries
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Per-query timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

enum Mode {
    Query(PathBuf),
    Lookup(PathBuf),
}

fn apply_overrides(args: &AnnotateArgs, config: &mut PipelineConfig) -> Result<Mode, ConfigError> {
    if let Some(workers) = args.workers {
        config.executor.max_workers = workers;
    }
    if let Some(secs) = args.timeout_secs {
        config.executor.timeout_secs = secs;
    }
    if let Some(strategy) = args.strategy {
        config.lookup.strategy = Some(strategy);
    }
    if let Some(gb) = args.memory_budget_gb {
        config.lookup.memory_budget_gb = Some(gb);
    }
    if let Some(dir) = &args.source_dir {
        config.annotation.source_dir = Some(dir.clone());
    }
    if let Some(reference) = &args.reference {
        config.lookup.reference = Some(reference.clone());
    }
    config.validate()?;

    // An explicit flag picks the mode; otherwise the config decides, lookup first
    let mode = match (&args.source_dir, &config.lookup.reference, &config.annotation.source_dir) {
        (Some(dir), _, _) => Mode::Query(dir.clone()),
        (None, Some(reference), _) => Mode::Lookup(reference.clone()),
        (None, None, Some(dir)) => Mode::Query(dir.clone()),
        (None, None, None) => {
            return Err(ConfigError::Invalid(
                "annotate needs --source-dir (query mode) or --reference (lookup mode)".into(),
            ))
        }
    };
    match &mode {
        Mode::Query(dir) => require_input("Source directory", dir)?,
        Mode::Lookup(reference) => require_input("Reference", reference)?,
    }
    Ok(mode)
}

/// Execute the annotate command
///
/// # Errors
///
/// Returns an error for bad configuration, unreadable input, a reference
/// that cannot be opened, or a failure writing the output table. Failing
/// shards are reported in the tally, not as errors.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: AnnotateArgs, mut config: PipelineConfig, format: OutputFormat) -> anyhow::Result<RunStatus> {
    let mode = apply_overrides(&args, &mut config)?;
    require_input("Positions file", &args.positions)?;

    let positions = parse_positions_file(&args.positions)?;
    tracing::info!(
        "Loaded {} positions from {}",
        positions.len(),
        args.positions.display()
    );

    let run = match &mode {
        Mode::Query(_) => annotate_with_query(
            &positions,
            &config.annotation,
            &config.executor,
            &config.thresholds,
        )?,
        Mode::Lookup(reference) => {
            let strategy = choose_strategy(reference, &config.lookup, positions.len())?;
            let lookup = open_lookup(reference, strategy, &config.lookup, &config.executor)?;
            annotate_with_lookup(
                &positions,
                lookup.as_ref(),
                &config.annotation,
                config.executor.max_workers,
                &config.thresholds,
            )?
        }
    };

    write_annotations(&args.output, &run.rows)?;

    match format {
        OutputFormat::Text => print_text_tally(&run, &args),
        OutputFormat::Json => print_json_tally(&run, &args)?,
    }

    Ok(if run.tally.is_complete() {
        RunStatus::Complete
    } else {
        RunStatus::Partial
    })
}

fn print_text_tally(run: &AnnotationRun, args: &AnnotateArgs) {
    let tally = &run.tally;
    println!(
        "Annotated {} positions -> {}",
        tally.total(),
        args.output.display()
    );
    println!("  observed:     {}", tally.observed);
    println!("  absent:       {}", tally.absent);
    println!("  shard_failed: {}", tally.shard_failed);
    println!("  skipped:      {}", tally.skipped);
    println!(
        "Shards: {} succeeded, {} failed",
        tally.shards_succeeded,
        tally.failed_shards.len()
    );
    for (chrom, reason) in &tally.failed_shards {
        println!("  {chrom}: {reason}");
    }
}

fn print_json_tally(run: &AnnotationRun, args: &AnnotateArgs) -> anyhow::Result<()> {
    let tally = &run.tally;
    let failed: Vec<serde_json::Value> = tally
        .failed_shards
        .iter()
        .map(|(chrom, reason)| serde_json::json!({ "chrom": chrom, "reason": reason }))
        .collect();
    let output = serde_json::json!({
        "output": args.output,
        "positions": tally.total(),
        "observed": tally.observed,
        "absent": tally.absent,
        "shard_failed": tally.shard_failed,
        "skipped": tally.skipped,
        "shards_succeeded": tally.shards_succeeded,
        "failed_shards": failed,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
