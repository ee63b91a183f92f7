use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use locus_annotator::cli::{self, Cli, Commands, RunStatus};
use locus_annotator::core::config::PipelineConfig;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("locus_annotator=debug,info")
    } else {
        EnvFilter::new("locus_annotator=info,warn")
    };

    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<RunStatus> {
    let config = PipelineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Annotate(args) => cli::annotate::run(args, config, cli.format),
        Commands::Score(args) => cli::score::run(args, config, cli.format),
        Commands::Constraint(args) => cli::constraint::run(args, config, cli.format),
    }
}
