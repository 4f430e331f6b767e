#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the accessible parking ingestion tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use parking_map_ingest::{Pipeline, PipelineError, validate_file};
use parking_map_ingest_models::{RunSummary, ValidationReport};
use parking_map_parking_models::report::log_sink;
use parking_map_source::registry;

#[derive(Parser)]
#[command(
    name = "parking_map_ingest",
    about = "Accessible parking data collection tool"
)]
struct Cli {
    /// Log at debug level (overrides `RUST_LOG`)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every enabled source, merge, validate and write the output
    Collect {
        /// Source configuration file (defaults to `data/data_sources.toml`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Comma-separated list of source IDs to run (overrides `PARKING_MAP_SOURCES` env var)
        #[arg(long)]
        sources: Option<String>,
        /// Ignore cached payloads and fetch every source again
        #[arg(long)]
        force_refresh: bool,
        /// Write raw, filtered and transformed snapshots of each source here
        #[arg(long, value_name = "DIR")]
        debug_snapshots: Option<PathBuf>,
        /// Exit non-zero when the validation report contains errors
        #[arg(long)]
        strict: bool,
    },
    /// Validate an existing output file
    Validate {
        /// Output CSV to check
        file: PathBuf,
        /// Decimal places used to detect duplicate coordinates
        #[arg(long, default_value = "5")]
        precision: u32,
        /// Exit non-zero when the file contains errors
        #[arg(long)]
        strict: bool,
    },
    /// List configured data sources
    Sources {
        /// Source configuration file (defaults to `data/data_sources.toml`)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let filters = if verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Sources { config } => {
            let config = registry::resolve_config(config.as_deref())?;
            println!(
                "{:<20} {:<8} {:<18} {:<16} NAME",
                "ID", "ENABLED", "HANDLER", "FORMAT"
            );
            println!("{}", "-".repeat(80));
            for source in &config.sources {
                println!(
                    "{:<20} {:<8} {:<18} {:<16} {}",
                    source.id,
                    if source.enabled { "yes" } else { "no" },
                    source.handler,
                    source.config.format,
                    source.name
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate {
            file,
            precision,
            strict,
        } => {
            let report = validate_file(&file, precision, log_sink().as_ref())?;
            print_report(&report);
            Ok(exit_code(&report, strict))
        }
        Commands::Collect {
            config,
            sources,
            force_refresh,
            debug_snapshots,
            strict,
        } => {
            let start = Instant::now();
            let config = registry::resolve_config(config.as_deref())?;
            let selected = registry::select_sources(&config, sources);
            if selected.is_empty() {
                return Err("No sources selected".into());
            }

            let pipeline = Pipeline::new(config, selected, log_sink())?
                .with_force_refresh(force_refresh)
                .with_snapshot_dir(debug_snapshots);

            match pipeline.run().await {
                Ok(summary) => {
                    print_summary(&summary);
                    log::info!(
                        "Collection complete in {:.1}s",
                        start.elapsed().as_secs_f64()
                    );
                    Ok(exit_code(&summary.report, strict))
                }
                Err(PipelineError::NoData) => {
                    log::error!("No data collected; output left unchanged");
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn exit_code(report: &ValidationReport, strict: bool) -> ExitCode {
    if strict && report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{:<20} {:<12} {:>8} {:>8} {:>6}  CACHE",
        "SOURCE", "STATUS", "RECORDS", "SKIPPED", "TWD97?"
    );
    println!("{}", "-".repeat(72));
    for source in &summary.sources {
        println!(
            "{:<20} {:<12} {:>8} {:>8} {:>6}  {}",
            source.source_id,
            source.status,
            source.records,
            source.skipped,
            source.crs_fallbacks,
            source.cache.as_deref().unwrap_or("-")
        );
        if let Some(error) = &source.error {
            println!("    {error}");
        }
    }
    println!();
    println!(
        "Merged {} locations into {} ({} duplicates) -> {}",
        summary.merge.input,
        summary.merge.kept,
        summary.merge.duplicates,
        summary.output.display()
    );
    print_report(&summary.report);
}

fn print_report(report: &ValidationReport) {
    let s = report.summary;
    println!(
        "Validation: {} total, {} valid, {} invalid, {} duplicate, {} errors, {} warnings",
        s.total,
        s.valid,
        s.invalid,
        s.duplicate,
        report.errors.len(),
        report.warnings.len()
    );
}
