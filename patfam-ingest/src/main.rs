//! patfam - patent-family ingestion CLI
//!
//! `patfam ingest` runs one full ingestion pass and prints the run summary as
//! JSON on stdout. `patfam coverage` checks an existing family export against
//! a canonical reference list.
//!
//! Exit status is non-zero for configuration errors and cancelled runs.
//! Degraded providers only show up in the summary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use patfam_common::config::resolve_config_path;
use patfam_ingest::config::{IngestConfig, RunOverrides};
use patfam_ingest::store::load_families;
use patfam_ingest::validators::{load_canonical, CoverageReporter};
use patfam_ingest::IngestPipeline;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "patfam")]
#[command(about = "Patent-family ingestion and coverage for mRNA display")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, resolve, merge, tag and export patent families
    Ingest(IngestArgs),
    /// Report canonical coverage of an existing family export
    Coverage(CoverageArgs),
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Run configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_pages: Option<u32>,

    #[arg(long)]
    per_page: Option<u32>,

    /// Keep raw provider pages in the cache directory
    #[arg(long)]
    save_raw: bool,

    /// Fetch and process without writing any output
    #[arg(long)]
    dry_run: bool,

    /// Curated JSONL supplement
    #[arg(long)]
    manual: Option<PathBuf>,

    /// Family export path (JSON Lines)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory of local full-text documents; enables enrichment
    #[arg(long)]
    full_text_dir: Option<PathBuf>,

    /// Canonical reference list for the coverage pass
    #[arg(long)]
    canonical: Option<PathBuf>,

    #[arg(long)]
    coverage_output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CoverageArgs {
    /// Family export (JSON Lines)
    #[arg(long)]
    families: PathBuf,

    #[arg(long)]
    canonical: PathBuf,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Ingest(args) => ingest(args).await,
        Command::Coverage(args) => coverage(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("patfam_ingest={0},patfam_common={0},patfam={0}", default_level).into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn ingest(args: IngestArgs) -> Result<ExitCode> {
    let source = resolve_config_path(args.config.as_deref());
    let mut config = IngestConfig::load(&source).context("Failed to load run configuration")?;
    init_tracing(&config.logging.level);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    config.apply_overrides(RunOverrides {
        max_pages: args.max_pages,
        per_page: args.per_page,
        save_raw: args.save_raw,
        dry_run: args.dry_run,
        manual_path: args.manual,
        output_path: args.output,
        full_text_dir: args.full_text_dir,
        canonical_path: args.canonical,
        coverage_output: args.coverage_output,
    });

    let pipeline = IngestPipeline::from_config(config).context("Invalid run configuration")?;

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight requests");
            cancel.cancel();
        }
    });

    let output = pipeline.run().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&output.summary).context("Failed to serialize run summary")?
    );

    if output.summary.cancelled {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn coverage(args: CoverageArgs) -> Result<ExitCode> {
    init_tracing("info");

    let families = load_families(&args.families).context("Failed to load family export")?;
    let entries = load_canonical(&args.canonical).context("Failed to load canonical list")?;
    let report = CoverageReporter::new(&families).report(&entries);

    match &args.output {
        Some(path) => {
            report.write(path).context("Failed to write coverage report")?;
            info!(
                path = %path.display(),
                found = report.found_count,
                canonical = report.canonical_count,
                "Coverage report written"
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(ExitCode::SUCCESS)
}
