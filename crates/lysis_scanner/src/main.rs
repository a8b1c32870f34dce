use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use breakdown::{LysisDetector, PerforationDetector};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::{batch::BatchRunner, catalog::Catalog, config::Config, output::RunSummary};

mod batch;
mod catalog;
mod config;
mod dataset;
mod inspect;
mod output;
mod utils;

/// Locates perforation and lysis onsets in single-cell envelope breakdown traces.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
	/// Path to the TOML configuration
	#[arg(long, short, default_value = "config.toml")]
	config: PathBuf,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Merge per-channel exports into time-adjusted traces and correct the seed times
	Prepare,
	/// Detect fast lysis and perforation for every analysed cell
	Analyze,
	/// Show the detection steps for one cell
	Inspect {
		/// Cell id from the configuration
		cell: u32,
	},
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	let cli = Cli::parse();

	let config = Config::load(&cli.config).context("Failed to load configuration")?;
	info!("✅ Configuration loaded");

	let catalog = Catalog::from_config(&config)?;
	if catalog.is_empty() {
		anyhow::bail!("No [[cells]] configured in {}", cli.config.display());
	}
	info!(cells = catalog.len(), classes = ?catalog.count_by_class(), "✅ Catalog built");

	match cli.command {
		Command::Prepare => prepare(&config, &catalog),
		Command::Analyze => analyze(&cli.config, &config, &catalog),
		Command::Inspect { cell } => inspect(&config, &catalog, cell),
	}
}

fn prepare(config: &Config, catalog: &Catalog) -> Result<()> {
	let summary = dataset::prepare(&config.paths, catalog)?;

	info!(
		written = summary.written,
		failed = summary.failed.len(),
		seeds = summary.seeds,
		trace_dir = %config.paths.trace_dir.display(),
		"✅ Traces prepared"
	);
	if !summary.failed.is_empty() {
		warn!(cells = ?summary.failed, "Some traces could not be prepared");
	}

	Ok(())
}

fn analyze(config_path: &Path, config: &Config, catalog: &Catalog) -> Result<()> {
	let seeds = dataset::read_estimates(&config.paths.approximate_times)
		.context("Failed to load approximate lysis times")?;
	info!(seeds = seeds.len(), "✅ Approximate lysis times loaded");

	let lysis = LysisDetector::new(config.lysis.clone())?;
	let perforation = PerforationDetector::new(config.perforation.clone())?;

	let report =
		BatchRunner::new(catalog, &seeds, &lysis, &perforation).run(|entry| dataset::load_trace(&config.paths, entry));

	let summary = RunSummary::new(config_path, catalog.len(), &report);
	output::write_report(&config.paths.output_dir, &report, &summary)?;

	info!(
		fast_lysis = summary.fast_lysis_detected,
		perforation = summary.perforation_detected,
		skipped = summary.skipped,
		output_dir = %config.paths.output_dir.display(),
		"✅ Analysis written"
	);

	Ok(())
}

fn inspect(config: &Config, catalog: &Catalog, cell: u32) -> Result<()> {
	let entry = catalog.get(cell).with_context(|| format!("Cell {cell} is not in the configuration"))?;
	let seeds = dataset::read_estimates(&config.paths.approximate_times)
		.context("Failed to load approximate lysis times")?;
	let estimate = seeds.get(&cell).with_context(|| format!("No approximate lysis time for cell {cell}"))?;

	let trace = dataset::load_trace(&config.paths, entry)?;
	let report =
		inspect::inspect(&trace, entry, estimate.seed_time(entry.frame_spacing), &config.lysis, &config.perforation)?;

	info!(
		cell = report.cell,
		seed_time = report.seed_time,
		savitzky_golay_peak = ?report.filters.savitzky_golay,
		rise_time = report.onset.rise_time,
		fall_time = ?report.lysis.map(|l| l.fall_time),
		perforation_start = ?report.perforation.map(|p| p.start_time),
		"✅ Inspection finished"
	);

	Ok(())
}
