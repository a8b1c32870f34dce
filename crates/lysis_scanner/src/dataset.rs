use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use breakdown::{ApproximateEventEstimate, DetectionError, STANDARD_CHANNELS, Sample, Trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::PathsConfig;
use crate::utils::{ensure_dir, write_csv};

pub const SEED_TABLE: &str = "lysis_times_adjusted.csv";

const TRACE_HEADER: [&str; 8] = ["timepoint", "time", "cell", "trench", "l", "c", "r", "st"];
const SEED_HEADER: [&str; 3] = ["cell", "lysis_t_start", "lysis_t"];
const TIME_TOLERANCE: f64 = 1e-9;

#[must_use]
pub fn raw_channel_path(raw_dir: &Path, cell_id: u32, channel: &str) -> PathBuf {
	raw_dir.join(format!("lys_{cell_id:02}_{channel}.csv"))
}

#[must_use]
pub fn checkpoint_path(trace_dir: &Path, cell_id: u32) -> PathBuf {
	trace_dir.join(format!("lysis_{cell_id:02}.csv"))
}

/// One row of an intensity profile export. Other columns are ignored.
#[derive(Debug, Deserialize)]
struct ProfileRow {
	#[serde(rename = "Slice")]
	slice: i64,
	#[serde(rename = "Mean")]
	mean: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TraceRow {
	timepoint: i64,
	time: f64,
	cell: u32,
	trench: u32,
	l: f64,
	c: f64,
	r: f64,
	st: f64,
}

#[derive(Debug, Deserialize)]
struct EstimateRow {
	cell: u32,
	lysis_t_start: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeedRow {
	pub cell: u32,
	pub lysis_t_start: i64,
	pub lysis_t: f64,
}

fn read_profile(path: &Path) -> Result<(Vec<i64>, Vec<f64>)> {
	let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open {}", path.display()))?;

	let mut slices = Vec::new();
	let mut means = Vec::new();
	for row in reader.deserialize() {
		let row: ProfileRow = row.with_context(|| format!("Failed to parse {}", path.display()))?;
		slices.push(row.slice);
		means.push(row.mean);
	}

	Ok((slices, means))
}

/// Merges the four per-channel exports of a cell into one time-adjusted trace and applies its trim.
///
/// Timepoints are `Slice - 1`; every channel must cover the same slices.
pub fn merge_raw(raw_dir: &Path, entry: &CatalogEntry) -> Result<Trace> {
	let cell_id = entry.cell_id();
	let mut slices: Option<Vec<i64>> = None;
	let mut channels = BTreeMap::new();

	for channel in STANDARD_CHANNELS {
		let (channel_slices, means) = read_profile(&raw_channel_path(raw_dir, cell_id, channel))?;

		match &slices {
			None => slices = Some(channel_slices),
			Some(expected) if expected.len() != channel_slices.len() => {
				return Err(DetectionError::MalformedTrace(format!(
					"cell {cell_id}: channel '{channel}' has {} frames, expected {}",
					channel_slices.len(),
					expected.len()
				))
				.into());
			},
			Some(expected) if *expected != channel_slices => {
				return Err(DetectionError::MalformedTrace(format!(
					"cell {cell_id}: channel '{channel}' covers different slices"
				))
				.into());
			},
			Some(_) => {},
		}
		channels.insert(channel.to_string(), means);
	}

	let timepoints: Vec<i64> = slices.unwrap_or_default().into_iter().map(|slice| slice - 1).collect();
	let times =
		timepoints.iter().map(|&tp| entry.metadata.adjusted_time(tp, entry.frame_spacing)).collect();

	let trace = Trace::from_columns(cell_id, entry.metadata.trench_id, timepoints, times, channels)?;
	apply_trim(trace, entry.trim)
}

pub fn apply_trim(trace: Trace, trim: Option<(f64, f64)>) -> Result<Trace> {
	let Some((start, end)) = trim else {
		return Ok(trace);
	};

	let trimmed = trace.trimmed(start, end)?;
	if trimmed.is_empty() {
		warn!(cell = trace.cell_id(), start, end, "Trim window removed every sample");
	}
	Ok(trimmed)
}

impl TraceRow {
	fn from_sample(trace: &Trace, sample: &Sample) -> Result<Self> {
		let channel = |name: &str| {
			sample.channels.get(name).copied().ok_or_else(|| {
				DetectionError::MalformedTrace(format!("cell {}: missing channel '{name}'", trace.cell_id()))
			})
		};

		Ok(Self {
			timepoint: sample.timepoint,
			time: sample.time,
			cell: trace.cell_id(),
			trench: trace.trench_id(),
			l: channel("l")?,
			c: channel("c")?,
			r: channel("r")?,
			st: channel("st")?,
		})
	}

	fn into_sample(self) -> Sample {
		let channels = STANDARD_CHANNELS.iter().map(|name| (*name).to_string()).zip([self.l, self.c, self.r, self.st]);
		Sample { timepoint: self.timepoint, time: self.time, channels: channels.collect() }
	}
}

pub fn write_checkpoint(path: &Path, trace: &Trace) -> Result<()> {
	let rows = trace.samples().map(|sample| TraceRow::from_sample(trace, &sample)).collect::<Result<Vec<_>>>()?;

	write_csv(path, &TRACE_HEADER, &rows)
}

pub fn read_checkpoint(path: &Path, entry: &CatalogEntry) -> Result<Trace> {
	let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open {}", path.display()))?;

	let mut samples = Vec::new();
	for row in reader.deserialize() {
		let row: TraceRow = row.with_context(|| format!("Failed to parse {}", path.display()))?;
		if row.cell != entry.cell_id() {
			return Err(DetectionError::MalformedTrace(format!(
				"{} holds cell {}, expected cell {}",
				path.display(),
				row.cell,
				entry.cell_id()
			))
			.into());
		}
		samples.push(row.into_sample());
	}

	Ok(Trace::from_samples(entry.cell_id(), entry.metadata.trench_id, samples)?)
}

/// Checkpoint when `prepare` has written one that still matches the cell's configuration,
/// raw exports otherwise.
pub fn load_trace(paths: &PathsConfig, entry: &CatalogEntry) -> Result<Trace> {
	let checkpoint = checkpoint_path(&paths.trace_dir, entry.cell_id());
	if !checkpoint.is_file() {
		debug!(cell = entry.cell_id(), "No checkpoint, merging raw exports");
		return merge_raw(&paths.raw_dir, entry);
	}

	let trace = read_checkpoint(&checkpoint, entry)?;
	if matches_config(&trace, entry) {
		debug!(cell = entry.cell_id(), path = %checkpoint.display(), "Loaded checkpoint");
		Ok(trace)
	} else {
		warn!(
			cell = entry.cell_id(),
			path = %checkpoint.display(),
			"Checkpoint does not match start_offset, frame spacing or trim; merging raw exports"
		);
		merge_raw(&paths.raw_dir, entry)
	}
}

/// Times follow the current start offset and frame spacing and lie inside the trim window.
fn matches_config(trace: &Trace, entry: &CatalogEntry) -> bool {
	let timed = trace.timepoints().iter().zip(trace.times()).all(|(&timepoint, &time)| {
		(entry.metadata.adjusted_time(timepoint, entry.frame_spacing) - time).abs() <= TIME_TOLERANCE
	});
	let trimmed = entry.trim.is_none_or(|(start, end)| trace.times().iter().all(|t| (start..end).contains(t)));

	timed && trimmed
}

pub fn read_estimates(path: &Path) -> Result<BTreeMap<u32, ApproximateEventEstimate>> {
	let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open {}", path.display()))?;

	let mut estimates = BTreeMap::new();
	for row in reader.deserialize() {
		let row: EstimateRow = row.with_context(|| format!("Failed to parse {}", path.display()))?;
		let estimate = ApproximateEventEstimate { cell_id: row.cell, lysis_timepoint: row.lysis_t_start };
		if estimates.insert(row.cell, estimate).is_some() {
			anyhow::bail!("Cell {} appears twice in {}", row.cell, path.display());
		}
	}

	Ok(estimates)
}

/// Seed times in seconds for every catalogued cell that has an estimate.
#[must_use]
pub fn corrected_seeds(catalog: &Catalog, estimates: &BTreeMap<u32, ApproximateEventEstimate>) -> Vec<SeedRow> {
	catalog
		.entries()
		.filter_map(|entry| {
			estimates.get(&entry.cell_id()).map(|estimate| SeedRow {
				cell: entry.cell_id(),
				lysis_t_start: estimate.lysis_timepoint,
				lysis_t: estimate.seed_time(entry.frame_spacing),
			})
		})
		.collect()
}

pub fn write_seed_table(path: &Path, rows: &[SeedRow]) -> Result<()> {
	write_csv(path, &SEED_HEADER, rows)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrepareSummary {
	pub written: usize,
	pub failed: Vec<u32>,
	pub seeds: usize,
}

/// Writes a checkpoint per catalogued cell and the corrected seed table.
pub fn prepare(paths: &PathsConfig, catalog: &Catalog) -> Result<PrepareSummary> {
	ensure_dir(&paths.trace_dir)?;

	let outcomes: Vec<(u32, Result<usize>)> = catalog
		.entries()
		.collect::<Vec<_>>()
		.par_iter()
		.map(|entry| {
			let outcome = merge_raw(&paths.raw_dir, entry).and_then(|trace| {
				write_checkpoint(&checkpoint_path(&paths.trace_dir, entry.cell_id()), &trace)?;
				Ok(trace.len())
			});
			(entry.cell_id(), outcome)
		})
		.collect();

	let mut summary = PrepareSummary::default();
	for (cell, outcome) in outcomes {
		match outcome {
			Ok(samples) => {
				info!(cell, samples, "Wrote time adjusted trace");
				summary.written += 1;
			},
			Err(e) => {
				warn!(cell, reason = %format!("{e:#}"), "Failed to prepare trace");
				summary.failed.push(cell);
			},
		}
	}

	let estimates = read_estimates(&paths.approximate_times)?;
	let seeds = corrected_seeds(catalog, &estimates);
	for entry in catalog.entries().filter(|e| !estimates.contains_key(&e.cell_id())) {
		warn!(cell = entry.cell_id(), "No approximate lysis time");
	}
	write_seed_table(&paths.trace_dir.join(SEED_TABLE), &seeds)?;
	summary.seeds = seeds.len();

	Ok(summary)
}
