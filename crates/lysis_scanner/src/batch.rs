use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use breakdown::{
	ApproximateEventEstimate, DetectionError, FastLysisResult, LysisDetector, LysisOnset, PerforationDetector,
	PerforationResult, Trace,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Load,
	Seed,
	FastLysis,
	Perforation,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Load => "load",
			Self::Seed => "seed",
			Self::FastLysis => "fast_lysis",
			Self::Perforation => "perforation",
		};
		f.write_str(name)
	}
}

/// A cell dropped from one pipeline, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCell {
	pub cell: u32,
	pub stage: Stage,
	pub kind: &'static str,
	pub reason: String,
}

impl SkippedCell {
	fn detection(cell: u32, stage: Stage, error: &DetectionError) -> Self {
		Self { cell, stage, kind: error.kind().as_str(), reason: error.to_string() }
	}

	fn input(cell: u32, stage: Stage, error: &anyhow::Error) -> Self {
		let kind = error.downcast_ref::<DetectionError>().map_or("input", |e| e.kind().as_str());
		Self { cell, stage, kind, reason: format!("{error:#}") }
	}
}

#[derive(Debug, Default)]
struct CellOutcome {
	lysis: Option<FastLysisResult>,
	perforation: Option<PerforationResult>,
	skipped: Vec<SkippedCell>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
	pub analysed: usize,
	pub lysis: Vec<FastLysisResult>,
	pub perforation: Vec<PerforationResult>,
	pub skipped: Vec<SkippedCell>,
}

impl BatchReport {
	#[must_use]
	pub fn skipped_by_kind(&self) -> BTreeMap<&'static str, usize> {
		self.skipped.iter().fold(BTreeMap::new(), |mut counts, skip| {
			*counts.entry(skip.kind).or_default() += 1;
			counts
		})
	}
}

/// Runs the per-class pipelines over every analysed cell in parallel.
///
/// Detectors and inputs are shared read-only; each cell produces its own outcome and
/// the report is assembled after all cells finish.
pub struct BatchRunner<'a> {
	catalog: &'a Catalog,
	seeds: &'a BTreeMap<u32, ApproximateEventEstimate>,
	lysis: &'a LysisDetector,
	perforation: &'a PerforationDetector,
}

impl<'a> BatchRunner<'a> {
	#[must_use]
	pub const fn new(
		catalog: &'a Catalog,
		seeds: &'a BTreeMap<u32, ApproximateEventEstimate>,
		lysis: &'a LysisDetector,
		perforation: &'a PerforationDetector,
	) -> Self {
		Self { catalog, seeds, lysis, perforation }
	}

	pub fn run<F>(&self, load: F) -> BatchReport
	where
		F: Fn(&CatalogEntry) -> Result<Trace> + Sync,
	{
		let cells = self.catalog.analysed();
		info!(cells = cells.len(), "Analysing cells");

		let outcomes: Vec<(u32, CellOutcome)> =
			cells.par_iter().map(|entry| (entry.cell_id(), self.analyse(entry, &load))).collect();

		let mut report = BatchReport { analysed: outcomes.len(), ..BatchReport::default() };
		for (cell, outcome) in outcomes {
			for skip in &outcome.skipped {
				warn!(cell, stage = %skip.stage, kind = skip.kind, reason = %skip.reason, "Skipped cell");
			}
			report.lysis.extend(outcome.lysis);
			report.perforation.extend(outcome.perforation);
			report.skipped.extend(outcome.skipped);
		}

		report.lysis.sort_by_key(|r| r.cell_id);
		report.perforation.sort_by_key(|r| r.cell_id);
		report.skipped.sort_by_key(|s| (s.cell, s.stage));

		info!(
			fast_lysis = report.lysis.len(),
			perforation = report.perforation.len(),
			skipped = report.skipped.len(),
			"Batch finished"
		);

		report
	}

	fn analyse<F>(&self, entry: &CatalogEntry, load: &F) -> CellOutcome
	where
		F: Fn(&CatalogEntry) -> Result<Trace>,
	{
		let cell = entry.cell_id();
		let mut outcome = CellOutcome::default();

		let trace = match load(entry) {
			Ok(trace) => trace,
			Err(e) => {
				outcome.skipped.push(SkippedCell::input(cell, Stage::Load, &e));
				return outcome;
			},
		};

		let Some(estimate) = self.seeds.get(&cell) else {
			outcome.skipped.push(SkippedCell {
				cell,
				stage: Stage::Seed,
				kind: "input",
				reason: "no approximate lysis time".to_string(),
			});
			return outcome;
		};
		let seed_time = estimate.seed_time(entry.frame_spacing);
		debug!(cell, seed_time, samples = trace.len(), "Loaded trace");

		let onset: Option<LysisOnset> = if entry.analysis.wants_lysis() {
			match self.lysis.detect_stages(&trace, seed_time) {
				Ok(stages) => {
					match stages.fast_lysis {
						Ok(result) => outcome.lysis = Some(result),
						Err(e) => outcome.skipped.push(SkippedCell::detection(cell, Stage::FastLysis, &e)),
					}
					Some(stages.onset)
				},
				Err(e) => {
					outcome.skipped.push(SkippedCell::detection(cell, Stage::FastLysis, &e));
					None
				},
			}
		} else if entry.analysis.wants_perforation() {
			// lysis is not reported for these cells but its onset still closes the perforation interval
			match self.lysis.locate_onset(&trace, seed_time) {
				Ok(onset) => Some(onset),
				Err(e) => {
					outcome.skipped.push(SkippedCell::detection(cell, Stage::Perforation, &e));
					None
				},
			}
		} else {
			None
		};

		if entry.analysis.wants_perforation()
			&& let Some(onset) = onset
		{
			match self.perforation.detect(&trace, &onset, entry.anchor_adjust) {
				Ok(result) => outcome.perforation = Some(result),
				Err(e) => outcome.skipped.push(SkippedCell::detection(cell, Stage::Perforation, &e)),
			}
		} else if entry.analysis.wants_perforation() && entry.analysis.wants_lysis() {
			outcome.skipped.push(SkippedCell {
				cell,
				stage: Stage::Perforation,
				kind: "undetected",
				reason: "lysis onset unavailable".to_string(),
			});
		}

		outcome
	}
}
