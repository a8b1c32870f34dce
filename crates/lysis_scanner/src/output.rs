use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use breakdown::{FastLysisResult, PerforationResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::{BatchReport, SkippedCell};
use crate::utils::{ensure_dir, write_csv};

pub const LYSIS_TABLE: &str = "cell_envelope_breakdown_analysis.csv";
pub const PERFORATION_TABLE: &str = "perforation_analysis.csv";
pub const SKIPPED_TABLE: &str = "skipped_cells.csv";
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Serialize)]
struct LysisRow {
	cell: u32,
	rise_time: f64,
	peak_time: f64,
	fall_time: f64,
}

impl From<&FastLysisResult> for LysisRow {
	fn from(result: &FastLysisResult) -> Self {
		Self {
			cell: result.cell_id,
			rise_time: result.rise_time,
			peak_time: result.peak_time,
			fall_time: result.fall_time,
		}
	}
}

#[derive(Debug, Serialize)]
struct PerforationRow {
	cell: u32,
	start_time: f64,
	end_time: f64,
	perforation_duration: f64,
}

impl From<&PerforationResult> for PerforationRow {
	fn from(result: &PerforationResult) -> Self {
		Self {
			cell: result.cell_id,
			start_time: result.start_time,
			end_time: result.end_time,
			perforation_duration: result.duration,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
	pub generated_at: DateTime<Utc>,
	pub config: PathBuf,
	pub cells_configured: usize,
	pub cells_analysed: usize,
	pub fast_lysis_detected: usize,
	pub perforation_detected: usize,
	pub mean_perforation_duration: Option<f64>,
	pub skipped: usize,
	pub skipped_by_kind: BTreeMap<&'static str, usize>,
}

impl RunSummary {
	#[must_use]
	pub fn new(config: &Path, cells_configured: usize, report: &BatchReport) -> Self {
		let durations: Vec<f64> = report.perforation.iter().map(|r| r.duration).collect();
		let mean_perforation_duration =
			(!durations.is_empty()).then(|| durations.iter().sum::<f64>() / durations.len() as f64);

		Self {
			generated_at: Utc::now(),
			config: config.to_path_buf(),
			cells_configured,
			cells_analysed: report.analysed,
			fast_lysis_detected: report.lysis.len(),
			perforation_detected: report.perforation.len(),
			mean_perforation_duration,
			skipped: report.skipped.len(),
			skipped_by_kind: report.skipped_by_kind(),
		}
	}
}

/// Writes the result tables and run summary into `output_dir`.
pub fn write_report(output_dir: &Path, report: &BatchReport, summary: &RunSummary) -> Result<()> {
	ensure_dir(output_dir)?;

	let lysis: Vec<LysisRow> = report.lysis.iter().map(LysisRow::from).collect();
	write_csv(&output_dir.join(LYSIS_TABLE), &["cell", "rise_time", "peak_time", "fall_time"], &lysis)?;

	let perforation: Vec<PerforationRow> = report.perforation.iter().map(PerforationRow::from).collect();
	write_csv(
		&output_dir.join(PERFORATION_TABLE),
		&["cell", "start_time", "end_time", "perforation_duration"],
		&perforation,
	)?;

	write_csv::<SkippedCell>(
		&output_dir.join(SKIPPED_TABLE),
		&["cell", "stage", "kind", "reason"],
		&report.skipped,
	)?;

	let path = output_dir.join(SUMMARY_FILE);
	let json = serde_json::to_string_pretty(summary).context("Failed to serialise run summary")?;
	fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::batch::{BatchRunner, tests::{synthetic_trace, test_config}};
	use crate::catalog::Catalog;
	use breakdown::{ApproximateEventEstimate, LysisConfig, LysisDetector, PerforationConfig, PerforationDetector};

	fn report() -> BatchReport {
		let catalog = Catalog::from_config(&test_config()).unwrap();
		let seeds: BTreeMap<_, _> = [1, 2, 3]
			.into_iter()
			.map(|cell_id| (cell_id, ApproximateEventEstimate { cell_id, lysis_timepoint: 1700 }))
			.collect();
		let lysis = LysisDetector::new(LysisConfig::default()).unwrap();
		let perforation = PerforationDetector::new(PerforationConfig::default()).unwrap();

		BatchRunner::new(&catalog, &seeds, &lysis, &perforation).run(|entry| Ok(synthetic_trace(entry.cell_id(), 7)))
	}

	#[test]
	fn writes_tables_and_summary() {
		let tmp = tempfile::tempdir().unwrap();
		let out = tmp.path().join("dataframes");
		let report = report();
		let summary = RunSummary::new(Path::new("config.toml"), 5, &report);

		write_report(&out, &report, &summary).unwrap();

		let lysis = fs::read_to_string(out.join(LYSIS_TABLE)).unwrap();
		let mut lines = lysis.lines();
		assert_eq!(lines.next(), Some("cell,rise_time,peak_time,fall_time"));
		assert_eq!(lines.map(|l| l.split(',').next().unwrap().to_string()).collect::<Vec<_>>(), vec!["1", "2"]);

		let perforation = fs::read_to_string(out.join(PERFORATION_TABLE)).unwrap();
		assert!(perforation.starts_with("cell,start_time,end_time,perforation_duration\n1,"));
		assert_eq!(perforation.lines().count(), 3);

		let skipped = fs::read_to_string(out.join(SKIPPED_TABLE)).unwrap();
		assert_eq!(skipped, "cell,stage,kind,reason\n5,seed,input,no approximate lysis time\n");

		let summary_json = fs::read_to_string(out.join(SUMMARY_FILE)).unwrap();
		let json: serde_json::Value = serde_json::from_str(&summary_json).unwrap();
		assert_eq!(json["cells_configured"], 5);
		assert_eq!(json["cells_analysed"], 4);
		assert_eq!(json["fast_lysis_detected"], 2);
		assert_eq!(json["perforation_detected"], 2);
		assert_eq!(json["skipped_by_kind"]["input"], 1);
		assert!(json["generated_at"].is_string());
	}

	#[test]
	fn summary_without_perforation_has_no_mean() {
		let summary = RunSummary::new(Path::new("config.toml"), 0, &BatchReport::default());
		assert_eq!(summary.mean_perforation_duration, None);
		assert_eq!(summary.skipped, 0);
	}

	#[test]
	fn duration_column_is_end_minus_start() {
		let tmp = tempfile::tempdir().unwrap();
		let report = report();
		write_report(tmp.path(), &report, &RunSummary::new(Path::new("c.toml"), 5, &report)).unwrap();

		let table = fs::read_to_string(tmp.path().join(PERFORATION_TABLE)).unwrap();
		for line in table.lines().skip(1) {
			let fields: Vec<f64> = line.split(',').skip(1).map(|f| f.parse().unwrap()).collect();
			assert!((fields[1] - fields[0] - fields[2]).abs() < 1e-9, "{line}");
			assert!(fields[2] >= 0.0);
		}
	}
}
