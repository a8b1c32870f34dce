use anyhow::{Context, Result};
use breakdown::signal::{first_difference, locate_peak, moving_average};
use breakdown::{
	FastLysisResult, LysisConfig, LysisDetector, LysisOnset, PerforationConfig, PerforationDetector, PerforationResult,
	Trace,
};
use tracing::{info, warn};

use crate::catalog::CatalogEntry;

/// Window of the comparison moving average.
pub const MOVING_AVERAGE_WINDOW: usize = 5;

/// Time of the largest derivative under each filter, `None` when the maximum is not unique.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterComparison {
	pub raw: Option<f64>,
	pub moving_average: Option<f64>,
	pub savitzky_golay: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct InspectReport {
	pub cell: u32,
	pub seed_time: f64,
	pub filters: FilterComparison,
	pub onset: LysisOnset,
	/// `None` when the derivative never falls back below the fall threshold.
	pub lysis: Option<FastLysisResult>,
	pub perforation: Option<PerforationResult>,
}

/// Runs both detectors on one cell with the settings used while tuning the method.
pub fn inspect(
	trace: &Trace,
	entry: &CatalogEntry,
	seed_time: f64,
	lysis_config: &LysisConfig,
	perforation_config: &PerforationConfig,
) -> Result<InspectReport> {
	let lysis_config = LysisConfig {
		persistence_window: LysisConfig::exploratory().persistence_window,
		rise_offset: LysisConfig::exploratory().rise_offset,
		..lysis_config.clone()
	};
	let detector = LysisDetector::new(lysis_config)?;

	let window = detector.derivative_window(trace, seed_time)?;
	let raw = &trace.channel(&detector.config().channel)?[window.offset..window.offset + window.times.len()];
	let peak_time = |derivative: &[f64]| locate_peak(derivative).ok().map(|i| window.times[i]);

	let filters = FilterComparison {
		raw: peak_time(&first_difference(raw)),
		moving_average: peak_time(&first_difference(&moving_average(raw, MOVING_AVERAGE_WINDOW))),
		savitzky_golay: peak_time(&window.derivative),
	};
	info!(
		cell = entry.cell_id(),
		raw = ?filters.raw,
		moving_average = ?filters.moving_average,
		savitzky_golay = ?filters.savitzky_golay,
		"Derivative peak by filter"
	);

	let stages = detector
		.detect_stages(trace, seed_time)
		.with_context(|| format!("Lysis onset not detected for cell {}", entry.cell_id()))?;
	let onset = stages.onset;
	info!(
		cell = entry.cell_id(),
		baseline_mean = onset.baseline.mean,
		baseline_std = onset.baseline.std_dev,
		rise_threshold = onset.rise_threshold,
		rise_time = onset.rise_time,
		peak_time = onset.peak_time,
		"Lysis onset"
	);
	let lysis = match stages.fast_lysis {
		Ok(result) => {
			info!(cell = entry.cell_id(), fall_time = result.fall_time, "Fast lysis");
			Some(result)
		},
		Err(e) => {
			warn!(cell = entry.cell_id(), kind = e.kind().as_str(), reason = %e, "Fall of lysis rate not detected");
			None
		},
	};

	let perforation = match PerforationDetector::new(perforation_config.clone())?.detect(
		trace,
		&onset,
		entry.anchor_adjust,
	) {
		Ok(result) => {
			info!(
				cell = entry.cell_id(),
				anchor_index = result.anchor_index,
				baseline_mean = result.baseline.mean,
				baseline_std = result.baseline.std_dev,
				threshold = result.threshold,
				start_time = result.start_time,
				duration = result.duration,
				"Perforation"
			);
			Some(result)
		},
		Err(e) => {
			warn!(cell = entry.cell_id(), kind = e.kind().as_str(), reason = %e, "Perforation not detected");
			None
		},
	};

	Ok(InspectReport { cell: entry.cell_id(), seed_time, filters, onset, lysis, perforation })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::batch::tests::{LYSIS_CENTER, PERFORATION_START, plateau_trace, synthetic_trace, test_config};
	use crate::catalog::Catalog;

	fn entry(cell: u32) -> CatalogEntry {
		*Catalog::from_config(&test_config()).unwrap().get(cell).unwrap()
	}

	#[test]
	fn reports_filter_peaks_and_both_events() {
		let trace = synthetic_trace(1, 5);
		let seed_time = LYSIS_CENTER as f64 * 0.01;

		let report =
			inspect(&trace, &entry(1), seed_time, &LysisConfig::default(), &PerforationConfig::default()).unwrap();

		let sg = report.filters.savitzky_golay.unwrap();
		assert!((sg - seed_time).abs() <= 0.03, "smoothed peak at {sg}");
		assert!(report.onset.rise_time <= report.onset.peak_time);
		assert_eq!(report.lysis.unwrap().onset, report.onset);

		let perforation = report.perforation.unwrap();
		assert!(perforation.start_index >= PERFORATION_START);
		assert!(perforation.duration >= 0.0);
	}

	#[test]
	fn uses_exploratory_persistence() {
		let trace = synthetic_trace(1, 5);
		let report = inspect(
			&trace,
			&entry(1),
			LYSIS_CENTER as f64 * 0.01,
			&LysisConfig { persistence_window: 9, ..LysisConfig::default() },
			&PerforationConfig::default(),
		)
		.unwrap();

		let exploratory =
			LysisDetector::new(LysisConfig::exploratory()).unwrap().detect(&trace, LYSIS_CENTER as f64 * 0.01).unwrap();
		assert_eq!(report.lysis, Some(exploratory));
	}

	#[test]
	fn missing_perforation_does_not_fail_inspection() {
		let trace = synthetic_trace(1, 5);
		let perforation = PerforationConfig { anchor_offset: 5_000, ..PerforationConfig::default() };

		let report =
			inspect(&trace, &entry(1), LYSIS_CENTER as f64 * 0.01, &LysisConfig::default(), &perforation).unwrap();
		assert!(report.perforation.is_none());
	}

	#[test]
	fn missing_fall_still_reports_onset_and_perforation() {
		let trace = plateau_trace(1, 3);
		let report =
			inspect(&trace, &entry(1), LYSIS_CENTER as f64 * 0.01, &LysisConfig::default(), &PerforationConfig::default())
				.unwrap();

		assert!(report.lysis.is_none());
		assert!(report.onset.rise_index <= report.onset.peak_index);
		assert!(report.perforation.unwrap().duration >= 0.0);
	}

	#[test]
	fn seed_outside_trace_fails() {
		let trace = synthetic_trace(1, 5);
		assert!(inspect(&trace, &entry(1), 500.0, &LysisConfig::default(), &PerforationConfig::default()).is_err());
	}
}
