use serde::Deserialize;
use tracing::debug;

use super::lysis::LysisOnset;
use crate::error::{DetectionError, signed};
use crate::signal::{BaselineStats, CrossingScanner};
use crate::trace::{CELL_CHANNEL, Trace};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerforationConfig {
	pub channel: String,
	/// Samples between the baseline anchor and the lysis derivative peak.
	pub anchor_offset: usize,
	pub baseline_length: usize,
	pub threshold_sigmas: f64,
	pub persistence_window: usize,
}

impl Default for PerforationConfig {
	fn default() -> Self {
		Self {
			channel: CELL_CHANNEL.to_string(),
			anchor_offset: 1000,
			baseline_length: 200,
			threshold_sigmas: 3.0,
			persistence_window: 5,
		}
	}
}

impl PerforationConfig {
	pub fn validate(&self) -> Result<(), DetectionError> {
		if self.baseline_length < 2 {
			return Err(DetectionError::InvalidParameter("perforation baseline_length must be at least 2"));
		}
		if self.persistence_window == 0 {
			return Err(DetectionError::InvalidParameter("perforation persistence_window must be positive"));
		}
		if self.threshold_sigmas < 0.0 {
			return Err(DetectionError::InvalidParameter("perforation threshold_sigmas must be non-negative"));
		}
		Ok(())
	}
}

/// Perforation onset (t4) up to lysis onset (t5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerforationResult {
	pub cell_id: u32,
	pub start_time: f64,
	pub end_time: f64,
	pub duration: f64,
	pub start_index: usize,
	pub anchor_index: usize,
	pub baseline: BaselineStats,
	pub threshold: f64,
}

/// Finds when the raw cell intensity first rises persistently above the contrast the
/// cell had before perforation.
#[derive(Debug, Clone)]
pub struct PerforationDetector {
	config: PerforationConfig,
}

impl PerforationDetector {
	pub fn new(config: PerforationConfig) -> Result<Self, DetectionError> {
		config.validate()?;
		Ok(Self { config })
	}

	#[must_use]
	pub const fn config(&self) -> &PerforationConfig {
		&self.config
	}

	/// `anchor_adjust` shifts the baseline window further back (positive) or closer to the
	/// peak (negative) for cells whose mask is disturbed before perforation.
	pub fn detect(
		&self,
		trace: &Trace,
		onset: &LysisOnset,
		anchor_adjust: i64,
	) -> Result<PerforationResult, DetectionError> {
		let values = trace.channel(&self.config.channel)?;
		let times = trace.times();
		if onset.rise_index >= values.len() || onset.peak_index >= values.len() {
			return Err(DetectionError::out_of_bounds(signed(onset.rise_index), signed(onset.peak_index), values.len()));
		}

		let offset = signed(self.config.anchor_offset).saturating_add(anchor_adjust);
		let anchor = signed(onset.peak_index).saturating_sub(offset);
		let anchor_index = usize::try_from(anchor)
			.ok()
			.filter(|&anchor| anchor < onset.rise_index)
			.ok_or_else(|| DetectionError::out_of_bounds(anchor, signed(onset.rise_index), values.len()))?;

		let baseline = BaselineStats::over(values, anchor_index, self.config.baseline_length)?;
		let threshold = baseline.threshold(self.config.threshold_sigmas);

		// perforation has to start no later than lysis
		let start = CrossingScanner::rising(threshold, self.config.persistence_window).scan_until(
			times,
			values,
			anchor_index,
			(onset.rise_index + self.config.persistence_window).min(values.len()),
		)?;

		let duration = onset.rise_time - start.time;

		debug!(
			cell = trace.cell_id(),
			anchor_index,
			baseline_mean = baseline.mean,
			baseline_std = baseline.std_dev,
			threshold,
			start_time = start.time,
			duration,
			"Located perforation onset"
		);

		Ok(PerforationResult {
			cell_id: trace.cell_id(),
			start_time: start.time,
			end_time: onset.rise_time,
			duration,
			start_index: start.index,
			anchor_index,
			baseline,
			threshold,
		})
	}
}
