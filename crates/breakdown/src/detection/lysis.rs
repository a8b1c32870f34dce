use serde::Deserialize;
use tracing::debug;

use crate::error::{DetectionError, signed};
use crate::signal::{BaselineStats, CrossingScanner, SavitzkyGolay, first_difference, locate_peak, smoothing};
use crate::trace::{CELL_CHANNEL, Trace, time_window};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LysisConfig {
	pub channel: String,
	/// Half width of the search window around the approximate lysis time.
	pub half_window_secs: f64,
	pub smoothing_window: usize,
	pub polynomial_order: usize,
	/// Baseline window is `[peak - baseline_start_secs, peak - baseline_end_secs)`.
	pub baseline_start_secs: f64,
	pub baseline_end_secs: f64,
	pub threshold_sigmas: f64,
	pub persistence_window: usize,
	/// Samples before the derivative peak where the rise scan starts.
	pub rise_offset: usize,
	/// Fraction of the peak rate that the derivative has to fall below.
	pub fall_fraction: f64,
}

impl Default for LysisConfig {
	fn default() -> Self {
		Self {
			channel: CELL_CHANNEL.to_string(),
			half_window_secs: 2.0,
			smoothing_window: smoothing::DEFAULT_WINDOW,
			polynomial_order: smoothing::DEFAULT_ORDER,
			baseline_start_secs: 1.5,
			baseline_end_secs: 0.5,
			threshold_sigmas: 3.0,
			persistence_window: 5,
			rise_offset: 60,
			fall_fraction: 0.5,
		}
	}
}

impl LysisConfig {
	/// Settings used while developing the method on single cells.
	#[must_use]
	pub fn exploratory() -> Self {
		Self { persistence_window: 3, rise_offset: 30, ..Self::default() }
	}

	pub fn validate(&self) -> Result<(), DetectionError> {
		if self.half_window_secs <= 0.0 {
			return Err(DetectionError::InvalidParameter("lysis half_window_secs must be positive"));
		}
		if self.baseline_start_secs <= self.baseline_end_secs {
			return Err(DetectionError::InvalidParameter("lysis baseline_start_secs must exceed baseline_end_secs"));
		}
		if self.persistence_window == 0 {
			return Err(DetectionError::InvalidParameter("lysis persistence_window must be positive"));
		}
		if !(0.0..=1.0).contains(&self.fall_fraction) {
			return Err(DetectionError::InvalidParameter("lysis fall_fraction must be between 0 and 1"));
		}
		if self.threshold_sigmas < 0.0 {
			return Err(DetectionError::InvalidParameter("lysis threshold_sigmas must be non-negative"));
		}
		Ok(())
	}
}

/// Onset of lysis: where the smoothed derivative peaks and where it first rose
/// persistently above its pre-peak baseline. Indices address the full trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LysisOnset {
	pub cell_id: u32,
	pub peak_index: usize,
	pub peak_time: f64,
	/// Smoothed derivative at the peak.
	pub peak_rate: f64,
	pub baseline: BaselineStats,
	pub rise_threshold: f64,
	pub rise_index: usize,
	pub rise_time: f64,
}

/// Rise (t5), peak and fall markers of the fast breakdown phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastLysisResult {
	pub cell_id: u32,
	pub rise_time: f64,
	pub peak_time: f64,
	pub fall_time: f64,
	pub fall_index: usize,
	pub onset: LysisOnset,
}

/// A located onset together with the outcome of the fall scan that follows it.
///
/// The fall is informational: a cell whose derivative never drops back still has a
/// usable onset for perforation.
#[derive(Debug, Clone, PartialEq)]
pub struct LysisStages {
	pub onset: LysisOnset,
	pub fast_lysis: Result<FastLysisResult, DetectionError>,
}

/// Smoothed derivative of the search window around the approximate lysis time.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeWindow {
	/// Index of the window's first sample in the full trace.
	pub offset: usize,
	pub times: Vec<f64>,
	pub smoothed: Vec<f64>,
	pub derivative: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LysisDetector {
	config: LysisConfig,
	smoother: SavitzkyGolay,
}

impl LysisDetector {
	pub fn new(config: LysisConfig) -> Result<Self, DetectionError> {
		config.validate()?;
		let smoother = SavitzkyGolay::new(config.smoothing_window, config.polynomial_order)?;
		Ok(Self { config, smoother })
	}

	#[must_use]
	pub const fn config(&self) -> &LysisConfig {
		&self.config
	}

	/// Smooths and differentiates the samples within `half_window_secs` of `seed_time`.
	pub fn derivative_window(&self, trace: &Trace, seed_time: f64) -> Result<DerivativeWindow, DetectionError> {
		let range =
			trace.index_range(seed_time - self.config.half_window_secs, seed_time + self.config.half_window_secs);
		if range.is_empty() {
			return Err(DetectionError::NoPeak);
		}
		let values = trace.channel(&self.config.channel)?;

		let smoothed = self.smoother.smooth(&values[range.clone()])?;
		let derivative = first_difference(&smoothed);

		Ok(DerivativeWindow { offset: range.start, times: trace.times()[range].to_vec(), smoothed, derivative })
	}

	/// Peak and rise of the derivative; enough to bound perforation when the fall is not needed.
	pub fn locate_onset(&self, trace: &Trace, seed_time: f64) -> Result<LysisOnset, DetectionError> {
		let window = self.derivative_window(trace, seed_time)?;
		self.onset_in(trace.cell_id(), &window)
	}

	pub fn detect(&self, trace: &Trace, seed_time: f64) -> Result<FastLysisResult, DetectionError> {
		self.detect_stages(trace, seed_time)?.fast_lysis
	}

	/// Runs every stage once. Fails only when the onset cannot be located; a missing fall
	/// is carried in [`LysisStages::fast_lysis`].
	pub fn detect_stages(&self, trace: &Trace, seed_time: f64) -> Result<LysisStages, DetectionError> {
		let window = self.derivative_window(trace, seed_time)?;
		let onset = self.onset_in(trace.cell_id(), &window)?;
		let fast_lysis = self.fall_after(&window, onset);

		Ok(LysisStages { onset, fast_lysis })
	}

	fn fall_after(&self, window: &DerivativeWindow, onset: LysisOnset) -> Result<FastLysisResult, DetectionError> {
		let peak = onset.peak_index - window.offset;
		let fall_threshold = onset.peak_rate * self.config.fall_fraction;
		let fall = CrossingScanner::falling(fall_threshold, self.config.persistence_window).scan(
			&window.times,
			&window.derivative,
			peak,
		)?;

		debug!(cell = onset.cell_id, fall_threshold, fall_time = fall.time, "Located fall of lysis rate");

		Ok(FastLysisResult {
			cell_id: onset.cell_id,
			rise_time: onset.rise_time,
			peak_time: onset.peak_time,
			fall_time: fall.time,
			fall_index: window.offset + fall.index,
			onset,
		})
	}

	fn onset_in(&self, cell_id: u32, window: &DerivativeWindow) -> Result<LysisOnset, DetectionError> {
		let DerivativeWindow { offset, times, derivative, .. } = window;

		let peak = locate_peak(derivative)?;
		let peak_time = times[peak];

		let baseline_range = time_window(
			times,
			peak_time - self.config.baseline_start_secs,
			peak_time - self.config.baseline_end_secs,
		);
		let baseline = BaselineStats::over(derivative, baseline_range.start, baseline_range.len())?;
		let rise_threshold = baseline.threshold(self.config.threshold_sigmas);

		let persistence = self.config.persistence_window;
		let start = peak.checked_sub(self.config.rise_offset).ok_or_else(|| {
			DetectionError::out_of_bounds(signed(peak) - signed(self.config.rise_offset), signed(peak), derivative.len())
		})?;
		// the rising run has to begin no later than the peak
		let end = (peak + persistence).min(derivative.len());
		let rise = CrossingScanner::rising(rise_threshold, persistence).scan_until(times, derivative, start, end)?;

		debug!(
			cell = cell_id,
			peak_time,
			baseline_mean = baseline.mean,
			baseline_std = baseline.std_dev,
			rise_threshold,
			rise_time = rise.time,
			"Located lysis onset"
		);

		Ok(LysisOnset {
			cell_id,
			peak_index: offset + peak,
			peak_time,
			peak_rate: derivative[peak],
			baseline,
			rise_threshold,
			rise_index: offset + rise.index,
			rise_time: rise.time,
		})
	}
}
