use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// Channel holding the intensity inside the cell mask.
pub const CELL_CHANNEL: &str = "c";

/// Channels recorded for every cell: left of cell, cell, right of cell, side trench.
pub const STANDARD_CHANNELS: [&str; 4] = ["l", "c", "r", "st"];

/// One frame of a cell's photometric record.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
	pub timepoint: i64,
	pub time: f64,
	pub channels: BTreeMap<String, f64>,
}

/// Where a cell sits and how its frames map onto the trench clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMetadata {
	pub cell_id: u32,
	pub trench_id: u32,
	pub start_offset: i64,
}

impl CellMetadata {
	/// Seconds since the trench's first frame for a cell-local timepoint.
	#[must_use]
	pub fn adjusted_time(&self, timepoint: i64, frame_spacing: f64) -> f64 {
		(timepoint + self.start_offset) as f64 * frame_spacing
	}
}

/// Hand-picked frame near which lysis was observed, numbered at the nominal imaging interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproximateEventEstimate {
	pub cell_id: u32,
	pub lysis_timepoint: i64,
}

impl ApproximateEventEstimate {
	/// Seed time in seconds after correcting for the trench's measured frame spacing.
	#[must_use]
	pub fn seed_time(&self, frame_spacing: f64) -> f64 {
		self.lysis_timepoint as f64 * frame_spacing
	}
}

/// Columnar, validated time series for one cell.
///
/// Timepoints and times are strictly increasing and every channel has one finite
/// value per sample. Detectors address the trace by index.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
	cell_id: u32,
	trench_id: u32,
	timepoints: Vec<i64>,
	times: Vec<f64>,
	channels: BTreeMap<String, Vec<f64>>,
}

impl Trace {
	pub fn from_columns(
		cell_id: u32,
		trench_id: u32,
		timepoints: Vec<i64>,
		times: Vec<f64>,
		channels: BTreeMap<String, Vec<f64>>,
	) -> Result<Self, DetectionError> {
		let trace = Self { cell_id, trench_id, timepoints, times, channels };
		trace.validate()?;
		Ok(trace)
	}

	pub fn from_samples(cell_id: u32, trench_id: u32, samples: Vec<Sample>) -> Result<Self, DetectionError> {
		let mut timepoints = Vec::with_capacity(samples.len());
		let mut times = Vec::with_capacity(samples.len());
		let mut channels: BTreeMap<String, Vec<f64>> = samples
			.first()
			.map(|s| s.channels.keys().map(|name| (name.clone(), Vec::with_capacity(samples.len()))).collect())
			.unwrap_or_default();

		for sample in samples {
			if sample.channels.len() != channels.len() {
				return Err(DetectionError::MalformedTrace(format!(
					"cell {cell_id}: timepoint {} has {} channels, expected {}",
					sample.timepoint,
					sample.channels.len(),
					channels.len()
				)));
			}

			for (name, value) in sample.channels {
				let column = channels.get_mut(&name).ok_or_else(|| {
					DetectionError::MalformedTrace(format!(
						"cell {cell_id}: unexpected channel '{name}' at timepoint {}",
						sample.timepoint
					))
				})?;
				column.push(value);
			}

			timepoints.push(sample.timepoint);
			times.push(sample.time);
		}

		Self::from_columns(cell_id, trench_id, timepoints, times, channels)
	}

	fn validate(&self) -> Result<(), DetectionError> {
		let malformed = |msg: String| -> Result<(), DetectionError> {
			Err(DetectionError::MalformedTrace(format!("cell {}: {msg}", self.cell_id)))
		};

		if self.timepoints.len() != self.times.len() {
			return malformed(format!("{} timepoints but {} times", self.timepoints.len(), self.times.len()));
		}

		if let Some(i) = self.times.iter().position(|t| !t.is_finite()) {
			return malformed(format!("non-finite time at index {i}"));
		}

		if let Some(i) = self.timepoints.windows(2).position(|w| w[1] <= w[0]) {
			return malformed(format!("timepoints not strictly increasing at index {}", i + 1));
		}

		if let Some(i) = self.times.windows(2).position(|w| w[1] <= w[0]) {
			return malformed(format!("times not strictly increasing at index {}", i + 1));
		}

		for (name, values) in &self.channels {
			if values.len() != self.times.len() {
				return malformed(format!("channel '{name}' has {} values for {} samples", values.len(), self.times.len()));
			}
			if let Some(i) = values.iter().position(|v| !v.is_finite()) {
				return malformed(format!("channel '{name}' has a non-finite value at index {i}"));
			}
		}

		Ok(())
	}

	#[must_use]
	pub const fn cell_id(&self) -> u32 {
		self.cell_id
	}

	#[must_use]
	pub const fn trench_id(&self) -> u32 {
		self.trench_id
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.times.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.times.is_empty()
	}

	#[must_use]
	pub fn times(&self) -> &[f64] {
		&self.times
	}

	#[must_use]
	pub fn timepoints(&self) -> &[i64] {
		&self.timepoints
	}

	pub fn channel(&self, name: &str) -> Result<&[f64], DetectionError> {
		self.channels
			.get(name)
			.map(Vec::as_slice)
			.ok_or_else(|| DetectionError::MalformedTrace(format!("cell {}: missing channel '{name}'", self.cell_id)))
	}

	pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
		(0..self.len()).map(|i| Sample {
			timepoint: self.timepoints[i],
			time: self.times[i],
			channels: self.channels.iter().map(|(name, values)| (name.clone(), values[i])).collect(),
		})
	}

	/// Index range of samples with `from_secs <= time < to_secs`.
	#[must_use]
	pub fn index_range(&self, from_secs: f64, to_secs: f64) -> Range<usize> {
		time_window(&self.times, from_secs, to_secs)
	}

	/// Copy of the trace restricted to `from_secs <= time < to_secs`.
	pub fn trimmed(&self, from_secs: f64, to_secs: f64) -> Result<Self, DetectionError> {
		let range = self.index_range(from_secs, to_secs);
		Self::from_columns(
			self.cell_id,
			self.trench_id,
			self.timepoints[range.clone()].to_vec(),
			self.times[range.clone()].to_vec(),
			self.channels.iter().map(|(name, values)| (name.clone(), values[range.clone()].to_vec())).collect(),
		)
	}
}

/// Index range of a sorted time array covering `from <= t < to`.
#[must_use]
pub fn time_window(times: &[f64], from: f64, to: f64) -> Range<usize> {
	let start = times.partition_point(|&t| t < from);
	let end = times.partition_point(|&t| t < to).max(start);
	start..end
}
