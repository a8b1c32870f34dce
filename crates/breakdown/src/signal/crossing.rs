use crate::error::{DetectionError, signed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	/// `value > threshold`
	Rising,
	/// `value < threshold`
	Falling,
}

impl Direction {
	#[must_use]
	pub fn passes(self, value: f64, threshold: f64) -> bool {
		match self {
			Self::Rising => value > threshold,
			Self::Falling => value < threshold,
		}
	}
}

/// First sample of a run that stayed past the threshold for the whole persistence window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
	pub index: usize,
	pub time: f64,
}

/// Persistence-gated threshold-crossing search.
///
/// A crossing is only declared once `persistence` consecutive samples satisfy the
/// direction's predicate; shorter excursions are treated as noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingScanner {
	pub threshold: f64,
	pub persistence: usize,
	pub direction: Direction,
}

impl CrossingScanner {
	#[must_use]
	pub const fn rising(threshold: f64, persistence: usize) -> Self {
		Self { threshold, persistence, direction: Direction::Rising }
	}

	#[must_use]
	pub const fn falling(threshold: f64, persistence: usize) -> Self {
		Self { threshold, persistence, direction: Direction::Falling }
	}

	/// Scans `values[start..]`.
	pub fn scan(&self, times: &[f64], values: &[f64], start: usize) -> Result<Crossing, DetectionError> {
		self.scan_until(times, values, start, values.len())
	}

	/// Scans `values[start..end]`; the whole qualifying run has to fit before `end`.
	pub fn scan_until(&self, times: &[f64], values: &[f64], start: usize, end: usize) -> Result<Crossing, DetectionError> {
		if self.persistence == 0 {
			return Err(DetectionError::InvalidParameter("persistence window must be positive"));
		}
		if times.len() != values.len() {
			return Err(DetectionError::MalformedTrace(format!(
				"{} times for {} values in crossing scan",
				times.len(),
				values.len()
			)));
		}
		if start > end || end > values.len() {
			return Err(DetectionError::out_of_bounds(signed(start), signed(end), values.len()));
		}

		let mut run = 0;
		for (index, &value) in values.iter().enumerate().take(end).skip(start) {
			if self.direction.passes(value, self.threshold) {
				run += 1;
			} else {
				run = 0;
			}

			if run == self.persistence {
				let first = index + 1 - self.persistence;
				return Ok(Crossing { index: first, time: times[first] });
			}
		}

		Err(DetectionError::NotFound)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn index_times(len: usize) -> Vec<f64> {
		(0..len).map(|i| i as f64 * 0.01).collect()
	}

	#[test]
	fn rising_crossing_reports_first_index_of_run() {
		let values = [0.0, 0.0, 0.0, 5.0, 6.0, 7.0, 8.0, 2.0, 1.0, 0.0];
		let crossing = CrossingScanner::rising(4.0, 3).scan(&index_times(values.len()), &values, 0).unwrap();

		assert_eq!(crossing.index, 3);
		assert!((crossing.time - 0.03).abs() < 1e-12);
	}

	#[test]
	fn falling_crossing_reports_first_index_of_run() {
		let values = [8.0, 7.0, 6.0, 1.0, 1.0, 1.0, 1.0];
		let crossing = CrossingScanner::falling(4.0, 3).scan(&index_times(values.len()), &values, 0).unwrap();

		assert_eq!(crossing.index, 3);
	}

	#[test]
	fn short_excursions_reset_the_run() {
		let values = [5.0, 5.0, 0.0, 5.0, 0.0, 5.0, 5.0, 5.0];
		let crossing = CrossingScanner::rising(4.0, 3).scan(&index_times(values.len()), &values, 0).unwrap();

		assert_eq!(crossing.index, 5);
	}

	#[test]
	fn run_ending_on_last_sample_counts() {
		let values = [0.0, 0.0, 9.0, 9.0];
		let crossing = CrossingScanner::rising(4.0, 2).scan(&index_times(values.len()), &values, 0).unwrap();

		assert_eq!(crossing.index, 2);
	}

	#[test]
	fn start_index_skips_earlier_runs() {
		let values = [9.0, 9.0, 9.0, 0.0, 9.0, 9.0, 9.0];
		let crossing = CrossingScanner::rising(4.0, 3).scan(&index_times(values.len()), &values, 1).unwrap();

		assert_eq!(crossing.index, 4);
	}

	#[test]
	fn end_bound_requires_whole_run() {
		let values = [0.0, 9.0, 9.0, 9.0, 9.0];
		let times = index_times(values.len());
		let scanner = CrossingScanner::rising(4.0, 3);

		assert_eq!(scanner.scan_until(&times, &values, 0, 3), Err(DetectionError::NotFound));
		assert_eq!(scanner.scan_until(&times, &values, 0, 4).map(|c| c.index), Ok(1));
	}

	#[test]
	fn threshold_itself_does_not_pass() {
		let values = [4.0; 10];
		let times = index_times(values.len());

		assert_eq!(CrossingScanner::rising(4.0, 1).scan(&times, &values, 0), Err(DetectionError::NotFound));
		assert_eq!(CrossingScanner::falling(4.0, 1).scan(&times, &values, 0), Err(DetectionError::NotFound));
	}

	#[test]
	fn misuse_is_reported_distinctly() {
		let values = [1.0, 2.0];
		let times = index_times(2);

		assert!(matches!(CrossingScanner::rising(0.0, 0).scan(&times, &values, 0), Err(DetectionError::InvalidParameter(_))));
		assert!(matches!(
			CrossingScanner::rising(0.0, 1).scan(&times, &values, 3),
			Err(DetectionError::WindowOutOfBounds { start: 3, end: 2, len: 2 })
		));
		assert!(matches!(
			CrossingScanner::rising(0.0, 1).scan(&times[..1], &values, 0),
			Err(DetectionError::MalformedTrace(_))
		));
	}

	#[test]
	fn empty_series_is_not_found() {
		assert_eq!(CrossingScanner::rising(0.0, 3).scan(&[], &[], 0), Err(DetectionError::NotFound));
	}

	proptest! {
		#[test]
		fn prop_all_below_threshold_is_not_found(
			values in prop::collection::vec(-100.0f64..4.0, 0..200),
			persistence in 1usize..6,
		) {
			let times = index_times(values.len());
			prop_assert_eq!(CrossingScanner::rising(4.0, persistence).scan(&times, &values, 0), Err(DetectionError::NotFound));
		}

		#[test]
		fn prop_reports_minimal_qualifying_index(
			step in 5usize..150,
			noise in prop::collection::vec(-1.0f64..1.0, 200),
			spikes in prop::collection::vec(any::<bool>(), 200),
			persistence in 1usize..6,
		) {
			// noisy step from ~0 to ~10 with isolated upward spikes before the step
			let values: Vec<f64> = (0..200)
				.map(|i| {
					let base = if i >= step { 10.0 } else { 0.0 };
					let spike = if i < step && spikes[i] { 8.0 } else { 0.0 };
					base + spike + noise[i]
				})
				.collect();
			let times = index_times(values.len());
			let threshold = 5.0;

			let brute_force = (0..=values.len() - persistence)
				.find(|&i| values[i..i + persistence].iter().all(|&v| v > threshold));

			let crossing = CrossingScanner::rising(threshold, persistence).scan(&times, &values, 0).unwrap();
			prop_assert_eq!(Some(crossing.index), brute_force);
			prop_assert!(crossing.index <= step);
		}
	}
}
