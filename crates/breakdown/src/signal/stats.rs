use crate::error::{DetectionError, signed};

/// Mean and Bessel-corrected standard deviation of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineStats {
	pub mean: f64,
	pub std_dev: f64,
	pub count: usize,
}

impl BaselineStats {
	/// Statistics of `values[start..start + length]`.
	pub fn over(values: &[f64], start: usize, length: usize) -> Result<Self, DetectionError> {
		let end = start.checked_add(length).filter(|&end| end <= values.len()).ok_or_else(|| {
			DetectionError::out_of_bounds(signed(start), signed(start).saturating_add(signed(length)), values.len())
		})?;

		Self::of(&values[start..end])
	}

	pub fn of(window: &[f64]) -> Result<Self, DetectionError> {
		let count = window.len();
		if count < 2 {
			return Err(DetectionError::InsufficientSamples { needed: 2, available: count });
		}

		let n = count as f64;
		let mean = window.iter().sum::<f64>() / n;
		let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

		Ok(Self { mean, std_dev: variance.sqrt(), count })
	}

	/// `mean + sigmas * std_dev`
	#[must_use]
	pub fn threshold(&self, sigmas: f64) -> f64 {
		sigmas.mul_add(self.std_dev, self.mean)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uses_sample_standard_deviation() {
		let stats = BaselineStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
		assert!((stats.mean - 5.0).abs() < 1e-12);
		// population std is 2.0; with n - 1 it is sqrt(32 / 7)
		assert!((stats.std_dev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
		assert_eq!(stats.count, 8);
	}

	#[test]
	fn windowed_over_index_range() {
		let values = [100.0, 1.0, 2.0, 3.0, 100.0];
		let stats = BaselineStats::over(&values, 1, 3).unwrap();
		assert!((stats.mean - 2.0).abs() < 1e-12);
		assert!((stats.std_dev - 1.0).abs() < 1e-12);
		assert!((stats.threshold(3.0) - 5.0).abs() < 1e-12);
	}

	#[test]
	fn window_past_the_end_is_a_configuration_error() {
		let err = BaselineStats::over(&[1.0, 2.0, 3.0], 2, 5).unwrap_err();
		assert_eq!(err, DetectionError::WindowOutOfBounds { start: 2, end: 7, len: 3 });
	}

	#[test]
	fn needs_two_samples() {
		assert_eq!(
			BaselineStats::over(&[1.0, 2.0], 1, 1),
			Err(DetectionError::InsufficientSamples { needed: 2, available: 1 })
		);
	}
}
