use crate::error::DetectionError;

pub const DEFAULT_WINDOW: usize = 8;
pub const DEFAULT_ORDER: usize = 3;

/// Savitzky-Golay smoother.
///
/// Interior samples take the value, at the window centre, of a least-squares polynomial
/// fitted over `window` samples starting `(window - 1) / 2` samples before the one being
/// smoothed. For even windows the centre sits half a sample after it, the same alignment
/// as `scipy.signal.savgol_filter`. The first and last `window / 2` samples are
/// evaluated at their own positions on the fit through the first or last `window`
/// samples. Unlike a moving average, the fit preserves the first moment of the signal,
/// so narrow peaks keep their timing.
#[derive(Debug, Clone, PartialEq)]
pub struct SavitzkyGolay {
	window: usize,
	order: usize,
	interior: Vec<f64>,
}

impl SavitzkyGolay {
	pub fn new(window: usize, order: usize) -> Result<Self, DetectionError> {
		if window == 0 {
			return Err(DetectionError::InvalidParameter("smoothing window must be positive"));
		}
		if order >= window {
			return Err(DetectionError::InvalidParameter("polynomial order must be smaller than the smoothing window"));
		}

		let interior = fit_weights(window, order, (window - 1) as f64 / 2.0)?;
		Ok(Self { window, order, interior })
	}

	#[must_use]
	pub const fn window(&self) -> usize {
		self.window
	}

	#[must_use]
	pub const fn order(&self) -> usize {
		self.order
	}

	pub fn smooth(&self, values: &[f64]) -> Result<Vec<f64>, DetectionError> {
		let n = values.len();
		if n < self.window {
			return Err(DetectionError::InsufficientSamples { needed: self.window, available: n });
		}

		let edge = self.window / 2;
		let lead = (self.window - 1) / 2;
		let mut smoothed = Vec::with_capacity(n);

		for i in 0..n {
			let value = if i < edge {
				apply(&fit_weights(self.window, self.order, i as f64)?, &values[..self.window])
			} else if i + edge >= n {
				let start = n - self.window;
				apply(&fit_weights(self.window, self.order, (i - start) as f64)?, &values[start..])
			} else {
				let start = i - lead;
				apply(&self.interior, &values[start..start + self.window])
			};
			smoothed.push(value);
		}

		Ok(smoothed)
	}
}

/// Trailing moving average. The first `window - 1` outputs average the samples seen so far.
///
/// Kept for comparison with [`SavitzkyGolay`]: it delays features by roughly
/// `(window - 1) / 2` samples.
#[must_use]
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
	let window = window.max(1);
	let mut averaged = Vec::with_capacity(values.len());
	let mut sum = 0.0;

	for (i, &value) in values.iter().enumerate() {
		sum += value;
		if i >= window {
			sum -= values[i - window];
		}
		averaged.push(sum / (i + 1).min(window) as f64);
	}

	averaged
}

fn apply(weights: &[f64], values: &[f64]) -> f64 {
	weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// Weights `h` such that `h · y` is the least-squares polynomial of degree `order`
/// through `y[0..window]`, evaluated at position `at`.
fn fit_weights(window: usize, order: usize, at: f64) -> Result<Vec<f64>, DetectionError> {
	let terms = order + 1;
	let offsets: Vec<f64> = (0..window).map(|j| j as f64 - at).collect();

	// Normal equations (AᵀA) z = e₀, with A[j][k] = offset_jᵏ
	let mut normal = vec![vec![0.0; terms + 1]; terms];
	for (row, equation) in normal.iter_mut().enumerate() {
		for col in 0..terms {
			equation[col] = offsets.iter().map(|x| x.powi((row + col) as i32)).sum();
		}
		equation[terms] = if row == 0 { 1.0 } else { 0.0 };
	}

	let z = solve(normal)?;

	Ok(offsets.iter().map(|x| z.iter().enumerate().map(|(k, zk)| zk * x.powi(k as i32)).sum()).collect())
}

/// Gaussian elimination with partial pivoting on an augmented matrix.
fn solve(mut augmented: Vec<Vec<f64>>) -> Result<Vec<f64>, DetectionError> {
	let n = augmented.len();

	for col in 0..n {
		let pivot = (col..n)
			.max_by(|&a, &b| augmented[a][col].abs().total_cmp(&augmented[b][col].abs()))
			.unwrap_or(col);
		if augmented[pivot][col].abs() < f64::EPSILON {
			return Err(DetectionError::InvalidParameter("smoothing fit is singular"));
		}
		augmented.swap(col, pivot);

		for row in col + 1..n {
			let factor = augmented[row][col] / augmented[col][col];
			for k in col..=n {
				augmented[row][k] -= factor * augmented[col][k];
			}
		}
	}

	let mut solution = vec![0.0; n];
	for row in (0..n).rev() {
		let tail: f64 = (row + 1..n).map(|k| augmented[row][k] * solution[k]).sum();
		solution[row] = (augmented[row][n] - tail) / augmented[row][row];
	}

	Ok(solution)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn gaussian_pulse(len: usize, center: f64, sigma: f64) -> Vec<f64> {
		(0..len).map(|i| 10.0 * (-((i as f64 - center).powi(2)) / (2.0 * sigma * sigma)).exp()).collect()
	}

	fn argmax(values: &[f64]) -> usize {
		values.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)).map(|(i, _)| i).unwrap()
	}

	#[test]
	fn interior_weights_sum_to_one() {
		let sg = SavitzkyGolay::new(DEFAULT_WINDOW, DEFAULT_ORDER).unwrap();
		let total: f64 = sg.interior.iter().sum();
		assert!((total - 1.0).abs() < 1e-9);
	}

	#[test]
	fn reproduces_cubic_exactly() {
		let cubic: Vec<f64> = (0..30).map(|i| {
			let x = i as f64 * 0.1;
			0.5 * x.powi(3) - 2.0 * x * x + x + 3.0
		}).collect();

		let smoothed = SavitzkyGolay::new(8, 3).unwrap().smooth(&cubic).unwrap();
		for (a, b) in cubic.iter().zip(&smoothed) {
			assert!((a - b).abs() < 1e-8, "{a} != {b}");
		}
	}

	#[test]
	fn even_window_is_evaluated_at_its_centre() {
		let ramp: Vec<f64> = (0..30).map(f64::from).collect();
		let smoothed = SavitzkyGolay::new(8, 3).unwrap().smooth(&ramp).unwrap();

		// interior: fit over [i - 3, i + 5), centre at i + 0.5
		for i in 4..26 {
			assert!((smoothed[i] - (i as f64 + 0.5)).abs() < 1e-9, "s[{i}] = {}", smoothed[i]);
		}
		// edges: own positions on the first and last window's fit
		for i in (0..4).chain(26..30) {
			assert!((smoothed[i] - i as f64).abs() < 1e-9, "s[{i}] = {}", smoothed[i]);
		}
	}

	#[test]
	fn odd_window_is_evaluated_at_the_sample() {
		let ramp: Vec<f64> = (0..20).map(f64::from).collect();
		let smoothed = SavitzkyGolay::new(7, 2).unwrap().smooth(&ramp).unwrap();

		for (i, value) in smoothed.iter().enumerate() {
			assert!((value - i as f64).abs() < 1e-9, "s[{i}] = {value}");
		}
	}

	#[test]
	fn keeps_length() {
		let values: Vec<f64> = (0..17).map(|i| f64::from(i % 5)).collect();
		assert_eq!(SavitzkyGolay::new(DEFAULT_WINDOW, DEFAULT_ORDER).unwrap().smooth(&values).unwrap().len(), 17);
		assert_eq!(moving_average(&values, 5).len(), 17);
	}

	#[test]
	fn rejects_short_input_and_bad_order() {
		let sg = SavitzkyGolay::new(DEFAULT_WINDOW, DEFAULT_ORDER).unwrap();
		assert_eq!(sg.smooth(&[1.0; 7]), Err(DetectionError::InsufficientSamples { needed: 8, available: 7 }));
		assert!(matches!(SavitzkyGolay::new(4, 4), Err(DetectionError::InvalidParameter(_))));
		assert!(matches!(SavitzkyGolay::new(0, 0), Err(DetectionError::InvalidParameter(_))));
	}

	#[test]
	fn moving_average_warms_up() {
		let averaged = moving_average(&[2.0, 4.0, 6.0, 8.0], 2);
		assert_eq!(averaged, vec![2.0, 3.0, 5.0, 7.0]);
	}

	#[test]
	fn smoother_preserves_peak_timing_better_than_moving_average() {
		let pulse = gaussian_pulse(101, 50.0, 2.0);

		let sg_peak = argmax(&SavitzkyGolay::new(DEFAULT_WINDOW, DEFAULT_ORDER).unwrap().smooth(&pulse).unwrap());
		let ma_peak = argmax(&moving_average(&pulse, DEFAULT_WINDOW));

		assert!(sg_peak.abs_diff(50) <= 1, "smoothed peak at {sg_peak}");
		assert!(ma_peak.abs_diff(50) >= 3, "moving average peak at {ma_peak}");
	}

	proptest! {
		#[test]
		fn prop_peak_timing_bias(center in 20usize..80, sigma in 1.5f64..4.0) {
			let pulse = gaussian_pulse(101, center as f64, sigma);

			let smoothed = SavitzkyGolay::new(DEFAULT_WINDOW, DEFAULT_ORDER).unwrap().smooth(&pulse).unwrap();
			let sg_shift = argmax(&smoothed).abs_diff(center);
			let ma_shift = argmax(&moving_average(&pulse, DEFAULT_WINDOW)).abs_diff(center);

			prop_assert!(sg_shift <= 1);
			prop_assert!(sg_shift < ma_shift);
		}
	}
}
