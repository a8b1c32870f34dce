use crate::error::DetectionError;

/// Index of the single global maximum of `values`.
///
/// Ties for the maximum are reported as [`DetectionError::AmbiguousPeak`] rather than
/// resolved to the first occurrence; the caller has to narrow the search window.
pub fn locate_peak(values: &[f64]) -> Result<usize, DetectionError> {
	if let Some(i) = values.iter().position(|v| !v.is_finite()) {
		return Err(DetectionError::MalformedTrace(format!("non-finite value at index {i} of peak window")));
	}

	let (index, &value) =
		values.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1)).ok_or(DetectionError::NoPeak)?;

	#[allow(clippy::float_cmp)]
	let count = values.iter().filter(|&&v| v == value).count();
	if count > 1 {
		return Err(DetectionError::AmbiguousPeak { count, value });
	}

	Ok(index)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_single_maximum() {
		assert_eq!(locate_peak(&[0.0, 1.0, 5.0, 2.0, -1.0]), Ok(2));
		assert_eq!(locate_peak(&[-3.0]), Ok(0));
	}

	#[test]
	fn empty_window_has_no_peak() {
		assert_eq!(locate_peak(&[]), Err(DetectionError::NoPeak));
	}

	#[test]
	fn flags_tied_maxima() {
		assert_eq!(locate_peak(&[1.0, 4.0, 2.0, 4.0]), Err(DetectionError::AmbiguousPeak { count: 2, value: 4.0 }));
	}

	#[test]
	fn rejects_nan() {
		assert!(matches!(locate_peak(&[1.0, f64::NAN]), Err(DetectionError::MalformedTrace(_))));
	}
}
