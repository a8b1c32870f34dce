/// First difference `d[i] = v[i] - v[i - 1]`, with `d[0] = 0` so indices stay aligned with the input.
#[must_use]
pub fn first_difference(values: &[f64]) -> Vec<f64> {
	let mut derivative = Vec::with_capacity(values.len());
	if !values.is_empty() {
		derivative.push(0.0);
	}
	derivative.extend(values.windows(2).map(|w| w[1] - w[0]));
	derivative
}
