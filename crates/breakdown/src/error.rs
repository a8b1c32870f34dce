use thiserror::Error;

/// Why a detector could not produce an event for a trace.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
	#[error("no persistent threshold crossing found")]
	NotFound,
	#[error("peak search window is empty")]
	NoPeak,
	#[error("{count} samples share the maximum value {value}")]
	AmbiguousPeak { count: usize, value: f64 },
	#[error("malformed trace: {0}")]
	MalformedTrace(String),
	#[error("window [{start}, {end}) lies outside a series of {len} samples")]
	WindowOutOfBounds { start: i64, end: i64, len: usize },
	#[error("window holds {available} samples, at least {needed} required")]
	InsufficientSamples { needed: usize, available: usize },
	#[error("invalid parameter: {0}")]
	InvalidParameter(&'static str),
}

/// Coarse classification used when reporting skipped cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// The signal never met a detection condition; the window or seed may need correction.
	Undetected,
	/// The input trace itself is broken.
	Malformed,
	/// A window or parameter does not fit the data it was applied to.
	Configuration,
}

impl DetectionError {
	#[must_use]
	pub const fn kind(&self) -> ErrorKind {
		match self {
			Self::NotFound | Self::NoPeak | Self::AmbiguousPeak { .. } => ErrorKind::Undetected,
			Self::MalformedTrace(_) => ErrorKind::Malformed,
			Self::WindowOutOfBounds { .. } | Self::InsufficientSamples { .. } | Self::InvalidParameter(_) => {
				ErrorKind::Configuration
			},
		}
	}

	pub(crate) const fn out_of_bounds(start: i64, end: i64, len: usize) -> Self {
		Self::WindowOutOfBounds { start, end, len }
	}
}

pub(crate) fn signed(index: usize) -> i64 {
	i64::try_from(index).unwrap_or(i64::MAX)
}

impl ErrorKind {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Undetected => "undetected",
			Self::Malformed => "malformed",
			Self::Configuration => "configuration",
		}
	}
}
