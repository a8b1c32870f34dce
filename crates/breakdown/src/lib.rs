//! Event timing for single-cell envelope breakdown traces.
//!
//! A trace is a per-cell intensity time series. Two events are located in it: the onset
//! of the fast lysis phase, from the smoothed derivative, and the earlier onset of
//! membrane perforation, from the raw intensity against a pre-perforation baseline.

pub mod detection;
mod error;
pub mod signal;
pub mod trace;

pub use detection::{
	DerivativeWindow, FastLysisResult, LysisConfig, LysisDetector, LysisOnset, LysisStages, PerforationConfig,
	PerforationDetector, PerforationResult,
};
pub use error::{DetectionError, ErrorKind};
pub use trace::{ApproximateEventEstimate, CELL_CHANNEL, CellMetadata, STANDARD_CHANNELS, Sample, Trace};
