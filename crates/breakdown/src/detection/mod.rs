pub mod lysis;
pub mod perforation;

pub use lysis::{DerivativeWindow, FastLysisResult, LysisConfig, LysisDetector, LysisOnset, LysisStages};
pub use perforation::{PerforationConfig, PerforationDetector, PerforationResult};
