pub mod crossing;
pub mod derivative;
pub mod peak;
pub mod smoothing;
pub mod stats;

pub use crossing::{Crossing, CrossingScanner, Direction};
pub use derivative::first_difference;
pub use peak::locate_peak;
pub use smoothing::{SavitzkyGolay, moving_average};
pub use stats::BaselineStats;
