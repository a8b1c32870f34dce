use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use breakdown::{LysisConfig, PerforationConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub paths: PathsConfig,
	#[serde(default)]
	pub lysis: LysisConfig,
	#[serde(default)]
	pub perforation: PerforationConfig,
	pub trenches: Vec<TrenchConfig>,
	pub cells: Vec<CellConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
	/// Per-channel intensity exports, `lys_{NN}_{channel}.csv`.
	pub raw_dir: PathBuf,
	/// Merged, time-adjusted traces written by `prepare`.
	pub trace_dir: PathBuf,
	pub output_dir: PathBuf,
	/// CSV with `cell` and `lysis_t_start` columns.
	pub approximate_times: PathBuf,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrenchConfig {
	pub id: u32,
	/// Measured seconds per frame.
	pub frame_spacing: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisClass {
	/// Fast lysis and perforation.
	Full,
	/// Fast lysis only; the perforation phase is unusable.
	LysisOnly,
	/// Perforation only; lysis onset is still estimated to close the interval.
	PerforationOnly,
	Excluded,
}

impl AnalysisClass {
	#[must_use]
	pub const fn wants_lysis(self) -> bool {
		matches!(self, Self::Full | Self::LysisOnly)
	}

	#[must_use]
	pub const fn wants_perforation(self) -> bool {
		matches!(self, Self::Full | Self::PerforationOnly)
	}
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellConfig {
	pub id: u32,
	pub trench: u32,
	/// First frame of the cell's record on the trench clock.
	#[serde(default)]
	pub start_offset: i64,
	pub analysis: AnalysisClass,
	/// Samples added to the perforation anchor offset.
	#[serde(default)]
	pub anchor_adjust: i64,
	/// Keep only `start <= time < end` seconds.
	pub trim: Option<[f64; 2]>,
}

impl Config {
	pub fn load(path: &Path) -> Result<Self> {
		let content =
			fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self> {
		let config: Self = toml::from_str(content).context("Failed to parse config file")?;

		config.validate()?;

		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		self.lysis.validate().context("Invalid [lysis] section")?;
		self.perforation.validate().context("Invalid [perforation] section")?;

		if self.lysis.smoothing_window > 0 && self.lysis.polynomial_order >= self.lysis.smoothing_window {
			anyhow::bail!("lysis polynomial_order must be smaller than smoothing_window");
		}

		if self.trenches.is_empty() {
			anyhow::bail!("At least one [[trenches]] entry is required");
		}

		let mut trench_ids = BTreeSet::new();
		for trench in &self.trenches {
			if !trench_ids.insert(trench.id) {
				anyhow::bail!("Duplicate trench id {}", trench.id);
			}
			if !trench.frame_spacing.is_finite() || trench.frame_spacing <= 0.0 {
				anyhow::bail!("Trench {} frame_spacing must be positive", trench.id);
			}
		}

		let mut cell_ids = BTreeSet::new();
		for cell in &self.cells {
			if !cell_ids.insert(cell.id) {
				anyhow::bail!("Duplicate cell id {}", cell.id);
			}
			if !trench_ids.contains(&cell.trench) {
				anyhow::bail!("Cell {} refers to unknown trench {}", cell.id, cell.trench);
			}
			if let Some([start, end]) = cell.trim
				&& start >= end
			{
				anyhow::bail!("Cell {} trim window [{start}, {end}) is empty", cell.id);
			}
		}

		Ok(())
	}
}
