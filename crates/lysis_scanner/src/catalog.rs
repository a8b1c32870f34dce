use std::collections::BTreeMap;

use anyhow::{Context, Result};
use breakdown::CellMetadata;

use crate::config::{AnalysisClass, Config};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
	pub metadata: CellMetadata,
	pub analysis: AnalysisClass,
	pub anchor_adjust: i64,
	pub trim: Option<(f64, f64)>,
	pub frame_spacing: f64,
}

impl CatalogEntry {
	#[must_use]
	pub const fn cell_id(&self) -> u32 {
		self.metadata.cell_id
	}
}

/// Every configured cell with its trench timing resolved, ordered by cell id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
	entries: BTreeMap<u32, CatalogEntry>,
}

impl Catalog {
	pub fn from_config(config: &Config) -> Result<Self> {
		let spacings: BTreeMap<u32, f64> = config.trenches.iter().map(|t| (t.id, t.frame_spacing)).collect();

		let entries = config
			.cells
			.iter()
			.map(|cell| {
				let frame_spacing = *spacings
					.get(&cell.trench)
					.with_context(|| format!("Cell {} refers to unknown trench {}", cell.id, cell.trench))?;

				let entry = CatalogEntry {
					metadata: CellMetadata { cell_id: cell.id, trench_id: cell.trench, start_offset: cell.start_offset },
					analysis: cell.analysis,
					anchor_adjust: cell.anchor_adjust,
					trim: cell.trim.map(|[start, end]| (start, end)),
					frame_spacing,
				};
				Ok((cell.id, entry))
			})
			.collect::<Result<_>>()?;

		Ok(Self { entries })
	}

	#[must_use]
	pub fn get(&self, cell_id: u32) -> Option<&CatalogEntry> {
		self.entries.get(&cell_id)
	}

	pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
		self.entries.values()
	}

	/// Cells taking part in at least one pipeline.
	#[must_use]
	pub fn analysed(&self) -> Vec<&CatalogEntry> {
		self.entries().filter(|e| e.analysis != AnalysisClass::Excluded).collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn count_by_class(&self) -> BTreeMap<AnalysisClass, usize> {
		self.entries().fold(BTreeMap::new(), |mut counts, entry| {
			*counts.entry(entry.analysis).or_default() += 1;
			counts
		})
	}
}
