use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

/// Creates `path` unless it is already a directory. A file in the way is an error.
pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
	match fs::create_dir(path) {
		Ok(()) => {
			debug!(path = %path.display(), "Created directory");
			Ok(())
		},
		Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
		Err(e) if e.kind() == io::ErrorKind::NotFound => {
			fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {}", path.display()))
		},
		Err(e) => Err(e).with_context(|| format!("Failed to create directory: {}", path.display())),
	}
}

/// Writes `header` followed by one record per row. The header is written even when `rows` is empty.
pub(crate) fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
	let mut writer = csv::WriterBuilder::new()
		.has_headers(false)
		.from_path(path)
		.with_context(|| format!("Failed to create {}", path.display()))?;
	writer.write_record(header).with_context(|| format!("Failed to write header to {}", path.display()))?;
	for row in rows {
		writer.serialize(row).with_context(|| format!("Failed to write row to {}", path.display()))?;
	}
	writer.flush().with_context(|| format!("Failed to flush {}", path.display()))?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ensure_dir_is_idempotent() {
		let tmp = tempfile::tempdir().unwrap();
		let dir = tmp.path().join("dataframes");

		ensure_dir(&dir).unwrap();
		ensure_dir(&dir).unwrap();
		assert!(dir.is_dir());
	}

	#[test]
	fn ensure_dir_creates_parents() {
		let tmp = tempfile::tempdir().unwrap();
		let dir = tmp.path().join("a").join("b");

		ensure_dir(&dir).unwrap();
		assert!(dir.is_dir());
	}

	#[test]
	fn ensure_dir_rejects_file_in_the_way() {
		let tmp = tempfile::tempdir().unwrap();
		let file = tmp.path().join("taken");
		fs::write(&file, "x").unwrap();

		let err = ensure_dir(&file).unwrap_err();
		assert!(err.to_string().contains("Failed to create directory"));
	}

	#[test]
	fn writes_header_and_rows() {
		#[derive(Serialize)]
		struct Row {
			cell: u32,
			value: f64,
		}

		let tmp = tempfile::tempdir().unwrap();
		let path = tmp.path().join("rows.csv");
		write_csv(&path, &["cell", "value"], &[Row { cell: 1, value: 0.5 }, Row { cell: 2, value: 1.5 }]).unwrap();

		assert_eq!(fs::read_to_string(&path).unwrap(), "cell,value\n1,0.5\n2,1.5\n");
	}

	#[test]
	fn empty_table_keeps_header() {
		let tmp = tempfile::tempdir().unwrap();
		let path = tmp.path().join("empty.csv");
		write_csv::<(u32, f64)>(&path, &["cell", "value"], &[]).unwrap();

		assert_eq!(fs::read_to_string(&path).unwrap(), "cell,value\n");
	}
}
