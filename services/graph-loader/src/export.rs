//! Dimension export - writes extracted dimensions as `dim_<name>.csv`

use crate::dimensions::DimensionTable;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write one dimension to `<dir>/dim_<name>.csv`. The header is the
/// dimension's canonical column names; absent values are empty fields.
pub fn write_dimension_csv(dir: &Path, table: &DimensionTable) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export dir {}", dir.display()))?;

    let path = dir.join(format!("{}.csv", table.dimension.sheet_name()));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let columns: Vec<&str> = table.dimension.spec().column_names().collect();
    writer.write_record(&columns)?;

    for record in &table.records {
        writer.write_record(columns.iter().map(|c| {
            record
                .get(c)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }))?;
    }
    writer.flush()?;

    info!(
        dimension = table.dimension.name(),
        records = table.len(),
        path = %path.display(),
        "dimension exported"
    );
    Ok(path)
}
