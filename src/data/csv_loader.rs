//! CSV-backed data loader
//!
//! Each registered file holds one column in long format:
//!
//! ```text
//! date,asset,value
//! 2024-01-02,1,187.15
//! 2024-01-02,2,
//! ```
//!
//! Empty numeric values (or `nan`) are treated as missing observations.

use crate::data::dataset::{BoundColumn, ColumnKind};
use crate::data::in_memory::InMemoryLoader;
use crate::data::loader::{ColumnSeries, DataLoader};
use crate::error::{PipelineError, Result};
use crate::types::{parse_iso_date, AssetId, SessionDate};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Record {
    date: String,
    asset: AssetId,
    value: String,
}

/// Loader reading long-format CSV files, one per column
#[derive(Debug, Clone, Default)]
pub struct CsvLoader {
    inner: InMemoryLoader,
}

impl CsvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a column from a CSV file
    pub fn add_file(&mut self, column: &BoundColumn, path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = path.as_ref();
        log::debug!("Loading {} from {}", column, path.display());
        let reader = csv::Reader::from_path(path)?;
        self.read_records(column, reader)
    }

    /// Load a column from any CSV reader
    pub fn add_reader<R: Read>(&mut self, column: &BoundColumn, reader: R) -> Result<&mut Self> {
        self.read_records(column, csv::Reader::from_reader(reader))
    }

    fn read_records<R: Read>(
        &mut self,
        column: &BoundColumn,
        mut reader: csv::Reader<R>,
    ) -> Result<&mut Self> {
        self.inner.register(column);

        for record in reader.deserialize() {
            let record: Record = record?;
            let date = parse_iso_date(&record.date)?;
            let raw = record.value.trim();

            match column.kind {
                ColumnKind::Numeric => {
                    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                        continue;
                    }
                    let value: f64 = raw.parse().map_err(|e| {
                        PipelineError::ParseError(format!(
                            "invalid value '{}' for {} on {}: {}",
                            raw, column, date, e
                        ))
                    })?;
                    self.inner.insert_number(column, record.asset, date, value)?;
                }
                ColumnKind::Categorical => {
                    if raw.is_empty() {
                        continue;
                    }
                    self.inner
                        .insert_label(column, record.asset, date, raw.to_string())?;
                }
            }
        }

        Ok(self)
    }
}

impl DataLoader for CsvLoader {
    fn get_column(
        &self,
        column: &BoundColumn,
        start: SessionDate,
        end: SessionDate,
        assets: &[AssetId],
    ) -> Result<ColumnSeries> {
        self.inner.get_column(column, start, end, assets)
    }
}
