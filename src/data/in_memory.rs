//! In-memory data loader

use crate::data::dataset::{BoundColumn, ColumnKind};
use crate::data::loader::{ColumnSeries, DataLoader, SeriesValues};
use crate::error::{PipelineError, Result};
use crate::types::{AssetId, Label, SessionDate};
use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
enum ColumnStore {
    Numeric(HashMap<AssetId, BTreeMap<SessionDate, f64>>),
    Categorical(HashMap<AssetId, BTreeMap<SessionDate, Label>>),
}

impl ColumnStore {
    fn empty(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Numeric => ColumnStore::Numeric(HashMap::new()),
            ColumnKind::Categorical => ColumnStore::Categorical(HashMap::new()),
        }
    }

    fn dates_in_range(
        &self,
        start: SessionDate,
        end: SessionDate,
        assets: &[AssetId],
    ) -> Vec<SessionDate> {
        let mut dates = BTreeSet::new();
        for asset_id in assets {
            match self {
                ColumnStore::Numeric(by_asset) => {
                    if let Some(obs) = by_asset.get(asset_id) {
                        dates.extend(obs.range(start..=end).map(|(d, _)| *d));
                    }
                }
                ColumnStore::Categorical(by_asset) => {
                    if let Some(obs) = by_asset.get(asset_id) {
                        dates.extend(obs.range(start..=end).map(|(d, _)| *d));
                    }
                }
            }
        }
        dates.into_iter().collect()
    }
}

/// Data loader holding dated observations per column and asset
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    columns: HashMap<BoundColumn, ColumnStore>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a column with no observations yet
    pub fn register(&mut self, column: &BoundColumn) {
        self.columns
            .entry(column.clone())
            .or_insert_with(|| ColumnStore::empty(column.kind));
    }

    /// Whether the column is known to this loader
    pub fn has_column(&self, column: &BoundColumn) -> bool {
        self.columns.contains_key(column)
    }

    /// Add one numeric observation
    pub fn insert_number(
        &mut self,
        column: &BoundColumn,
        asset_id: AssetId,
        date: SessionDate,
        value: f64,
    ) -> Result<()> {
        self.register(column);
        match self.columns.get_mut(column) {
            Some(ColumnStore::Numeric(by_asset)) => {
                by_asset.entry(asset_id).or_default().insert(date, value);
                Ok(())
            }
            _ => Err(kind_error(column, ColumnKind::Numeric)),
        }
    }

    /// Add one categorical observation
    pub fn insert_label(
        &mut self,
        column: &BoundColumn,
        asset_id: AssetId,
        date: SessionDate,
        label: impl Into<Label>,
    ) -> Result<()> {
        self.register(column);
        match self.columns.get_mut(column) {
            Some(ColumnStore::Categorical(by_asset)) => {
                by_asset
                    .entry(asset_id)
                    .or_default()
                    .insert(date, label.into());
                Ok(())
            }
            _ => Err(kind_error(column, ColumnKind::Categorical)),
        }
    }

    /// Add a numeric series for one asset
    pub fn add_series(
        &mut self,
        column: &BoundColumn,
        asset_id: AssetId,
        points: impl IntoIterator<Item = (SessionDate, f64)>,
    ) -> Result<&mut Self> {
        for (date, value) in points {
            self.insert_number(column, asset_id, date, value)?;
        }
        Ok(self)
    }

    /// Add a categorical series for one asset
    pub fn add_labels<L: Into<Label>>(
        &mut self,
        column: &BoundColumn,
        asset_id: AssetId,
        points: impl IntoIterator<Item = (SessionDate, L)>,
    ) -> Result<&mut Self> {
        for (date, label) in points {
            self.insert_label(column, asset_id, date, label)?;
        }
        Ok(self)
    }
}

fn kind_error(column: &BoundColumn, attempted: ColumnKind) -> PipelineError {
    PipelineError::TypeMismatchError {
        term: column.qualified_name(),
        expected: column.kind.to_string(),
        found: attempted.to_string(),
    }
}

impl DataLoader for InMemoryLoader {
    fn get_column(
        &self,
        column: &BoundColumn,
        start: SessionDate,
        end: SessionDate,
        assets: &[AssetId],
    ) -> Result<ColumnSeries> {
        let store =
            self.columns
                .get(column)
                .ok_or_else(|| PipelineError::DataUnavailableError {
                    column: column.qualified_name(),
                    reason: "column is not registered with this loader".to_string(),
                })?;

        let dates = store.dates_in_range(start, end, assets);
        let mut series = ColumnSeries::new(dates);

        for asset_id in assets {
            let values = match store {
                ColumnStore::Numeric(by_asset) => match by_asset.get(asset_id) {
                    Some(obs) => SeriesValues::Numeric(
                        series
                            .dates
                            .iter()
                            .map(|d| obs.get(d).copied().unwrap_or(f64::NAN))
                            .collect(),
                    ),
                    None => continue,
                },
                ColumnStore::Categorical(by_asset) => match by_asset.get(asset_id) {
                    Some(obs) => SeriesValues::Categorical(
                        series.dates.iter().map(|d| obs.get(d).cloned()).collect(),
                    ),
                    None => continue,
                },
            };
            series.insert(*asset_id, values);
        }

        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{EquityPricing, Fundamentals};
    use chrono::NaiveDate;

    fn d(day: u32) -> SessionDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_unknown_column_is_unavailable() {
        let loader = InMemoryLoader::new();
        let err = loader
            .get_column(&EquityPricing::close(), d(1), d(31), &[1])
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailableError { .. }));
    }

    #[test]
    fn test_get_column_aligns_assets() {
        let close = EquityPricing::close();
        let mut loader = InMemoryLoader::new();
        loader
            .add_series(&close, 1, vec![(d(2), 10.0), (d(3), 11.0), (d(4), 12.0)])
            .unwrap()
            .add_series(&close, 2, vec![(d(3), 20.0)])
            .unwrap();

        let series = loader.get_column(&close, d(3), d(4), &[1, 2, 3]).unwrap();
        assert_eq!(series.dates, vec![d(3), d(4)]);
        assert_eq!(series.values[&1], SeriesValues::Numeric(vec![11.0, 12.0]));
        match &series.values[&2] {
            SeriesValues::Numeric(v) => {
                assert_eq!(v[0], 20.0);
                assert!(v[1].is_nan());
            }
            other => panic!("unexpected values {:?}", other),
        }
        assert!(!series.values.contains_key(&3));
    }

    #[test]
    fn test_kind_mismatch_on_insert() {
        let sector = Fundamentals::categorical("sector");
        let mut loader = InMemoryLoader::new();
        assert!(loader.insert_number(&sector, 1, d(2), 1.0).is_err());

        loader.insert_label(&sector, 1, d(2), "tech").unwrap();
        let series = loader.get_column(&sector, d(1), d(5), &[1]).unwrap();
        assert_eq!(
            series.values[&1],
            SeriesValues::Categorical(vec![Some(Label::from("tech"))])
        );
    }
}
