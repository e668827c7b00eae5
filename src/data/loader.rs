//! Data loader contract consumed by the pipeline engine

use crate::data::dataset::{BoundColumn, ColumnKind};
use crate::error::Result;
use crate::types::{AssetId, Label, SessionDate};
use hashbrown::HashMap;

/// Values of one asset, aligned with [`ColumnSeries::dates`]
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValues {
    /// `NaN` marks a missing observation
    Numeric(Vec<f64>),
    Categorical(Vec<Option<Label>>),
}

impl SeriesValues {
    pub fn kind(&self) -> ColumnKind {
        match self {
            SeriesValues::Numeric(_) => ColumnKind::Numeric,
            SeriesValues::Categorical(_) => ColumnKind::Categorical,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SeriesValues::Numeric(v) => v.len(),
            SeriesValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-asset time series for one column over a date range
#[derive(Debug, Clone, Default)]
pub struct ColumnSeries {
    /// Observation dates, ascending
    pub dates: Vec<SessionDate>,
    /// asset_id -> values aligned with `dates`
    pub values: HashMap<AssetId, SeriesValues>,
}

impl ColumnSeries {
    pub fn new(dates: Vec<SessionDate>) -> Self {
        Self {
            dates,
            values: HashMap::new(),
        }
    }

    pub fn insert(&mut self, asset_id: AssetId, values: SeriesValues) {
        self.values.insert(asset_id, values);
    }
}

/// Source of raw column data for a pipeline run.
///
/// Implementations must fail with `DataUnavailableError` for columns they do not
/// know. Assets without observations may simply be absent from the result.
pub trait DataLoader: Send + Sync {
    /// Load `column` for `assets` over `[start, end]` (inclusive)
    fn get_column(
        &self,
        column: &BoundColumn,
        start: SessionDate,
        end: SessionDate,
        assets: &[AssetId],
    ) -> Result<ColumnSeries>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_values_kind() {
        let numeric = SeriesValues::Numeric(vec![1.0, f64::NAN]);
        assert_eq!(numeric.kind(), ColumnKind::Numeric);
        assert_eq!(numeric.len(), 2);

        let labels = SeriesValues::Categorical(vec![]);
        assert_eq!(labels.kind(), ColumnKind::Categorical);
        assert!(labels.is_empty());
    }
}
